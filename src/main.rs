use clap::{ArgAction, Parser};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use multiwait::{conditions, config, loader, registry, Error, WaitEngine};

/// Exit status when the verdict is negative or setup fails
const EXIT_FAILURE: i32 = 1;
/// Exit status when the command cannot be executed
const EXIT_EXEC_FAILED: i32 = 127;
/// Exit status after an interrupt
const EXIT_INTERRUPTED: i32 = 130;

#[derive(Parser)]
#[command(name = "multiwait")]
#[command(about = "Wait for stuff to happen before running a command")]
#[command(version)]
struct Cli {
    /// Path to the settings file (default: /etc/multiwait.yaml if exists, otherwise ~/.config/multiwait/multiwait.yaml)
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Print one line per condition with its outcome
    #[arg(long)]
    report: bool,

    /// Increase logging verbosity (-v for info, -vv for debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// The command to run
    command: String,

    /// The command arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG takes precedence over -v
    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let settings_path = cli.settings.unwrap_or_else(config::default_settings_path);

    let settings = match config::load_settings(&settings_path) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load settings: {}", e);
            std::process::exit(EXIT_FAILURE);
        }
    };
    info!(path = %settings_path.display(), "settings loaded");

    if let Err(e) = conditions::discover() {
        eprintln!("Failed to register conditions: {}", e);
        std::process::exit(EXIT_FAILURE);
    }

    let batch = loader::load(&settings.conditions, &settings.defaults, &registry::global());
    let batch = match batch {
        Ok(batch) => batch,
        Err(e) => {
            eprintln!("Invalid condition configuration: {}", e);
            std::process::exit(EXIT_FAILURE);
        }
    };

    let engine = WaitEngine::new();
    let cancellation = engine.cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancellation.cancel();
        }
    });

    match engine.run(batch, cli.report).await {
        Ok(report) if report.success => {
            info!(command = %cli.command, "all conditions fulfilled, starting command");
            exec_command(&cli.command, &cli.args)
        }
        Ok(report) => {
            error!(failures = report.failures(), "some conditions were not fulfilled");
            std::process::exit(EXIT_FAILURE);
        }
        Err(Error::Cancelled) => {
            eprintln!("Interrupted");
            std::process::exit(EXIT_INTERRUPTED);
        }
        Err(e) => Err(e.into()),
    }
}

/// Replace the current process with `command`
#[cfg(unix)]
fn exec_command(command: &str, args: &[String]) -> ! {
    use std::io::Write;
    use std::os::unix::process::CommandExt;

    let _ = std::io::stdout().flush();
    let err = std::process::Command::new(command).args(args).exec();
    eprintln!("Failed to execute {}: {}", command, err);
    std::process::exit(EXIT_EXEC_FAILED);
}

/// Run `command` to completion and exit with its status
#[cfg(not(unix))]
fn exec_command(command: &str, args: &[String]) -> ! {
    match std::process::Command::new(command).args(args).status() {
        Ok(status) => std::process::exit(status.code().unwrap_or(EXIT_FAILURE)),
        Err(e) => {
            eprintln!("Failed to execute {}: {}", command, e);
            std::process::exit(EXIT_EXEC_FAILED);
        }
    }
}
