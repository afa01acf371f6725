//! Integration tests for loading and waiting on condition batches
//!
//! These tests go through the public API the way an embedding caller would:
//! register condition types, load specifications, run the engine.

use multiwait::condition::{ConditionType, Params, Predicate, WaitSettings};
use multiwait::registry::Registry;
use multiwait::{loader, Condition, Outcome, WaitEngine};
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Fulfilled once `target` exists
struct PresentCheck;

struct TargetExists(PathBuf);

impl Predicate for TargetExists {
    fn test(&mut self) -> anyhow::Result<bool> {
        Ok(self.0.exists())
    }
}

impl ConditionType for PresentCheck {
    fn required(&self) -> &'static [&'static str] {
        &["target"]
    }

    fn predicate(&self, params: &Params) -> anyhow::Result<Box<dyn Predicate>> {
        Ok(Box::new(TargetExists(PathBuf::from(params.str("target")?))))
    }
}

fn constant(name: &str, value: bool, timeout: Option<Duration>) -> Condition {
    Condition::adhoc(name, WaitSettings::with_timeout(timeout), move || -> anyhow::Result<bool> {
        Ok(value)
    })
}

fn yaml<T: serde::de::DeserializeOwned>(source: &str) -> T {
    serde_yaml::from_str(source).unwrap()
}

/// Test the present-check scenario before and after the target appears
#[tokio::test]
async fn test_present_check_scenario() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("X");

    let mut registry = Registry::new();
    registry.register("present-check", PresentCheck).unwrap();

    let mut params = Mapping::new();
    params.insert("target".into(), target.to_string_lossy().into_owned().into());
    params.insert("timeout".into(), 0.5.into());
    let mut spec = Mapping::new();
    spec.insert("present-check".into(), Value::Mapping(params));
    let specs = vec![Value::Mapping(spec)];

    let engine = WaitEngine::new();
    let identity = format!("present-check(target={})", target.display());

    let conditions = loader::load(&specs, &Mapping::new(), &registry).unwrap();
    let report = engine.run(conditions, true).await.unwrap();
    assert!(!report.success);
    assert_eq!(report.conditions[0].to_string(), format!("{}: failed", identity));

    fs::write(&target, "").unwrap();

    let conditions = loader::load(&specs, &Mapping::new(), &registry).unwrap();
    let report = engine.run(conditions, true).await.unwrap();
    assert!(report.success);
    assert_eq!(report.conditions[0].to_string(), format!("{}: ok", identity));
}

/// Test that an unbounded fulfilled condition and a bounded failing one finish promptly
#[tokio::test]
async fn test_unbounded_ok_and_bounded_failure() {
    let start = Instant::now();
    let report = WaitEngine::new()
        .run(
            vec![
                constant("always", true, None),
                constant("never", false, Some(Duration::from_secs(1))),
            ],
            true,
        )
        .await
        .unwrap();
    let elapsed = start.elapsed();

    assert!(!report.success);
    assert_eq!(report.conditions[0].outcome, Outcome::Fulfilled);
    assert_eq!(report.conditions[1].outcome, Outcome::TimedOut);
    assert!(elapsed >= Duration::from_secs(1));
    assert!(elapsed < Duration::from_millis(1600));
}

/// Test that total wall-clock time follows the longest timeout, not the sum
#[tokio::test]
async fn test_batch_time_bounded_by_slowest_condition() {
    let conditions = vec![
        constant("a", false, Some(Duration::from_millis(300))),
        constant("b", false, Some(Duration::from_millis(600))),
        constant("c", false, Some(Duration::from_millis(900))),
    ];

    let start = Instant::now();
    let report = WaitEngine::new().run(conditions, false).await.unwrap();
    let elapsed = start.elapsed();

    assert!(!report.success);
    assert_eq!(report.failures(), 3);
    assert!(elapsed >= Duration::from_millis(900));
    assert!(elapsed < Duration::from_millis(1500));
}

/// Test that an errored condition does not disturb a concurrent fulfilled one
#[tokio::test]
async fn test_error_isolated_from_siblings() {
    let faulty = Condition::adhoc("faulty", WaitSettings::default(), || -> anyhow::Result<bool> {
        anyhow::bail!("probe exploded")
    });
    let ready_later = Condition::adhoc(
        "ready-later",
        WaitSettings {
            warmup: Duration::from_millis(200),
            timeout: Some(Duration::from_secs(2)),
            test_interval: Duration::from_millis(50),
        },
        || -> anyhow::Result<bool> { Ok(true) },
    );

    let start = Instant::now();
    let report = WaitEngine::new()
        .run(vec![faulty, ready_later], false)
        .await
        .unwrap();

    assert!(!report.success);
    assert_eq!(
        report.conditions[0].outcome,
        Outcome::Errored("probe exploded".to_string())
    );
    assert_eq!(report.conditions[1].outcome, Outcome::Fulfilled);
    assert!(start.elapsed() < Duration::from_secs(1));
}

/// Test loading a full settings-style batch with shared defaults
#[tokio::test]
async fn test_load_and_run_builtin_conditions() {
    let temp_dir = TempDir::new().unwrap();
    let present = temp_dir.path().join("present");
    fs::write(&present, "").unwrap();

    let mut registry = Registry::new();
    multiwait::conditions::register_builtin(&mut registry).unwrap();

    let specs: Vec<Value> = yaml(&format!(
        "- file-present: {{path: {}}}\n- file-absent: {{path: {}}}\n",
        present.display(),
        temp_dir.path().join("absent").display()
    ));
    let defaults: Mapping = yaml("timeout: 1\ntest_interval: 0.05\n");

    let conditions = loader::load(&specs, &defaults, &registry).unwrap();
    assert_eq!(conditions[0].settings().timeout, Some(Duration::from_secs(1)));

    let report = WaitEngine::new().run(conditions, false).await.unwrap();
    assert!(report.success);
}

/// Test that timeouts far beyond any representable instant still run
#[tokio::test]
async fn test_enormous_timeout_from_specification() {
    let mut registry = Registry::new();
    registry.register("present-check", PresentCheck).unwrap();

    let temp_dir = TempDir::new().unwrap();
    let specs: Vec<Value> = yaml(&format!(
        "- present-check: {{target: {}, timeout: 1.0e19}}\n",
        temp_dir.path().display()
    ));
    let conditions = loader::load(&specs, &Mapping::new(), &registry).unwrap();
    assert_eq!(
        conditions[0].settings().timeout,
        Some(Duration::from_secs_f64(1.0e19))
    );

    let report = WaitEngine::new().run(conditions, false).await.unwrap();
    assert!(report.success);
}
