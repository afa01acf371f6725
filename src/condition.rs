//! Condition contract
//!
//! A condition type declares its required parameters, its optional
//! parameters with default values, and how to build a [`Predicate`] from the
//! bound values. A [`Condition`] is one runtime instance of such a type: the
//! bound parameters, the lifecycle settings and the predicate itself.
//!
//! # Examples
//!
//! ## Declaring a condition type
//!
//! ```
//! use multiwait::condition::{ConditionType, Params, Predicate};
//! use std::path::PathBuf;
//!
//! struct DirectoryPresent;
//!
//! struct DirectoryCheck(PathBuf);
//!
//! impl Predicate for DirectoryCheck {
//!     fn test(&mut self) -> anyhow::Result<bool> {
//!         Ok(self.0.is_dir())
//!     }
//! }
//!
//! impl ConditionType for DirectoryPresent {
//!     fn required(&self) -> &'static [&'static str] {
//!         &["path"]
//!     }
//!
//!     fn predicate(&self, params: &Params) -> anyhow::Result<Box<dyn Predicate>> {
//!         Ok(Box::new(DirectoryCheck(PathBuf::from(params.str("path")?))))
//!     }
//! }
//! ```
//!
//! ## Lifecycle parameters
//!
//! Every condition accepts `warmup`, `timeout` and `test_interval` (seconds)
//! next to its own parameters:
//!
//! **YAML Format:**
//! ```yaml
//! - file-present:
//!     path: /var/run/app.pid
//!     warmup: 2
//!     timeout: 30
//!     test_interval: 0.5
//! ```

use crate::engine::Cancellation;
use crate::error::{Error, Result};
use anyhow::Context;
use serde_yaml::{Mapping, Value};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::debug;

/// Parameter name for the delay before the first test
pub const WARMUP: &str = "warmup";
/// Parameter name for the polling time limit
pub const TIMEOUT: &str = "timeout";
/// Parameter name for the delay between tests
pub const TEST_INTERVAL: &str = "test_interval";

/// Upper bound on a single sleep slice, so abandoned waits notice quickly
const ABANDON_CHECK_INTERVAL: Duration = Duration::from_millis(50);

/// Default delay between two predicate evaluations
fn default_test_interval() -> Duration {
    Duration::from_millis(100)
}

/// The boolean check at the heart of a condition
///
/// `test` is called repeatedly from the condition's own worker thread. It
/// should return quickly; an `Err` ends the wait with an errored outcome.
pub trait Predicate: Send {
    fn test(&mut self) -> anyhow::Result<bool>;
}

impl<F> Predicate for F
where
    F: FnMut() -> anyhow::Result<bool> + Send,
{
    fn test(&mut self) -> anyhow::Result<bool> {
        self()
    }
}

/// A registrable kind of condition
pub trait ConditionType: Send + Sync + 'static {
    /// Parameters that must be supplied, in reporting order
    fn required(&self) -> &'static [&'static str] {
        &[]
    }

    /// Optional parameters and their default values, in reporting order
    fn defaults(&self) -> Vec<(&'static str, Value)> {
        Vec::new()
    }

    /// Build the predicate from the bound parameters
    ///
    /// Errors returned here surface as configuration errors.
    fn predicate(&self, params: &Params) -> anyhow::Result<Box<dyn Predicate>>;
}

/// Lifecycle settings shared by every condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitSettings {
    /// Unconditional delay before the first test
    pub warmup: Duration,
    /// Polling time limit; `None` waits indefinitely
    pub timeout: Option<Duration>,
    /// Minimum delay between two tests
    pub test_interval: Duration,
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            warmup: Duration::ZERO,
            timeout: None,
            test_interval: default_test_interval(),
        }
    }
}

impl WaitSettings {
    /// Settings with the given timeout and default warmup/interval
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    /// Remove the lifecycle keys from `args` and parse them
    fn take_from(condition: &str, args: &mut Vec<(String, Value)>) -> Result<Self> {
        let mut settings = Self::default();
        if let Some(value) = take(args, WARMUP) {
            settings.warmup = seconds(condition, WARMUP, &value)?;
        }
        if let Some(value) = take(args, TIMEOUT) {
            settings.timeout = match value {
                Value::Null => None,
                value => Some(seconds(condition, TIMEOUT, &value)?),
            };
        }
        if let Some(value) = take(args, TEST_INTERVAL) {
            settings.test_interval = seconds(condition, TEST_INTERVAL, &value)?;
        }
        Ok(settings)
    }
}

fn seconds(condition: &str, key: &str, value: &Value) -> Result<Duration> {
    let secs = value.as_f64().ok_or_else(|| {
        Error::configuration(
            condition,
            format!("{} must be a number of seconds, got {}", key, render_value(value)),
        )
    })?;
    Duration::try_from_secs_f64(secs).map_err(|_| {
        Error::configuration(
            condition,
            format!("{} must be a non-negative number of seconds, got {}", key, secs),
        )
    })
}

fn take(args: &mut Vec<(String, Value)>, key: &str) -> Option<Value> {
    let position = args.iter().position(|(k, _)| k == key)?;
    Some(args.remove(position).1)
}

/// Parameter values bound to a condition instance
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    values: Vec<(String, Value)>,
}

impl Params {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Get a parameter that must be a string
    pub fn str(&self, key: &str) -> anyhow::Result<&str> {
        self.get(key)
            .with_context(|| format!("parameter '{}' is not set", key))?
            .as_str()
            .with_context(|| format!("parameter '{}' must be a string", key))
    }

    /// Get a parameter that must be a non-negative integer
    pub fn u64(&self, key: &str) -> anyhow::Result<u64> {
        self.get(key)
            .with_context(|| format!("parameter '{}' is not set", key))?
            .as_u64()
            .with_context(|| format!("parameter '{}' must be a non-negative integer", key))
    }

    /// Get a parameter that must be a number
    pub fn f64(&self, key: &str) -> anyhow::Result<f64> {
        self.get(key)
            .with_context(|| format!("parameter '{}' is not set", key))?
            .as_f64()
            .with_context(|| format!("parameter '{}' must be a number", key))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Why a wait ended without the condition being fulfilled
#[derive(Debug, thiserror::Error)]
pub enum WaitError {
    /// The predicate never held within the timeout
    #[error("not fulfilled after {:.2} seconds", .after.as_secs_f64())]
    TimedOut { after: Duration },

    /// The predicate itself failed
    #[error("test failed: {0:#}")]
    Failed(anyhow::Error),

    /// The coordinator gave up on this wait
    #[error("wait abandoned")]
    Abandoned,
}

/// A runtime condition instance
pub struct Condition {
    name: String,
    settings: WaitSettings,
    params: Params,
    predicate: Box<dyn Predicate>,
}

impl Condition {
    /// Construct an instance of `kind` registered under `name`
    ///
    /// `args` holds the lifecycle settings and the type's own parameters.
    /// Missing required parameters and unknown keys are rejected.
    pub fn new(name: &str, kind: &dyn ConditionType, args: Mapping) -> Result<Self> {
        let mut remaining = Vec::with_capacity(args.len());
        for (key, value) in args {
            match key {
                Value::String(key) => remaining.push((key, value)),
                other => {
                    return Err(Error::configuration(
                        name,
                        format!("parameter names must be strings, got {}", render_value(&other)),
                    ))
                }
            }
        }

        let settings = WaitSettings::take_from(name, &mut remaining)?;

        let mut values = Vec::new();
        for key in kind.required() {
            let value = take(&mut remaining, key).ok_or_else(|| {
                Error::configuration(name, format!("required argument missing: {}", key))
            })?;
            values.push((key.to_string(), value));
        }
        for (key, default) in kind.defaults() {
            let value = take(&mut remaining, key).unwrap_or(default);
            values.push((key.to_string(), value));
        }

        if !remaining.is_empty() {
            let unknown: Vec<&str> = remaining.iter().map(|(k, _)| k.as_str()).collect();
            return Err(Error::configuration(
                name,
                format!("invalid arguments: {}", unknown.join(", ")),
            ));
        }

        let params = Params { values };
        let predicate = kind
            .predicate(&params)
            .map_err(|e| Error::configuration(name, format!("{:#}", e)))?;

        let condition = Self {
            name: name.to_string(),
            settings,
            params,
            predicate,
        };
        debug!(condition = %condition, settings = ?condition.settings, "condition constructed");
        Ok(condition)
    }

    /// Build an unregistered condition around a predicate
    pub fn adhoc(
        name: impl Into<String>,
        settings: WaitSettings,
        predicate: impl Predicate + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            settings,
            params: Params::default(),
            predicate: Box::new(predicate),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &WaitSettings {
        &self.settings
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Evaluate the predicate once
    pub fn test(&mut self) -> anyhow::Result<bool> {
        self.predicate.test()
    }

    /// Block until the condition is fulfilled, times out or fails
    pub fn wait(&mut self) -> Result<(), WaitError> {
        self.wait_until(&Cancellation::new())
    }

    /// Like [`Condition::wait`], but gives up when `abandon` is cancelled
    pub fn wait_until(&mut self, abandon: &Cancellation) -> Result<(), WaitError> {
        sleep_unless(self.settings.warmup, abandon)?;

        let start = Instant::now();
        loop {
            if let Some(timeout) = self.settings.timeout {
                let elapsed = start.elapsed();
                if elapsed >= timeout {
                    return Err(WaitError::TimedOut { after: elapsed });
                }
            }
            if self.test().map_err(WaitError::Failed)? {
                debug!(condition = %self, elapsed = ?start.elapsed(), "test passed");
                return Ok(());
            }
            sleep_unless(self.settings.test_interval, abandon)?;
        }
    }
}

fn sleep_unless(duration: Duration, abandon: &Cancellation) -> Result<(), WaitError> {
    // None: the sleep outlasts any representable instant
    let deadline = Instant::now().checked_add(duration);
    loop {
        if abandon.is_cancelled() {
            return Err(WaitError::Abandoned);
        }
        let slice = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return Ok(());
                }
                (deadline - now).min(ABANDON_CHECK_INTERVAL)
            }
            None => ABANDON_CHECK_INTERVAL,
        };
        std::thread::sleep(slice);
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.params.is_empty() {
            let rendered: Vec<String> = self
                .params
                .iter()
                .map(|(k, v)| format!("{}={}", k, render_value(v)))
                .collect();
            write!(f, "({})", rendered.join(", "))?;
        }
        Ok(())
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("name", &self.name)
            .field("settings", &self.settings)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// Render a parameter value for identities and messages
pub(crate) fn render_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Tagged(tagged) => render_value(&tagged.value),
        other => serde_json::to_string(other).unwrap_or_else(|_| format!("{:?}", other)),
    }
}
