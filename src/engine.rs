//! Parallel wait engine
//!
//! Every condition's wait protocol runs on its own OS thread, since
//! predicates are free to block on filesystem, network or subprocess I/O.
//! The coordinator collects outcomes in specification order, polling each
//! worker's completion channel at a short fixed interval so that it stays
//! responsive to cancellation even when a condition waits indefinitely.
//!
//! A condition with a finite timeout is never waited on past
//! `warmup + timeout + test_interval + poll_interval`; a worker whose
//! predicate hangs beyond that is abandoned and reported as timed out.

use crate::condition::{Condition, WaitError};
use crate::error::{Error, Result};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::time;
use tracing::{debug, error, info, warn};

/// Default interval at which the coordinator checks on workers
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Shared cancellation flag
///
/// Clones observe the same flag. Used both for external interruption of a
/// batch and for telling abandoned workers to stop.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Result of waiting on a single condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The predicate held before the timeout
    Fulfilled,
    /// The timeout was exhausted
    TimedOut,
    /// The predicate failed; the detail describes why
    Errored(String),
}

impl Outcome {
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Outcome::Fulfilled)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Fulfilled => f.write_str("ok"),
            Outcome::TimedOut => f.write_str("failed"),
            Outcome::Errored(detail) => write!(f, "failed: {}", detail),
        }
    }
}

impl From<Result<(), WaitError>> for Outcome {
    fn from(result: Result<(), WaitError>) -> Self {
        match result {
            Ok(()) => Outcome::Fulfilled,
            Err(WaitError::TimedOut { .. }) => Outcome::TimedOut,
            Err(WaitError::Failed(e)) => Outcome::Errored(format!("{:#}", e)),
            Err(WaitError::Abandoned) => Outcome::Errored("wait abandoned".to_string()),
        }
    }
}

/// Outcome of one condition, tagged with its identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionReport {
    pub identity: String,
    pub outcome: Outcome,
}

impl fmt::Display for ConditionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.identity, self.outcome)
    }
}

/// Aggregate result of a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    /// True iff every condition was fulfilled
    pub success: bool,
    /// Per-condition outcomes in specification order
    pub conditions: Vec<ConditionReport>,
}

impl BatchReport {
    fn from_reports(conditions: Vec<ConditionReport>) -> Self {
        Self {
            success: conditions.iter().all(|c| c.outcome.is_fulfilled()),
            conditions,
        }
    }

    /// Number of conditions that were not fulfilled
    pub fn failures(&self) -> usize {
        self.conditions
            .iter()
            .filter(|c| !c.outcome.is_fulfilled())
            .count()
    }
}

enum UnitState {
    Running(oneshot::Receiver<Outcome>),
    Resolved(Outcome),
}

/// One launched condition as seen by the coordinator
struct Unit {
    identity: String,
    deadline: Option<Instant>,
    state: UnitState,
}

/// Runs batches of conditions concurrently
#[derive(Debug, Clone)]
pub struct WaitEngine {
    poll_interval: Duration,
    cancellation: Cancellation,
}

impl Default for WaitEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitEngine {
    pub fn new() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            cancellation: Cancellation::new(),
        }
    }

    /// Use a different coordinator polling interval
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Handle that interrupts any batch run by this engine
    ///
    /// Cancellation is permanent: once cancelled, every later `run` on this
    /// engine or its clones fails with [`Error::Cancelled`] without launching
    /// anything. Use a new engine for the next batch.
    pub fn cancellation(&self) -> Cancellation {
        self.cancellation.clone()
    }

    /// Wait for all `conditions` in parallel
    ///
    /// Returns the aggregate verdict with per-condition outcomes in input
    /// order. When `report_each` is set, one `<identity>: <outcome>` line per
    /// condition is printed to stdout once every condition has resolved.
    /// Fails only with [`Error::Cancelled`]; outstanding workers are then
    /// abandoned rather than awaited.
    pub async fn run(&self, conditions: Vec<Condition>, report_each: bool) -> Result<BatchReport> {
        if self.cancellation.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let started = Instant::now();
        info!(count = conditions.len(), "waiting for conditions");

        let abandon = Cancellation::new();
        let units: Vec<Unit> = conditions
            .into_iter()
            .enumerate()
            .map(|(index, condition)| self.launch(index, condition, &abandon))
            .collect();

        let mut reports = Vec::with_capacity(units.len());
        for unit in units {
            let identity = unit.identity.clone();
            let outcome = match self.collect(unit).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    abandon.cancel();
                    warn!(pending = %identity, "batch cancelled, abandoning outstanding conditions");
                    return Err(e);
                }
            };
            match &outcome {
                Outcome::Fulfilled => info!(condition = %identity, "condition fulfilled"),
                Outcome::TimedOut => warn!(condition = %identity, "condition timed out"),
                Outcome::Errored(detail) => {
                    error!(condition = %identity, error = %detail, "error running condition")
                }
            }
            reports.push(ConditionReport { identity, outcome });
        }
        abandon.cancel();

        let batch = BatchReport::from_reports(reports);
        if report_each {
            for report in &batch.conditions {
                println!("{}", report);
            }
        }
        info!(
            success = batch.success,
            failures = batch.failures(),
            elapsed = ?started.elapsed(),
            "all conditions resolved"
        );
        Ok(batch)
    }

    /// Start the wait protocol of `condition` on a dedicated thread
    fn launch(&self, index: usize, mut condition: Condition, abandon: &Cancellation) -> Unit {
        let identity = condition.to_string();
        let settings = *condition.settings();
        // A deadline past the end of representable time is no deadline
        let deadline = settings.timeout.and_then(|timeout| {
            let budget = settings
                .warmup
                .checked_add(timeout)?
                .checked_add(settings.test_interval)?
                .checked_add(self.poll_interval)?;
            Instant::now().checked_add(budget)
        });

        let (sender, receiver) = oneshot::channel();
        let abandon = abandon.clone();
        let spawned = thread::Builder::new()
            .name(format!("multiwait-{}", index))
            .spawn(move || {
                let outcome = match panic::catch_unwind(AssertUnwindSafe(|| {
                    condition.wait_until(&abandon)
                })) {
                    Ok(result) => Outcome::from(result),
                    Err(payload) => Outcome::Errored(format!("panicked: {}", panic_message(&*payload))),
                };
                // The coordinator may have stopped listening
                let _ = sender.send(outcome);
            });

        let state = match spawned {
            Ok(_) => {
                debug!(condition = %identity, ?deadline, "condition launched");
                UnitState::Running(receiver)
            }
            Err(e) => UnitState::Resolved(Outcome::Errored(format!(
                "failed to start worker thread: {}",
                e
            ))),
        };

        Unit {
            identity,
            deadline,
            state,
        }
    }

    /// Wait for a unit's outcome one polling tick at a time
    async fn collect(&self, unit: Unit) -> Result<Outcome> {
        let mut receiver = match unit.state {
            UnitState::Resolved(outcome) => return Ok(outcome),
            UnitState::Running(receiver) => receiver,
        };

        loop {
            if self.cancellation.is_cancelled() {
                return Err(Error::Cancelled);
            }
            match time::timeout(self.poll_interval, &mut receiver).await {
                Ok(Ok(outcome)) => return Ok(outcome),
                Ok(Err(_)) => {
                    return Ok(Outcome::Errored(
                        "worker exited without reporting an outcome".to_string(),
                    ))
                }
                Err(_) => {
                    if unit.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                        warn!(condition = %unit.identity, "worker did not report back before its deadline");
                        return Ok(Outcome::TimedOut);
                    }
                }
            }
        }
    }
}

/// Wait for `conditions` with a default engine
pub async fn wait_parallel(conditions: Vec<Condition>, report_each: bool) -> Result<BatchReport> {
    WaitEngine::new().run(conditions, report_each).await
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
