//! Multiwait - wait for conditions to be fulfilled before running a command
//!
//! This crate provides a registry of named condition types, a loader that
//! builds condition instances from declarative specifications, and an engine
//! that waits for a batch of conditions in parallel and reports a single
//! verdict.

pub mod condition;
pub mod conditions;
pub mod config;
pub mod engine;
pub mod error;
pub mod loader;
pub mod registry;

pub use condition::{Condition, ConditionType, Params, Predicate, WaitSettings};
pub use engine::{BatchReport, Cancellation, ConditionReport, Outcome, WaitEngine};
pub use error::{Error, Result};
