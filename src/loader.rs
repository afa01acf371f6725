//! Specification loader
//!
//! Turns declarative condition specifications into condition instances.
//! Each entry is either a bare condition name or a single-key mapping from
//! the name to its parameters:
//!
//! **YAML Format:**
//! ```yaml
//! - redis-dataset-loaded
//! - file-absent:
//!     path: /path/to/file
//! ```
//!
//! Parameterized entries are merged over the batch defaults one key at a
//! time. Bare names are constructed without defaults.

use crate::condition::{render_value, Condition};
use crate::error::{Error, Result};
use crate::registry::Registry;
use serde_yaml::{Mapping, Value};
use tracing::debug;

/// A parsed condition specification
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionSpec {
    /// Condition name only
    Bare(String),
    /// Condition name with its own parameters
    Parameterized { name: String, params: Mapping },
}

impl ConditionSpec {
    /// Parse the specification found at `index` in a batch
    pub fn from_value(index: usize, value: &Value) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidSpecification { index, reason };

        match value {
            Value::String(name) => Ok(ConditionSpec::Bare(name.clone())),
            Value::Mapping(mapping) => {
                if mapping.len() != 1 {
                    return Err(invalid(format!(
                        "expected a single condition name, found {} keys",
                        mapping.len()
                    )));
                }
                let (key, params) = mapping
                    .iter()
                    .next()
                    .ok_or_else(|| invalid("empty mapping".to_string()))?;
                let name = key.as_str().ok_or_else(|| {
                    invalid(format!("condition name must be a string, got {}", render_value(key)))
                })?;
                let params = match params {
                    Value::Mapping(params) => params.clone(),
                    other => {
                        return Err(invalid(format!(
                            "parameters of '{}' must be a mapping, got {}",
                            name,
                            render_value(other)
                        )))
                    }
                };
                Ok(ConditionSpec::Parameterized {
                    name: name.to_string(),
                    params,
                })
            }
            other => Err(invalid(format!(
                "expected a condition name or a single-key mapping, got {}",
                render_value(other)
            ))),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ConditionSpec::Bare(name) => name,
            ConditionSpec::Parameterized { name, .. } => name,
        }
    }

    /// Construct the condition, merging `defaults` under explicit parameters
    pub fn build(&self, defaults: &Mapping, registry: &Registry) -> Result<Condition> {
        match self {
            ConditionSpec::Bare(name) => registry.lookup(name)?.instantiate(Mapping::new()),
            ConditionSpec::Parameterized { name, params } => {
                let registered = registry.lookup(name)?;
                registered.instantiate(merge(defaults, params))
            }
        }
    }
}

/// Copy `defaults`, then overwrite it key by key with `params`
pub fn merge(defaults: &Mapping, params: &Mapping) -> Mapping {
    let mut merged = defaults.clone();
    for (key, value) in params {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Build condition instances for `specs`, in order
///
/// The first construction error aborts the whole batch.
pub fn load(specs: &[Value], defaults: &Mapping, registry: &Registry) -> Result<Vec<Condition>> {
    specs
        .iter()
        .enumerate()
        .map(|(index, value)| {
            let spec = ConditionSpec::from_value(index, value)?;
            debug!(index, condition = spec.name(), "building condition");
            spec.build(defaults, registry)
        })
        .collect()
}
