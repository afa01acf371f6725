//! Condition type registry
//!
//! Maps condition names to their types. The process-wide registry is filled
//! once during startup (see [`crate::conditions::discover`]) and only read
//! afterwards; standalone [`Registry`] values are available for embedding
//! and tests.

use crate::condition::{Condition, ConditionType};
use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use serde_yaml::Mapping;
use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};
use tracing::debug;

// Global registry consulted by the command line front end
static REGISTRY: Lazy<RwLock<Registry>> = Lazy::new(|| RwLock::new(Registry::new()));

/// A condition type bound to its registered name
#[derive(Clone)]
pub struct RegisteredType {
    name: String,
    type_id: TypeId,
    type_name: &'static str,
    kind: Arc<dyn ConditionType>,
}

impl RegisteredType {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rust type name of the implementation, for diagnostics
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Construct a condition instance from named arguments
    pub fn instantiate(&self, args: Mapping) -> Result<Condition> {
        Condition::new(&self.name, self.kind.as_ref(), args)
    }
}

impl fmt::Debug for RegisteredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredType")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .finish()
    }
}

/// Name to condition type table
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: HashMap<String, RegisteredType>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `kind` under `name`
    ///
    /// Registering the same type again under the same name is a no-op;
    /// registering a different type under a taken name is a conflict.
    pub fn register<T: ConditionType>(&mut self, name: &str, kind: T) -> Result<()> {
        let type_id = TypeId::of::<T>();
        if let Some(existing) = self.entries.get(name) {
            if existing.type_id == type_id {
                debug!(name, "condition type already registered");
                return Ok(());
            }
            return Err(Error::NameConflict {
                name: name.to_string(),
                existing: existing.type_name.to_string(),
                requested: type_name::<T>().to_string(),
            });
        }

        debug!(name, type_name = type_name::<T>(), "registering condition type");
        self.entries.insert(
            name.to_string(),
            RegisteredType {
                name: name.to_string(),
                type_id,
                type_name: type_name::<T>(),
                kind: Arc::new(kind),
            },
        );
        Ok(())
    }

    /// Get the type registered under `name`
    pub fn lookup(&self, name: &str) -> Result<&RegisteredType> {
        self.entries
            .get(name)
            .ok_or_else(|| Error::UnknownCondition(name.to_string()))
    }

    /// All registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Read access to the process-wide registry
pub fn global() -> RwLockReadGuard<'static, Registry> {
    REGISTRY.read().unwrap_or_else(PoisonError::into_inner)
}

/// Register a condition type in the process-wide registry
pub fn register<T: ConditionType>(name: &str, kind: T) -> Result<()> {
    REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .register(name, kind)
}

/// Look up a condition type in the process-wide registry
pub fn lookup(name: &str) -> Result<RegisteredType> {
    global().lookup(name).cloned()
}
