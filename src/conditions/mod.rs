//! Built-in condition types
//!
//! | Name                   | Required | Optional (default)                                   |
//! |------------------------|----------|------------------------------------------------------|
//! | `file-present`         | `path`   |                                                      |
//! | `file-absent`          | `path`   |                                                      |
//! | `port-open`            | `port`   | `host` (localhost), `connect_timeout` (1)            |
//! | `redis-dataset-loaded` |          | `host` (localhost), `port` (6379), `password` (null) |

use crate::error::Result;
use crate::registry::{self, Registry};

mod files;
mod port;
mod redis_dataset;

pub use files::{FileAbsent, FilePresent};
pub use port::PortOpen;
pub use redis_dataset::RedisDatasetLoaded;

/// Register the built-in condition types in `registry`
pub fn register_builtin(registry: &mut Registry) -> Result<()> {
    registry.register("file-present", FilePresent)?;
    registry.register("file-absent", FileAbsent)?;
    registry.register("port-open", PortOpen)?;
    registry.register("redis-dataset-loaded", RedisDatasetLoaded)?;
    Ok(())
}

/// Register the built-in condition types in the process-wide registry
///
/// Safe to call more than once.
pub fn discover() -> Result<()> {
    registry::register("file-present", FilePresent)?;
    registry::register("file-absent", FileAbsent)?;
    registry::register("port-open", PortOpen)?;
    registry::register("redis-dataset-loaded", RedisDatasetLoaded)?;
    Ok(())
}
