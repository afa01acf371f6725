//! Redis dataset condition
//!
//! A Redis server accepts connections while it is still loading its dataset
//! from disk, answering every command with a `LOADING` error until done.
//! This condition waits for that phase to end.
//!
//! # Examples
//!
//! **YAML Format:**
//! ```yaml
//! - redis-dataset-loaded
//! - redis-dataset-loaded:
//!     host: cache.internal
//!     password: s3cret
//!     timeout: 120
//! ```

use crate::condition::{ConditionType, Params, Predicate};
use anyhow::Context;
use redis::{ConnectionAddr, ConnectionInfo, ErrorKind, RedisConnectionInfo, RedisResult};
use serde_yaml::Value;
use std::time::Duration;
use tracing::debug;

/// Limit on establishing one connection
const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Fulfilled once the server answers `DBSIZE` without a `LOADING` error
pub struct RedisDatasetLoaded;

struct DatasetCheck {
    client: redis::Client,
    host: String,
    port: u16,
}

impl Predicate for DatasetCheck {
    fn test(&mut self) -> anyhow::Result<bool> {
        let mut connection = self
            .client
            .get_connection_with_timeout(CONNECT_TIMEOUT)
            .with_context(|| format!("failed to connect to redis at {}:{}", self.host, self.port))?;
        dataset_loaded(redis::cmd("DBSIZE").query(&mut connection))
    }
}

/// Interpret the reply to `DBSIZE`
fn dataset_loaded(reply: RedisResult<i64>) -> anyhow::Result<bool> {
    match reply {
        Ok(keys) => {
            debug!(keys, "redis dataset loaded");
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::BusyLoadingError => {
            debug!(error = %e, "redis still loading");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

impl ConditionType for RedisDatasetLoaded {
    fn defaults(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("host", Value::from("localhost")),
            ("port", Value::from(6379)),
            ("password", Value::Null),
        ]
    }

    fn predicate(&self, params: &Params) -> anyhow::Result<Box<dyn Predicate>> {
        let port = params.u64("port")?;
        let port = u16::try_from(port)
            .ok()
            .filter(|p| *p != 0)
            .with_context(|| format!("port must be between 1 and 65535, got {}", port))?;

        let password = match params.get("password") {
            None | Some(Value::Null) => None,
            Some(_) => Some(params.str("password")?.to_string()),
        };

        let host = params.str("host")?.to_string();
        let info = ConnectionInfo {
            addr: ConnectionAddr::Tcp(host.clone(), port),
            redis: RedisConnectionInfo {
                db: 0,
                username: None,
                password,
            },
        };
        let client = redis::Client::open(info).context("invalid redis connection settings")?;
        Ok(Box::new(DatasetCheck { client, host, port }))
    }
}
