//! TCP port condition
//!
//! Waits until a service accepts connections. Useful for ensuring that a
//! dependency is listening before the command is started.
//!
//! # Examples
//!
//! ## Wait for a local database
//!
//! **YAML Format:**
//! ```yaml
//! - port-open:
//!     port: 5432
//!     timeout: 60
//! ```
//!
//! ## Wait for a remote service
//!
//! **YAML Format:**
//! ```yaml
//! - port-open:
//!     host: cache.internal
//!     port: 6379
//!     connect_timeout: 0.5
//! ```

use crate::condition::{ConditionType, Params, Predicate};
use anyhow::Context;
use serde_yaml::Value;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::debug;

/// Default host to connect to
fn default_host() -> Value {
    Value::from("localhost")
}

/// Default per-attempt connect timeout in seconds
fn default_connect_timeout() -> Value {
    Value::from(1)
}

/// Fulfilled once a TCP connection to `host:port` succeeds
pub struct PortOpen;

struct PortCheck {
    host: String,
    port: u16,
    connect_timeout: Duration,
}

impl Predicate for PortCheck {
    fn test(&mut self) -> anyhow::Result<bool> {
        let addrs = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .with_context(|| format!("failed to resolve {}:{}", self.host, self.port))?;

        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(_) => return Ok(true),
                Err(e) => debug!(%addr, error = %e, "connection attempt failed"),
            }
        }
        Ok(false)
    }
}

impl ConditionType for PortOpen {
    fn required(&self) -> &'static [&'static str] {
        &["port"]
    }

    fn defaults(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("host", default_host()),
            ("connect_timeout", default_connect_timeout()),
        ]
    }

    fn predicate(&self, params: &Params) -> anyhow::Result<Box<dyn Predicate>> {
        let port = params.u64("port")?;
        let port = u16::try_from(port)
            .ok()
            .filter(|p| *p != 0)
            .with_context(|| format!("port must be between 1 and 65535, got {}", port))?;

        let connect_timeout = params.f64("connect_timeout")?;
        let connect_timeout = Duration::try_from_secs_f64(connect_timeout)
            .ok()
            .filter(|d| !d.is_zero())
            .with_context(|| {
                format!("connect_timeout must be a positive number, got {}", connect_timeout)
            })?;

        Ok(Box::new(PortCheck {
            host: params.str("host")?.to_string(),
            port,
            connect_timeout,
        }))
    }
}
