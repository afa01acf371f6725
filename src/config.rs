//! Settings management for multiwait
//!
//! This module provides the settings document structure and loading
//! functionality. The format is chosen from the file extension.
//!
//! # Examples
//!
//! **YAML Format:**
//! ```yaml
//! defaults:
//!   timeout: 30
//! conditions:
//!   - file-absent:
//!       path: /var/run/app.lock
//!   - port-open:
//!       port: 6379
//! ```
//!
//! **JSON Format:**
//! ```json
//! {
//!   "defaults": {"timeout": 30},
//!   "conditions": [
//!     {"file-absent": {"path": "/var/run/app.lock"}},
//!     {"port-open": {"port": 6379}}
//!   ]
//! }
//! ```
//!
//! **TOML Format:**
//! ```toml
//! conditions = [
//!   { file-absent = { path = "/var/run/app.lock" } },
//!   { port-open = { port = 6379 } },
//! ]
//!
//! [defaults]
//! timeout = 30
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};

/// System-wide settings location
pub const SYSTEM_SETTINGS_PATH: &str = "/etc/multiwait.yaml";

/// Settings document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Condition specifications, in reporting order
    pub conditions: Vec<Value>,
    /// Parameters shared by every parameterized condition
    #[serde(default)]
    pub defaults: Mapping,
}

/// Supported settings file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsFormat {
    Yaml,
    Json,
    Toml,
}

impl SettingsFormat {
    /// Pick the format from a file extension
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => Ok(SettingsFormat::Yaml),
            Some("json") => Ok(SettingsFormat::Json),
            Some("toml") => Ok(SettingsFormat::Toml),
            _ => Err(Error::Settings(format!(
                "unsupported settings file format: {}",
                path.display()
            ))),
        }
    }
}

/// Parse a settings document
pub fn parse_settings(contents: &str, format: SettingsFormat) -> Result<Settings> {
    let parsed = match format {
        SettingsFormat::Yaml => serde_yaml::from_str(contents).map_err(|e| e.to_string()),
        SettingsFormat::Json => serde_json::from_str(contents).map_err(|e| e.to_string()),
        SettingsFormat::Toml => toml::from_str(contents).map_err(|e| e.to_string()),
    };
    parsed.map_err(Error::Settings)
}

/// Load the settings document at `path`
pub fn load_settings(path: &Path) -> Result<Settings> {
    let format = SettingsFormat::from_path(path)?;
    let contents = std::fs::read_to_string(path)
        .map_err(|e| Error::Settings(format!("cannot read {}: {}", path.display(), e)))?;
    parse_settings(&contents, format)
}

/// Settings path used when none is given explicitly
///
/// `/etc/multiwait.yaml` if it exists, otherwise the user configuration
/// directory (`~/.config/multiwait/multiwait.yaml` on Linux).
pub fn default_settings_path() -> PathBuf {
    let system = PathBuf::from(SYSTEM_SETTINGS_PATH);
    if system.exists() {
        system
    } else {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("multiwait")
            .join("multiwait.yaml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_load_yaml_settings() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("multiwait.yaml");

        let yaml_content = r#"
defaults:
  timeout: 30
conditions:
  - redis-dataset-loaded
  - file-absent:
      path: /path/to/file
"#;
        fs::write(&path, yaml_content).unwrap();

        let settings = load_settings(&path).unwrap();
        assert_eq!(settings.conditions.len(), 2);
        assert_eq!(settings.conditions[0], Value::from("redis-dataset-loaded"));
        assert_eq!(settings.defaults.get("timeout"), Some(&Value::from(30)));
    }

    #[test]
    fn test_load_json_settings() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("multiwait.json");

        let json_content = r#"{
  "conditions": [
    {"file-present": {"path": "/tmp/ready"}}
  ]
}"#;
        fs::write(&path, json_content).unwrap();

        let settings = load_settings(&path).unwrap();
        assert_eq!(settings.conditions.len(), 1);
        assert!(settings.defaults.is_empty());
        let entry = settings.conditions[0].as_mapping().unwrap();
        assert!(entry.contains_key("file-present"));
    }

    #[test]
    fn test_load_toml_settings() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("multiwait.toml");

        let toml_content = r#"
conditions = [
  "file-present",
  { port-open = { port = 6379 } },
]

[defaults]
warmup = 0.5
"#;
        fs::write(&path, toml_content).unwrap();

        let settings = load_settings(&path).unwrap();
        assert_eq!(settings.conditions.len(), 2);
        assert_eq!(settings.defaults.get("warmup"), Some(&Value::from(0.5)));
    }

    #[test]
    fn test_missing_conditions_is_an_error() {
        let err = parse_settings("defaults: {}\n", SettingsFormat::Yaml).unwrap_err();
        assert!(matches!(err, Error::Settings(_)));
    }

    #[test]
    fn test_unsupported_extension() {
        let err = load_settings(Path::new("/tmp/multiwait.ini")).unwrap_err();
        assert!(err.to_string().contains("unsupported settings file format"));
    }

    #[test]
    fn test_missing_file() {
        let temp_dir = tempdir().unwrap();
        let err = load_settings(&temp_dir.path().join("absent.yaml")).unwrap_err();
        assert!(err.to_string().contains("cannot read"));
    }
}
