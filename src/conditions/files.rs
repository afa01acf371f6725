//! File presence conditions
//!
//! # Examples
//!
//! ## Wait for a lock file to disappear
//!
//! **YAML Format:**
//! ```yaml
//! - file-absent:
//!     path: /var/run/app.lock
//!     timeout: 60
//! ```
//!
//! ## Wait for a pid file
//!
//! **YAML Format:**
//! ```yaml
//! - file-present:
//!     path: /var/run/app.pid
//! ```

use crate::condition::{ConditionType, Params, Predicate};
use std::path::PathBuf;

/// Fulfilled once `path` is an existing regular file
pub struct FilePresent;

/// Fulfilled once `path` is no longer an existing regular file
pub struct FileAbsent;

struct FileCheck {
    path: PathBuf,
    present: bool,
}

impl Predicate for FileCheck {
    fn test(&mut self) -> anyhow::Result<bool> {
        Ok(self.path.is_file() == self.present)
    }
}

fn file_check(params: &Params, present: bool) -> anyhow::Result<Box<dyn Predicate>> {
    Ok(Box::new(FileCheck {
        path: PathBuf::from(params.str("path")?),
        present,
    }))
}

impl ConditionType for FilePresent {
    fn required(&self) -> &'static [&'static str] {
        &["path"]
    }

    fn predicate(&self, params: &Params) -> anyhow::Result<Box<dyn Predicate>> {
        file_check(params, true)
    }
}

impl ConditionType for FileAbsent {
    fn required(&self) -> &'static [&'static str] {
        &["path"]
    }

    fn predicate(&self, params: &Params) -> anyhow::Result<Box<dyn Predicate>> {
        file_check(params, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{Condition, WaitError};
    use serde_yaml::Mapping;
    use std::fs;
    use tempfile::TempDir;

    fn args(path: &std::path::Path) -> Mapping {
        let mut args = Mapping::new();
        args.insert("path".into(), path.to_string_lossy().into_owned().into());
        args.insert("timeout".into(), 0.3.into());
        args
    }

    #[test]
    fn test_file_present_and_absent() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("file");

        let mut present = Condition::new("file-present", &FilePresent, args(&path)).unwrap();
        assert!(matches!(present.wait(), Err(WaitError::TimedOut { .. })));
        fs::write(&path, "").unwrap();
        present.wait().unwrap();

        let mut absent = Condition::new("file-absent", &FileAbsent, args(&path)).unwrap();
        assert!(matches!(absent.wait(), Err(WaitError::TimedOut { .. })));
        fs::remove_file(&path).unwrap();
        absent.wait().unwrap();
    }

    #[test]
    fn test_directory_is_not_a_file() {
        let temp_dir = TempDir::new().unwrap();
        let mut present = Condition::new("file-present", &FilePresent, args(temp_dir.path())).unwrap();
        assert!(!present.test().unwrap());
    }

    #[test]
    fn test_path_is_required() {
        let err = Condition::new("file-present", &FilePresent, Mapping::new()).unwrap_err();
        assert!(err.to_string().contains("required argument missing: path"));
    }
}
