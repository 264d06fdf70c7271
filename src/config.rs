//! Shared-directory configuration for Marginalia
//!
//! Both processes rendezvous on a fixed per-user directory of JSON files:
//! - `state.json` — full document serialization, owned by this process
//! - `document.json` — export snapshot, owned by this process, read by the CLI
//! - `agent-response.json` — written by the agent, read/deleted by this process
//!
//! The directory resolves from an explicit path, the `MARGINALIA_DIR`
//! environment variable, or the platform-local data directory, in that order.

use crate::error::{MarginaliaError, Result};
use std::path::{Path, PathBuf};

/// Local document state file name
pub const STATE_FILE: &str = "state.json";

/// Export snapshot file name
pub const EXPORT_FILE: &str = "document.json";

/// Agent response file name
pub const RESPONSE_FILE: &str = "agent-response.json";

/// Quiet interval for the debounced save, in milliseconds
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

/// Agent response poll cadence, in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Environment variable overriding the shared directory
pub const DIR_ENV_VAR: &str = "MARGINALIA_DIR";

/// Resolved locations of the three shared files
#[derive(Debug, Clone)]
pub struct SharedPaths {
    dir: PathBuf,
}

impl SharedPaths {
    /// Use an explicit shared directory
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Resolve the shared directory from CLI arg, env var, or platform default
    pub fn resolve(explicit: Option<PathBuf>) -> Self {
        let dir = explicit
            .or_else(|| std::env::var(DIR_ENV_VAR).ok().map(PathBuf::from))
            .unwrap_or_else(|| {
                dirs::data_local_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("marginalia")
            });
        Self { dir }
    }

    /// Create the shared directory if it does not exist
    pub fn ensure_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            MarginaliaError::Config(format!(
                "Failed to create shared directory {}: {}",
                self.dir.display(),
                e
            ))
        })
    }

    /// The shared directory itself
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path to the local document state file
    pub fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    /// Path to the export snapshot
    pub fn export_path(&self) -> PathBuf {
        self.dir.join(EXPORT_FILE)
    }

    /// Path to the agent response file
    pub fn response_path(&self) -> PathBuf {
        self.dir.join(RESPONSE_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_file_names() {
        let paths = SharedPaths::new("/tmp/shared");
        assert_eq!(paths.state_path(), PathBuf::from("/tmp/shared/state.json"));
        assert_eq!(
            paths.export_path(),
            PathBuf::from("/tmp/shared/document.json")
        );
        assert_eq!(
            paths.response_path(),
            PathBuf::from("/tmp/shared/agent-response.json")
        );
    }

    #[test]
    #[serial]
    fn test_resolve_explicit_wins() {
        std::env::set_var(DIR_ENV_VAR, "/tmp/from-env");
        let paths = SharedPaths::resolve(Some(PathBuf::from("/tmp/explicit")));
        assert_eq!(paths.dir(), Path::new("/tmp/explicit"));
        std::env::remove_var(DIR_ENV_VAR);
    }

    #[test]
    #[serial]
    fn test_resolve_env_var() {
        std::env::set_var(DIR_ENV_VAR, "/tmp/from-env");
        let paths = SharedPaths::resolve(None);
        assert_eq!(paths.dir(), Path::new("/tmp/from-env"));
        std::env::remove_var(DIR_ENV_VAR);
    }

    #[test]
    #[serial]
    fn test_resolve_default_is_per_user() {
        std::env::remove_var(DIR_ENV_VAR);
        let paths = SharedPaths::resolve(None);
        assert!(paths.dir().ends_with("marginalia"));
    }

    #[test]
    fn test_ensure_dir() {
        let temp = tempfile::TempDir::new().unwrap();
        let paths = SharedPaths::new(temp.path().join("nested").join("shared"));
        paths.ensure_dir().unwrap();
        assert!(paths.dir().is_dir());
    }
}
