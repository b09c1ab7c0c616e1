//! Home-based storage paths for all catalog-gateway persistence.
//!
//! Everything lives under `~/.catalog-gateway/`:
//! - `client/` - Saved session tokens (`<account>.key`) and the `lastuser` marker
//! - `logs/gateway.log` - File log, when enabled
//! - `config.yaml` - Optional configuration file
//!
//! The root can be moved with `CATALOG_GATEWAY_HOME`.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

/// The name of the gateway directory inside the user's home.
const GATEWAY_DIR: &str = ".catalog-gateway";

/// Environment variable overriding the gateway home directory.
pub const HOME_ENV: &str = "CATALOG_GATEWAY_HOME";

/// Returns the gateway home directory: `~/.catalog-gateway/`
///
/// Creates the directory if it doesn't exist.
///
/// # Errors
///
/// Returns an error if:
/// - Home directory cannot be determined
/// - Directory creation fails
pub fn gateway_home_dir() -> Result<PathBuf> {
    let dir = match std::env::var_os(HOME_ENV) {
        Some(path) => PathBuf::from(path),
        None => dirs::home_dir()
            .context("Could not determine home directory for gateway storage")?
            .join(GATEWAY_DIR),
    };
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create gateway directory: {}", dir.display()))?;
    Ok(dir)
}

/// Returns the default credential directory: `~/.catalog-gateway/client/`
///
/// Creates the directory if it doesn't exist.
pub fn default_credential_dir() -> Result<PathBuf> {
    let dir = gateway_home_dir()?.join("client");
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create credential directory: {}", dir.display()))?;
    Ok(dir)
}

/// Returns the log file path: `~/.catalog-gateway/logs/gateway.log`
pub fn log_file_path() -> Result<PathBuf> {
    let logs = gateway_home_dir()?.join("logs");
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs.join("gateway.log"))
}

/// Returns the default config file path: `~/.catalog-gateway/config.yaml`
///
/// The file itself is optional and is not created.
pub fn config_path() -> Result<PathBuf> {
    Ok(gateway_home_dir()?.join("config.yaml"))
}

/// Restores the previous `CATALOG_GATEWAY_HOME` value when dropped.
#[cfg(test)]
pub struct HomeGuard {
    previous: Option<std::ffi::OsString>,
}

#[cfg(test)]
impl Drop for HomeGuard {
    fn drop(&mut self) {
        match self.previous.take() {
            Some(value) => std::env::set_var(HOME_ENV, value),
            None => std::env::remove_var(HOME_ENV),
        }
    }
}

/// Points the gateway home at `path` for the lifetime of the guard.
///
/// Callers must be `#[serial]` since this mutates process environment.
#[cfg(test)]
pub fn set_home_for_test(path: PathBuf) -> HomeGuard {
    let previous = std::env::var_os(HOME_ENV);
    std::env::set_var(HOME_ENV, path);
    HomeGuard { previous }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    #[serial]
    fn test_home_override_creates_layout() {
        let temp_dir = TempDir::new().unwrap();
        let home = temp_dir.path().join("gw");
        let _guard = set_home_for_test(home.clone());

        assert_eq!(gateway_home_dir().unwrap(), home);
        let creds = default_credential_dir().unwrap();
        assert_eq!(creds, home.join("client"));
        assert!(creds.is_dir());

        let log = log_file_path().unwrap();
        assert!(log.parent().unwrap().is_dir());
        assert!(!config_path().unwrap().exists());
    }

    #[test]
    #[serial]
    fn test_guard_restores_previous_value() {
        let temp_dir = TempDir::new().unwrap();
        let outer = set_home_for_test(temp_dir.path().join("outer"));
        {
            let _inner = set_home_for_test(temp_dir.path().join("inner"));
            assert!(gateway_home_dir().unwrap().ends_with("inner"));
        }
        assert!(gateway_home_dir().unwrap().ends_with("outer"));
        drop(outer);
    }
}
