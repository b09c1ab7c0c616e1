use crate::gateway_paths;
use crate::logging::LogLevel;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Overrides `server.bind`.
pub const BIND_ENV: &str = "CATALOG_GATEWAY_BIND";
/// Overrides `backend.fixture`.
pub const FIXTURE_ENV: &str = "CATALOG_GATEWAY_FIXTURE";

/// Top-level gateway configuration.
///
/// Every section is optional in the YAML file; missing keys fall back to the
/// defaults below.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub licenses: LicenseConfig,
    pub credentials: CredentialConfig,
    pub backend: BackendConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address the websocket listener binds to.
    pub bind: String,
    /// Largest accepted websocket message. `None` means unlimited.
    pub max_message_bytes: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_message_bytes: None,
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:5000".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// How long a cached product-info result stays fresh.
    pub ttl_secs: u64,
    /// Upper bound for a single remote catalog fetch, and the default wait.
    pub fetch_timeout_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            fetch_timeout_secs: 15,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LicenseConfig {
    /// Entitlement sets older than this are stale.
    pub max_age_secs: u64,
    /// Upper bound for waiting on the backend's license list.
    pub wait_timeout_secs: u64,
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            max_age_secs: 600,
            wait_timeout_secs: 10,
        }
    }
}

impl LicenseConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CredentialConfig {
    /// Directory holding `lastuser` and `<account>.key` files.
    /// Defaults to `~/.catalog-gateway/client/`.
    pub location: Option<PathBuf>,
}

impl CredentialConfig {
    /// Resolves the credential directory, creating the default one if needed.
    pub fn resolve_location(&self) -> Result<PathBuf> {
        match &self.location {
            Some(path) => Ok(path.clone()),
            None => gateway_paths::default_credential_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackendConfig {
    /// Fixture file (YAML or JSON) describing accounts, apps and packages.
    pub fixture: Option<PathBuf>,
    /// Upper bound for a login or relogin round trip.
    pub auth_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            fixture: None,
            auth_timeout_secs: 30,
        }
    }
}

impl BackendConfig {
    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: LogLevel,
    /// Also append logs to `~/.catalog-gateway/logs/gateway.log`.
    pub file: bool,
}

impl GatewayConfig {
    /// Loads configuration from `path`, or from `~/.catalog-gateway/config.yaml`
    /// when no path is given and that file exists, then applies environment
    /// overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => {
                let default_path = gateway_paths::config_path()?;
                if default_path.exists() {
                    Self::load_from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_yaml_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        // An empty file is a valid, all-defaults config.
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: GatewayConfig = serde_yaml::from_str(content)?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(bind) = std::env::var(BIND_ENV) {
            if !bind.trim().is_empty() {
                self.server.bind = bind;
            }
        }
        if let Some(fixture) = std::env::var_os(FIXTURE_ENV) {
            self.backend.fixture = Some(PathBuf::from(fixture));
        }
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
