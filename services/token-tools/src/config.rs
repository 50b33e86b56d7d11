//! Configuration types and loading
//!
//! Precedence: env vars > config file > defaults. The config file path comes
//! from `--config`, then `CONFIG_PATH`, then `token-tools.toml` in the working
//! directory. Only the implicit default path may be absent; a file named
//! explicitly must exist.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use token_auth::PollConfig;

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "token-tools.toml";

/// Overrides `[store] path`.
pub const STORE_PATH_ENV: &str = "TOKEN_BROKER_STORE_PATH";

/// Overrides `[tls] accept_invalid_certs` (`true`/`1` to enable).
pub const ACCEPT_INVALID_CERTS_ENV: &str = "TOKEN_BROKER_ACCEPT_INVALID_CERTS";

/// Root configuration
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub polling: PollingConfig,
    pub tls: TlsConfig,
    pub browser: BrowserConfig,
}

/// Tool host listener settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub max_connections: usize,
    /// How long in-flight tool calls may run after a shutdown signal.
    pub drain_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8750)),
            max_connections: 64,
            drain_timeout_secs: 30,
        }
    }
}

/// Credential store location
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Defaults to `<data_dir>/token-broker/credentials.json`.
    pub path: Option<PathBuf>,
}

/// Acquisition polling cadence
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_secs: u64,
    pub max_attempts: u32,
    pub request_timeout_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        let defaults = PollConfig::default();
        Self {
            interval_secs: defaults.interval.as_secs(),
            max_attempts: defaults.max_attempts,
            request_timeout_secs: defaults.request_timeout.as_secs(),
        }
    }
}

/// Certificate handling for authorization endpoints
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Accept self-signed or otherwise invalid certificates. Off by default.
    pub accept_invalid_certs: bool,
}

/// Browser launching
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// When false, the authorization URL is only logged for manual navigation.
    pub enabled: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Where the config came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPath {
    pub path: PathBuf,
    /// Named via CLI or env; must then exist.
    pub explicit: bool,
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(source: &ConfigPath) -> common::Result<Self> {
        let mut config = match std::fs::read_to_string(&source.path) {
            Ok(contents) => toml::from_str::<Config>(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !source.explicit => {
                Config::default()
            }
            Err(e) => return Err(e.into()),
        };

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> common::Result<()> {
        if let Ok(path) = std::env::var(STORE_PATH_ENV) {
            if !path.trim().is_empty() {
                self.store.path = Some(PathBuf::from(path.trim()));
            }
        }

        if let Ok(value) = std::env::var(ACCEPT_INVALID_CERTS_ENV) {
            self.tls.accept_invalid_certs = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" | "" => false,
                other => {
                    return Err(common::Error::Config(format!(
                        "{ACCEPT_INVALID_CERTS_ENV} must be true or false, got: {other}"
                    )));
                }
            };
        }

        Ok(())
    }

    fn validate(&self) -> common::Result<()> {
        if self.server.max_connections == 0 {
            return Err(common::Error::Config(
                "server.max_connections must be greater than 0".into(),
            ));
        }
        if self.polling.interval_secs == 0 {
            return Err(common::Error::Config(
                "polling.interval_secs must be greater than 0".into(),
            ));
        }
        if self.polling.max_attempts == 0 {
            return Err(common::Error::Config(
                "polling.max_attempts must be greater than 0".into(),
            ));
        }
        if self.polling.request_timeout_secs == 0 {
            return Err(common::Error::Config(
                "polling.request_timeout_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Polling settings in the form the acquirer takes.
    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            interval: Duration::from_secs(self.polling.interval_secs),
            max_attempts: self.polling.max_attempts,
            request_timeout: Duration::from_secs(self.polling.request_timeout_secs),
        }
    }

    /// Configured store path, or the per-user default.
    pub fn store_path(&self) -> common::Result<PathBuf> {
        match &self.store.path {
            Some(path) => Ok(path.clone()),
            None => common::paths::default_store_path(),
        }
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> ConfigPath {
        if let Some(p) = cli_path {
            return ConfigPath {
                path: PathBuf::from(p),
                explicit: true,
            };
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return ConfigPath {
                path: PathBuf::from(p),
                explicit: true,
            };
        }
        ConfigPath {
            path: Path::new(DEFAULT_CONFIG_FILE).to_path_buf(),
            explicit: false,
        }
    }
}
