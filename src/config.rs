//! TOML configuration with `ROTA_*` environment overrides.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Default path of the refresh endpoint, relative to a service base URL.
pub const DEFAULT_REFRESH_PATH: &str = "auth/refresh";

/// Prefix of per-service base URL env vars (`ROTA_SERVICE_BILLING=...`).
const SERVICE_ENV_PREFIX: &str = "ROTA_SERVICE_";

// ---------------------------------------------------------------------------
// Environment override tracking
// ---------------------------------------------------------------------------

/// Tracks which configuration settings are overridden by environment variables.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    overrides: HashMap<String, String>,
}

impl EnvOverrides {
    /// Check whether a setting key (e.g. "client.refresh_path") is overridden by an env var.
    pub fn is_overridden(&self, key: &str) -> bool {
        self.overrides.contains_key(key)
    }

    /// Get the env var name that overrides the given setting key.
    pub fn env_var_for(&self, key: &str) -> Option<&str> {
        self.overrides.get(key).map(String::as_str)
    }

    /// Get all overrides as a map of setting key -> env var name.
    pub fn all(&self) -> &HashMap<String, String> {
        &self.overrides
    }

    fn record(&mut self, key: &str, env_var: &str) {
        self.overrides.insert(key.to_string(), env_var.to_string());
    }
}

// ---------------------------------------------------------------------------
// Main configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Backend services by name, each mapped to its base URL.
    #[serde(default)]
    pub services: BTreeMap<String, String>,
    /// Env var overrides are not serialized to TOML.
    #[serde(skip)]
    pub env_overrides: EnvOverrides,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Refresh endpoint path, resolved against each service's base URL.
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,
}

impl ClientConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            refresh_path: default_refresh_path(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Credentials file for the `file` backend. Defaults to
    /// `<config dir>/rota-client/credentials.json`.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    File,
    Keyring,
    Memory,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Keyring => write!(f, "keyring"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

impl FromStr for StorageBackend {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" => Ok(Self::File),
            "keyring" => Ok(Self::Keyring),
            "memory" => Ok(Self::Memory),
            _ => Err(format!("Unknown storage backend: {s}")),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

fn default_user_agent() -> String {
    crate::net::client::USER_AGENT.to_string()
}
const fn default_connect_timeout_secs() -> u64 {
    10
}
const fn default_request_timeout_secs() -> u64 {
    60
}
fn default_refresh_path() -> String {
    DEFAULT_REFRESH_PATH.to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

// ---------------------------------------------------------------------------
// Config loading and env overrides
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a TOML file, then apply environment variable
    /// overrides. Any setting prefixed with `ROTA_` takes precedence over the
    /// file value and is tracked in `env_overrides`.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_toml(&content)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path.display());
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from TOML text, without env overrides.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Save the current (file-level) configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Base URL of a configured service.
    pub fn service_url(&self, name: &str) -> Result<&str> {
        self.services
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| Error::Config(format!("Unknown service: {name}")))
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(std::env::vars());
    }

    /// Apply overrides from the given variables.
    ///
    /// Every supported setting has a corresponding `ROTA_*` variable. When
    /// present, its value replaces the file/default value and the setting key
    /// is recorded in `env_overrides`.
    pub fn apply_overrides_from<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: HashMap<String, String> = vars.into_iter().collect();
        let mut ov = std::mem::take(&mut self.env_overrides);

        // -- Helpers (macros for concise per-field overrides) --

        macro_rules! env_str {
            ($key:expr, $env:expr, $field:expr) => {
                if let Some(val) = vars.get($env) {
                    $field = val.clone();
                    ov.record($key, $env);
                }
            };
        }
        macro_rules! env_bool {
            ($key:expr, $env:expr, $field:expr) => {
                if let Some(val) = vars.get($env) {
                    $field = matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
                    ov.record($key, $env);
                }
            };
        }
        macro_rules! env_parse {
            ($key:expr, $env:expr, $field:expr) => {
                if let Some(val) = vars.get($env) {
                    if let Ok(parsed) = val.parse() {
                        $field = parsed;
                        ov.record($key, $env);
                    }
                }
            };
        }

        // -- Client --
        env_str!("client.user_agent", "ROTA_CLIENT_USER_AGENT", self.client.user_agent);
        env_parse!(
            "client.connect_timeout_secs",
            "ROTA_CLIENT_CONNECT_TIMEOUT",
            self.client.connect_timeout_secs
        );
        env_parse!(
            "client.request_timeout_secs",
            "ROTA_CLIENT_REQUEST_TIMEOUT",
            self.client.request_timeout_secs
        );
        env_str!("client.refresh_path", "ROTA_CLIENT_REFRESH_PATH", self.client.refresh_path);

        // -- Storage --
        env_parse!("storage.backend", "ROTA_STORAGE_BACKEND", self.storage.backend);
        if let Some(val) = vars.get("ROTA_STORAGE_PATH") {
            self.storage.path = if val.is_empty() { None } else { Some(PathBuf::from(val)) };
            ov.record("storage.path", "ROTA_STORAGE_PATH");
        }

        // -- Logging --
        env_str!("logging.level", "ROTA_LOG_LEVEL", self.logging.level);
        env_bool!("logging.json", "ROTA_LOG_JSON", self.logging.json);

        // -- Services --
        for (env, val) in &vars {
            if let Some(name) = env.strip_prefix(SERVICE_ENV_PREFIX) {
                if name.is_empty() || val.is_empty() {
                    continue;
                }
                let name = name.to_lowercase().replace('_', "-");
                ov.record(&format!("services.{name}"), env);
                self.services.insert(name, val.clone());
            }
        }

        self.env_overrides = ov;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.client.refresh_path, "auth/refresh");
        assert_eq!(config.client.connect_timeout_secs, 10);
        assert_eq!(config.client.request_timeout_secs, 60);
        assert!(config.client.user_agent.starts_with("rota-client/"));
        assert_eq!(config.storage.backend, StorageBackend::File);
        assert!(config.storage.path.is_none());
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
        assert!(config.services.is_empty());
    }

    #[test]
    fn test_parse_toml() {
        let config = Config::from_toml(
            r#"
            [client]
            refresh_path = "api/token/refresh"
            request_timeout_secs = 5

            [storage]
            backend = "memory"

            [services]
            contracts = "https://contracts.example.com/api/"
            shifts = "https://shifts.example.com"
            "#,
        )
        .unwrap();

        assert_eq!(config.client.refresh_path, "api/token/refresh");
        assert_eq!(config.client.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.client.connect_timeout_secs, 10);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(
            config.service_url("contracts").unwrap(),
            "https://contracts.example.com/api/"
        );
        assert!(config.service_url("teams").is_err());
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = Config::from_toml("[client\nrefresh_path = ").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides_from(vars(&[
            ("ROTA_CLIENT_REFRESH_PATH", "v2/auth/refresh"),
            ("ROTA_CLIENT_REQUEST_TIMEOUT", "15"),
            ("ROTA_CLIENT_CONNECT_TIMEOUT", "not-a-number"),
            ("ROTA_STORAGE_BACKEND", "keyring"),
            ("ROTA_LOG_JSON", "yes"),
            ("ROTA_SERVICE_SHIFT_BOARDS", "https://shifts.example.com"),
            ("UNRELATED", "x"),
        ]));

        assert_eq!(config.client.refresh_path, "v2/auth/refresh");
        assert_eq!(config.client.request_timeout_secs, 15);
        assert_eq!(config.client.connect_timeout_secs, 10);
        assert_eq!(config.storage.backend, StorageBackend::Keyring);
        assert!(config.logging.json);
        assert_eq!(
            config.service_url("shift-boards").unwrap(),
            "https://shifts.example.com"
        );

        let ov = &config.env_overrides;
        assert!(ov.is_overridden("client.refresh_path"));
        assert!(ov.is_overridden("services.shift-boards"));
        assert!(!ov.is_overridden("client.connect_timeout_secs"));
        assert_eq!(ov.env_var_for("storage.backend"), Some("ROTA_STORAGE_BACKEND"));
    }

    #[test]
    fn test_storage_path_override_can_clear() {
        let mut config = Config::default();
        config.storage.path = Some(PathBuf::from("/tmp/creds.json"));
        config.apply_overrides_from(vars(&[("ROTA_STORAGE_PATH", "")]));
        assert!(config.storage.path.is_none());
    }

    #[test]
    fn test_storage_backend_from_str() {
        assert_eq!("file".parse::<StorageBackend>().unwrap(), StorageBackend::File);
        assert_eq!("Keyring".parse::<StorageBackend>().unwrap(), StorageBackend::Keyring);
        assert_eq!("memory".parse::<StorageBackend>().unwrap(), StorageBackend::Memory);
        assert!("unknown".parse::<StorageBackend>().is_err());
    }

    #[test]
    fn test_storage_backend_display() {
        assert_eq!(StorageBackend::File.to_string(), "file");
        assert_eq!(StorageBackend::Keyring.to_string(), "keyring");
        assert_eq!(StorageBackend::Memory.to_string(), "memory");
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rota.toml");

        let mut config = Config::default();
        config
            .services
            .insert("teams".into(), "https://teams.example.com".into());
        config.save(&path).unwrap();

        let loaded = Config::from_toml(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.service_url("teams").unwrap(), "https://teams.example.com");
        assert_eq!(loaded.client.refresh_path, DEFAULT_REFRESH_PATH);
    }
}
