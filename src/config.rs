//! JSON configuration loaded once at startup and handed to each command.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::LogLevel;
use crate::auth::credentials::{ClientCredentials, DEFAULT_AUTHORITY};
use crate::dataverse::failurestore::TableSchema;
use crate::error::ConfigError;
use crate::flows::client::{
    ADMIN_AUDIENCE, DEFAULT_ADMIN_API_URL, DEFAULT_FLOW_API_URL, FLOW_AUDIENCE,
};
use crate::monitor::{DEFAULT_WINDOW_MINUTES, DedupPolicy, MAX_WINDOW_MINUTES, MonitorSettings};

pub const TENANT_ID_VAR: &str = "PPADMIN_TENANT_ID";
pub const CLIENT_ID_VAR: &str = "PPADMIN_CLIENT_ID";
pub const CLIENT_SECRET_VAR: &str = "PPADMIN_CLIENT_SECRET";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    /// Environment ids to monitor, or to restrict the other commands to.
    #[serde(default)]
    pub environments: Vec<String>,
    pub store: Option<StoreConfig>,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub endpoints: Endpoints,
    #[serde(default)]
    pub log_level: LogLevel,
    pub request_timeout_secs: Option<u64>,
}

/// Dataverse table receiving failure records.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub url: String,
    pub table_prefix: String,
    pub entity_set: String,
    /// The table has an alternate key on `<prefix>_flowrunid`.
    #[serde(default)]
    pub alternate_key: bool,
}

impl StoreConfig {
    pub fn schema(&self) -> TableSchema {
        TableSchema::new(&self.entity_set, &self.table_prefix)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_window_minutes")]
    pub window_minutes: i64,
    #[serde(default)]
    pub dedup_policy: DedupPolicy,
}

fn default_window_minutes() -> i64 {
    DEFAULT_WINDOW_MINUTES
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            window_minutes: DEFAULT_WINDOW_MINUTES,
            dedup_policy: DedupPolicy::default(),
        }
    }
}

impl MonitorConfig {
    /// Settings for the monitor. The window is clamped to the range
    /// `validate_for_monitor` accepts.
    pub fn settings(&self) -> MonitorSettings {
        MonitorSettings {
            window: chrono::Duration::minutes(self.window_minutes.clamp(1, MAX_WINDOW_MINUTES)),
            dedup_policy: self.dedup_policy,
        }
    }
}

/// Service endpoints. Only overridden for sovereign clouds and tests.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub authority: String,
    pub flow_api: String,
    pub flow_audience: String,
    pub admin_api: String,
    pub admin_audience: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            authority: DEFAULT_AUTHORITY.to_string(),
            flow_api: DEFAULT_FLOW_API_URL.to_string(),
            flow_audience: FLOW_AUDIENCE.to_string(),
            admin_api: DEFAULT_ADMIN_API_URL.to_string(),
            admin_audience: ADMIN_AUDIENCE.to_string(),
        }
    }
}

/// `<config dir>/ppadmin/config.json`.
pub fn default_path() -> Result<PathBuf, ConfigError> {
    let mut path = dirs::config_dir().ok_or(ConfigError::NoDefaultPath)?;
    path.push("ppadmin");
    path.push("config.json");
    Ok(path)
}

fn blank(value: &str) -> bool {
    value.trim().is_empty()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents, path)
    }

    pub fn parse(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        serde_json::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Let secrets come from the environment instead of the file.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for (var, field) in [
            (TENANT_ID_VAR, &mut self.tenant_id),
            (CLIENT_ID_VAR, &mut self.client_id),
            (CLIENT_SECRET_VAR, &mut self.client_secret),
        ] {
            if let Some(value) = lookup(var).filter(|value| !blank(value)) {
                *field = value;
            }
        }
    }

    pub fn credentials(&self) -> ClientCredentials {
        ClientCredentials {
            tenant_id: self.tenant_id.trim().to_string(),
            client_id: self.client_id.trim().to_string(),
            client_secret: self.client_secret.clone(),
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn validate_credentials(&self) -> Result<(), ConfigError> {
        let missing: Vec<&str> = [
            ("tenant_id", &self.tenant_id),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
        ]
        .into_iter()
        .filter(|(_, value)| blank(value))
        .map(|(name, _)| name)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(format!(
                "missing credentials: {}",
                missing.join(", ")
            )))
        }
    }

    /// Everything the failure monitor needs, checked before any request.
    pub fn validate_for_monitor(&self) -> Result<&StoreConfig, ConfigError> {
        self.validate_credentials()?;

        if self.environments.iter().all(|env| blank(env)) {
            return Err(ConfigError::Invalid(
                "at least one environment id is required".to_string(),
            ));
        }
        if !(1..=MAX_WINDOW_MINUTES).contains(&self.monitor.window_minutes) {
            return Err(ConfigError::Invalid(format!(
                "monitor.window_minutes must be between 1 and {}, got {}",
                MAX_WINDOW_MINUTES, self.monitor.window_minutes
            )));
        }

        let store = self
            .store
            .as_ref()
            .ok_or_else(|| ConfigError::Invalid("store section is required".to_string()))?;
        for (name, value) in [
            ("store.url", &store.url),
            ("store.table_prefix", &store.table_prefix),
            ("store.entity_set", &store.entity_set),
        ] {
            if blank(value) {
                return Err(ConfigError::Invalid(format!("{name} must not be empty")));
            }
        }

        Ok(store)
    }

    /// Configured environment ids with blanks removed.
    pub fn environment_ids(&self) -> Vec<String> {
        self.environments
            .iter()
            .map(|env| env.trim())
            .filter(|env| !env.is_empty())
            .map(str::to_string)
            .collect()
    }
}
