/// Authentication helpers for Microsoft identity client-credentials flows.
pub mod auth;
pub mod config;
/// Dataverse Web API client and the failure-record table built on it.
pub mod dataverse;
pub mod error;
/// Power Automate and Power Platform admin API access.
pub mod flows;
pub mod http;
pub mod monitor;
pub mod pac;
pub mod paging;
/// CSV reports over environments and apps.
pub mod reports;

/// Logging verbosity, settable from the config file.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Emit verbose debug output.
    Debug,
    /// Emit standard informational output.
    Information,
}

impl Default for LogLevel {
    /// Defaults to `Information` logging.
    fn default() -> Self {
        LogLevel::Information
    }
}

impl LogLevel {
    pub fn level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Information => log::LevelFilter::Info,
        }
    }
}
