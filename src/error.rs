use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

/// Failure talking to a Power Platform or Dataverse endpoint.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API responded with status {status}: {message}")]
    UnexpectedStatus { status: StatusCode, message: String },
    #[error("API returned an invalid response: {0}")]
    InvalidResponse(String),
}

/// Client-credentials token exchange failed. No further calls are possible
/// for the audience, so callers treat this as fatal.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("token endpoint responded with status {status}: {body}")]
    Rejected { status: StatusCode, body: String },
    #[error("token endpoint returned an invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("no config file given and no config directory available")]
    NoDefaultPath,
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Recoverable failures inside a monitor run. Each one is logged and counted
/// against the environment it happened in; none of them leave the monitor.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("fetching {what} failed: {source}")]
    Fetch {
        what: String,
        #[source]
        source: ApiError,
    },
    #[error("existence check for run {run_id} failed: {source}")]
    DedupCheck {
        run_id: String,
        #[source]
        source: ApiError,
    },
    #[error("inserting failure record for run {run_id} failed: {source}")]
    Insert {
        run_id: String,
        #[source]
        source: ApiError,
    },
}

#[derive(Debug, Error)]
pub enum PacError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("pac exited with status {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write report: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to write report: {0}")]
    Io(#[from] std::io::Error),
}
