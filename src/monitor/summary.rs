use std::fmt::Write as _;

use chrono::{DateTime, SecondsFormat, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvironmentStatus {
    Completed,
    /// The environment could not be scanned at all.
    Failed(String),
}

/// Counters for one monitored environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentReport {
    pub environment_id: String,
    pub status: EnvironmentStatus,
    /// The flow listing stopped early; only the flows it returned were scanned.
    pub flow_listing_incomplete: bool,
    pub flows_scanned: usize,
    /// Flows whose run listing failed or came back incomplete.
    pub flow_errors: usize,
    pub failures_found: usize,
    pub inserted: usize,
    pub already_recorded: usize,
    pub dedup_errors: usize,
    pub insert_errors: usize,
}

impl EnvironmentReport {
    pub fn new(environment_id: &str) -> Self {
        Self {
            environment_id: environment_id.to_string(),
            status: EnvironmentStatus::Completed,
            flow_listing_incomplete: false,
            flows_scanned: 0,
            flow_errors: 0,
            failures_found: 0,
            inserted: 0,
            already_recorded: 0,
            dedup_errors: 0,
            insert_errors: 0,
        }
    }

    pub fn failed(environment_id: &str, reason: impl Into<String>) -> Self {
        Self {
            status: EnvironmentStatus::Failed(reason.into()),
            ..Self::new(environment_id)
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, EnvironmentStatus::Failed(_))
    }

    pub fn has_errors(&self) -> bool {
        self.is_failed() || self.flow_listing_incomplete || self.error_count() > 0
    }

    pub fn error_count(&self) -> usize {
        self.flow_errors + self.dedup_errors + self.insert_errors
    }
}

/// Outcome of one monitor run across every configured environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub window_start: DateTime<Utc>,
    pub environments: Vec<EnvironmentReport>,
}

impl RunSummary {
    pub fn total_failures_processed(&self) -> usize {
        self.environments.iter().map(|env| env.failures_found).sum()
    }

    pub fn new_failures_added(&self) -> usize {
        self.environments.iter().map(|env| env.inserted).sum()
    }

    pub fn failed_environments(&self) -> usize {
        self.environments.iter().filter(|env| env.is_failed()).count()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Window start: {}",
            self.window_start.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        for env in &self.environments {
            match &env.status {
                EnvironmentStatus::Completed => {
                    let _ = writeln!(
                        out,
                        "  {}: flows={}{} failures={} added={} existing={} errors={}",
                        env.environment_id,
                        env.flows_scanned,
                        if env.flow_listing_incomplete { " (listing incomplete)" } else { "" },
                        env.failures_found,
                        env.inserted,
                        env.already_recorded,
                        env.error_count()
                    );
                }
                EnvironmentStatus::Failed(reason) => {
                    let _ = writeln!(out, "  {}: FAILED ({})", env.environment_id, reason);
                }
            }
        }
        let _ = write!(
            out,
            "TotalFailuresProcessed={}, NewFailuresAdded={}",
            self.total_failures_processed(),
            self.new_failures_added()
        );
        out
    }
}
