//! Poll flow run history for failures and record the new ones.
//!
//! For every configured environment the monitor lists flows, lists each
//! flow's runs inside the polling window, keeps the failed ones and writes a
//! row per failure that the store has not seen yet. Errors are contained at
//! the smallest scope: one flow, one failure, one environment.

pub mod summary;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info, warn};
use serde::Deserialize;

use crate::dataverse::failurestore::{FailureRecord, FailureStore, InsertOutcome};
use crate::error::MonitorError;
use crate::flows::client::FlowClient;
use crate::flows::model::{Flow, FlowRun};
use crate::paging::PageFetch;

pub use summary::{EnvironmentReport, EnvironmentStatus, RunSummary};

pub const DEFAULT_WINDOW_MINUTES: i64 = 10;
/// Flow run history is kept for 30 days; a longer window finds nothing more.
pub const MAX_WINDOW_MINUTES: i64 = 30 * 24 * 60;

/// What to do when the existence check for a failure errors out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DedupPolicy {
    /// Treat the failure as new and insert it. May produce a duplicate row,
    /// never drops a failure.
    #[default]
    FailOpen,
    /// Skip the insert and count a dedup error.
    FailClosed,
}

/// Source of flows and runs, normally the Power Automate management API.
#[async_trait]
pub trait FlowSource: Send + Sync {
    async fn list_flows(&self, environment_id: &str) -> PageFetch<Flow>;

    async fn list_runs_since(
        &self,
        environment_id: &str,
        flow_id: &str,
        since: DateTime<Utc>,
    ) -> PageFetch<FlowRun>;
}

#[async_trait]
impl FlowSource for FlowClient {
    async fn list_flows(&self, environment_id: &str) -> PageFetch<Flow> {
        FlowClient::list_flows(self, environment_id).await
    }

    async fn list_runs_since(
        &self,
        environment_id: &str,
        flow_id: &str,
        since: DateTime<Utc>,
    ) -> PageFetch<FlowRun> {
        FlowClient::list_runs_since(self, environment_id, flow_id, since).await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MonitorSettings {
    pub window: Duration,
    pub dedup_policy: DedupPolicy,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            window: Duration::minutes(DEFAULT_WINDOW_MINUTES),
            dedup_policy: DedupPolicy::default(),
        }
    }
}

/// Failed runs that started strictly after `threshold`, in input order.
pub fn select_failures(runs: Vec<FlowRun>, threshold: DateTime<Utc>) -> Vec<FlowRun> {
    runs.into_iter()
        .filter(|run| run.start_time > threshold && run.is_failed())
        .collect()
}

/// Order flows by display name, case-insensitively, then by id.
pub fn sort_flows(flows: &mut [Flow]) {
    flows.sort_by(|a, b| {
        a.display_name
            .to_lowercase()
            .cmp(&b.display_name.to_lowercase())
            .then_with(|| a.id.cmp(&b.id))
    });
}

pub struct FailureMonitor<'a> {
    source: &'a dyn FlowSource,
    store: &'a dyn FailureStore,
    settings: MonitorSettings,
}

impl<'a> FailureMonitor<'a> {
    pub fn new(
        source: &'a dyn FlowSource,
        store: &'a dyn FailureStore,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            source,
            store,
            settings,
        }
    }

    /// Scan every environment in order. The window is fixed from `now` once,
    /// so every environment sees the same threshold.
    pub async fn run(&self, environments: &[String], now: DateTime<Utc>) -> RunSummary {
        let window_start = now
            .checked_sub_signed(self.settings.window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        info!(
            "Checking {} environment(s) for failed runs since {}",
            environments.len(),
            window_start.to_rfc3339()
        );

        let mut reports = Vec::with_capacity(environments.len());
        for environment_id in environments {
            reports.push(self.run_environment(environment_id, window_start).await);
        }

        let summary = RunSummary {
            window_start,
            environments: reports,
        };
        info!(
            "TotalFailuresProcessed={}, NewFailuresAdded={}",
            summary.total_failures_processed(),
            summary.new_failures_added()
        );
        summary
    }

    pub async fn run_environment(
        &self,
        environment_id: &str,
        threshold: DateTime<Utc>,
    ) -> EnvironmentReport {
        info!("Scanning environment {}", environment_id);

        let PageFetch {
            items: mut flows,
            error: flows_error,
            ..
        } = self.source.list_flows(environment_id).await;

        let mut report = EnvironmentReport::new(environment_id);
        if let Some(source) = flows_error {
            let err = MonitorError::Fetch {
                what: format!("flows of environment {environment_id}"),
                source,
            };
            if flows.is_empty() {
                error!("{err}");
                return EnvironmentReport::failed(environment_id, err.to_string());
            }
            warn!("{err}; continuing with {} flow(s)", flows.len());
            report.flow_listing_incomplete = true;
        }

        sort_flows(&mut flows);

        for flow in &flows {
            report.flows_scanned += 1;
            debug!("Checking runs of {} ({})", flow.display_name, flow.id);

            let runs = self
                .source
                .list_runs_since(environment_id, &flow.id, threshold)
                .await;
            if let Some(source) = runs.error {
                report.flow_errors += 1;
                let err = MonitorError::Fetch {
                    what: format!("runs of flow {} ({})", flow.display_name, flow.id),
                    source,
                };
                error!("{err}");
            }

            let failures = select_failures(runs.items, threshold);
            report.failures_found += failures.len();
            for run in &failures {
                self.record_failure(flow, run, &mut report).await;
            }
        }

        info!(
            "Environment {}: {} flow(s), {} failure(s), {} new",
            environment_id, report.flows_scanned, report.failures_found, report.inserted
        );
        report
    }

    async fn record_failure(&self, flow: &Flow, run: &FlowRun, report: &mut EnvironmentReport) {
        let exists = match self.store.exists(&run.run_id).await {
            Ok(exists) => exists,
            Err(source) => {
                report.dedup_errors += 1;
                let err = MonitorError::DedupCheck {
                    run_id: run.run_id.clone(),
                    source,
                };
                match self.settings.dedup_policy {
                    DedupPolicy::FailOpen => {
                        warn!("{err}; treating run as new");
                        false
                    }
                    DedupPolicy::FailClosed => {
                        error!("{err}; skipping insert");
                        return;
                    }
                }
            }
        };

        if exists {
            report.already_recorded += 1;
            debug!("Run {} already recorded", run.run_id);
            return;
        }

        match self.store.insert(&FailureRecord::from(run)).await {
            Ok(InsertOutcome::Inserted) => {
                report.inserted += 1;
                warn!(
                    "New failure: flow '{}' run {} started {}",
                    flow.display_name,
                    run.run_id,
                    run.start_time.to_rfc3339()
                );
            }
            Ok(InsertOutcome::AlreadyRecorded) => {
                report.already_recorded += 1;
                debug!("Run {} was recorded concurrently", run.run_id);
            }
            Err(source) => {
                report.insert_errors += 1;
                let err = MonitorError::Insert {
                    run_id: run.run_id.clone(),
                    source,
                };
                error!("{err}");
            }
        }
    }
}
