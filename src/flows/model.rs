use std::fmt;

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Power Platform environment as listed by the admin API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    pub id: String,
    pub display_name: String,
    /// Dataverse instance URL, absent for environments without a database.
    pub instance_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flow {
    pub id: String,
    pub display_name: String,
    pub state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Succeeded,
    Failed,
    Running,
    Cancelled,
    Other(String),
}

impl RunStatus {
    pub fn parse(value: &str) -> Self {
        let trimmed = value.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "succeeded" => RunStatus::Succeeded,
            "failed" => RunStatus::Failed,
            "running" => RunStatus::Running,
            "cancelled" | "canceled" => RunStatus::Cancelled,
            _ => RunStatus::Other(trimmed.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RunStatus::Succeeded => "Succeeded",
            RunStatus::Failed => "Failed",
            RunStatus::Running => "Running",
            RunStatus::Cancelled => "Cancelled",
            RunStatus::Other(other) => other,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One execution of a flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowRun {
    pub run_id: String,
    pub flow_id: String,
    pub environment_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub is_aborted: bool,
}

impl FlowRun {
    pub fn is_failed(&self) -> bool {
        self.status == RunStatus::Failed
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawEnvironment {
    pub name: Option<String>,
    #[serde(default)]
    pub properties: RawEnvironmentProperties,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawEnvironmentProperties {
    pub display_name: Option<String>,
    pub linked_environment_metadata: Option<RawLinkedMetadata>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawLinkedMetadata {
    pub instance_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawFlow {
    pub name: Option<String>,
    #[serde(default)]
    pub properties: RawFlowProperties,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawFlowProperties {
    pub display_name: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawRun {
    pub name: Option<String>,
    #[serde(default)]
    pub properties: RawRunProperties,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawRunProperties {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: Option<String>,
    pub error: Option<RawRunError>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawRunError {
    pub code: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

impl RawEnvironment {
    pub(crate) fn into_environment(self) -> Option<Environment> {
        let id = non_empty(self.name)?;
        let display_name = non_empty(self.properties.display_name).unwrap_or_else(|| id.clone());
        let instance_url = self
            .properties
            .linked_environment_metadata
            .and_then(|meta| non_empty(meta.instance_url));
        Some(Environment {
            id,
            display_name,
            instance_url,
        })
    }
}

impl RawFlow {
    pub(crate) fn into_flow(self) -> Option<Flow> {
        let id = non_empty(self.name)?;
        let display_name = non_empty(self.properties.display_name).unwrap_or_else(|| id.clone());
        Some(Flow {
            id,
            display_name,
            state: non_empty(self.properties.state),
        })
    }
}

impl RawRun {
    /// Runs without an id or start time cannot be recorded and are dropped.
    pub(crate) fn into_run(self, environment_id: &str, flow_id: &str) -> Option<FlowRun> {
        let run_id = non_empty(self.name)?;
        let start_time = self.properties.start_time?;
        let raw_status = self.properties.status.unwrap_or_default();
        let status = RunStatus::parse(&raw_status);
        let error_code = self.properties.error.and_then(|error| error.code);
        let is_aborted = status == RunStatus::Cancelled
            || raw_status.trim().eq_ignore_ascii_case("aborted")
            || error_code
                .as_deref()
                .is_some_and(|code| code.trim().eq_ignore_ascii_case("aborted"));

        Some(FlowRun {
            run_id,
            flow_id: flow_id.to_string(),
            environment_id: environment_id.to_string(),
            start_time,
            end_time: self.properties.end_time,
            status,
            is_aborted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn run_status_parsing_is_case_insensitive() {
        assert_eq!(RunStatus::parse("Failed"), RunStatus::Failed);
        assert_eq!(RunStatus::parse("failed"), RunStatus::Failed);
        assert_eq!(RunStatus::parse("Canceled"), RunStatus::Cancelled);
        assert_eq!(
            RunStatus::parse("Skipped"),
            RunStatus::Other("Skipped".to_string())
        );
        assert_eq!(RunStatus::Other("Skipped".to_string()).to_string(), "Skipped");
    }

    #[test]
    fn raw_run_maps_management_api_shape() {
        let raw: RawRun = serde_json::from_value(json!({
            "name": "08585000000000000000000000000CU01",
            "id": "/providers/Microsoft.ProcessSimple/environments/env/flows/flow/runs/08585000000000000000000000000CU01",
            "properties": {
                "startTime": "2024-05-01T10:00:00.1234567Z",
                "endTime": "2024-05-01T10:00:05Z",
                "status": "Failed",
                "error": { "code": "ActionFailed", "message": "An action failed." }
            }
        }))
        .expect("raw run");

        let run = raw.into_run("env", "flow").expect("run");
        assert_eq!(run.run_id, "08585000000000000000000000000CU01");
        assert_eq!(run.environment_id, "env");
        assert_eq!(run.flow_id, "flow");
        assert!(run.is_failed());
        assert!(!run.is_aborted);
        assert!(run.end_time.is_some());
    }

    #[test]
    fn cancelled_and_aborted_runs_are_flagged() {
        let cancelled: RawRun = serde_json::from_value(json!({
            "name": "run-1",
            "properties": { "startTime": "2024-05-01T10:00:00Z", "status": "Cancelled" }
        }))
        .expect("raw run");
        assert!(cancelled.into_run("env", "flow").expect("run").is_aborted);

        let aborted: RawRun = serde_json::from_value(json!({
            "name": "run-2",
            "properties": {
                "startTime": "2024-05-01T10:00:00Z",
                "status": "Failed",
                "error": { "code": "Aborted" }
            }
        }))
        .expect("raw run");
        let run = aborted.into_run("env", "flow").expect("run");
        assert!(run.is_failed());
        assert!(run.is_aborted);
    }

    #[test]
    fn runs_without_start_time_are_dropped() {
        let raw: RawRun = serde_json::from_value(json!({
            "name": "run-3",
            "properties": { "status": "Running" }
        }))
        .expect("raw run");
        assert!(raw.into_run("env", "flow").is_none());
    }

    #[test]
    fn environment_falls_back_to_id_for_display_name() {
        let raw: RawEnvironment = serde_json::from_value(json!({
            "name": "Default-1234",
            "properties": {
                "displayName": " ",
                "linkedEnvironmentMetadata": { "instanceUrl": "https://org.crm.dynamics.com/" }
            }
        }))
        .expect("raw environment");
        let env = raw.into_environment().expect("environment");
        assert_eq!(env.display_name, "Default-1234");
        assert_eq!(env.instance_url.as_deref(), Some("https://org.crm.dynamics.com/"));
    }
}
