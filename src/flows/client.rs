use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;

use crate::flows::model::{Environment, Flow, FlowRun, RawEnvironment, RawFlow, RawRun};
use crate::http::build_url;
use crate::paging::{PageFetch, fetch_all_pages};

pub const DEFAULT_FLOW_API_URL: &str = "https://api.flow.microsoft.com";
pub const FLOW_AUDIENCE: &str = "https://service.flow.microsoft.com";
pub const DEFAULT_ADMIN_API_URL: &str = "https://api.bap.microsoft.com";
pub const ADMIN_AUDIENCE: &str = "https://service.powerapps.com";

const FLOW_API_VERSION: &str = "2016-11-01";
const ADMIN_API_VERSION: &str = "2020-10-01";

/// OData filter selecting runs that started after `since`.
pub fn start_time_filter(since: DateTime<Utc>) -> String {
    format!(
        "startTime gt {}",
        since.to_rfc3339_opts(SecondsFormat::Millis, true)
    )
}

fn map_fetch<R, T>(fetch: PageFetch<R>, convert: impl FnMut(R) -> Option<T>) -> PageFetch<T> {
    PageFetch {
        items: fetch.items.into_iter().filter_map(convert).collect(),
        pages: fetch.pages,
        error: fetch.error,
    }
}

/// Power Automate management API client.
pub struct FlowClient {
    client: Client,
    base_url: String,
    token: String,
}

impl FlowClient {
    pub fn new(client: &Client, base_url: &str, token: &str) -> Self {
        Self {
            client: client.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    pub fn flows_url(&self, environment_id: &str) -> String {
        build_url(
            &self.base_url,
            &format!(
                "/providers/Microsoft.ProcessSimple/scopes/admin/environments/{}/v2/flows?api-version={}",
                urlencoding::encode(environment_id),
                FLOW_API_VERSION
            ),
        )
    }

    pub fn runs_url(&self, environment_id: &str, flow_id: &str, since: DateTime<Utc>) -> String {
        build_url(
            &self.base_url,
            &format!(
                "/providers/Microsoft.ProcessSimple/environments/{}/flows/{}/runs?api-version={}&$filter={}",
                urlencoding::encode(environment_id),
                urlencoding::encode(flow_id),
                FLOW_API_VERSION,
                urlencoding::encode(&start_time_filter(since))
            ),
        )
    }

    /// All flows in an environment, in server order.
    pub async fn list_flows(&self, environment_id: &str) -> PageFetch<Flow> {
        let url = self.flows_url(environment_id);
        let fetch = fetch_all_pages::<RawFlow>(&self.client, &url, &self.token).await;
        map_fetch(fetch, RawFlow::into_flow)
    }

    /// Runs of one flow that started after `since`. Only the time window is
    /// applied server side.
    pub async fn list_runs_since(
        &self,
        environment_id: &str,
        flow_id: &str,
        since: DateTime<Utc>,
    ) -> PageFetch<FlowRun> {
        let url = self.runs_url(environment_id, flow_id, since);
        let fetch = fetch_all_pages::<RawRun>(&self.client, &url, &self.token).await;
        map_fetch(fetch, |raw| raw.into_run(environment_id, flow_id))
    }
}

/// Power Platform admin (BAP) API client.
pub struct AdminClient {
    client: Client,
    base_url: String,
    token: String,
}

impl AdminClient {
    pub fn new(client: &Client, base_url: &str, token: &str) -> Self {
        Self {
            client: client.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    pub async fn list_environments(&self) -> PageFetch<Environment> {
        let url = build_url(
            &self.base_url,
            &format!(
                "/providers/Microsoft.BusinessAppPlatform/scopes/admin/environments?api-version={}",
                ADMIN_API_VERSION
            ),
        );
        let fetch = fetch_all_pages::<RawEnvironment>(&self.client, &url, &self.token).await;
        map_fetch(fetch, RawEnvironment::into_environment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;
    use httpmock::prelude::*;
    use serde_json::json;

    #[test]
    fn start_time_filter_uses_utc_millis() {
        let since = Utc.with_ymd_and_hms(2024, 5, 1, 9, 50, 0).unwrap();
        assert_eq!(
            start_time_filter(since),
            "startTime gt 2024-05-01T09:50:00.000Z"
        );
    }

    #[tokio::test]
    async fn list_runs_applies_time_filter_server_side() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/providers/Microsoft.ProcessSimple/environments/env-1/flows/flow-1/runs")
                    .query_param("api-version", "2016-11-01")
                    .query_param("$filter", "startTime gt 2024-05-01T09:50:00.000Z")
                    .header("authorization", "Bearer flow-token");
                then.status(200).json_body(json!({
                    "value": [
                        {"name": "run-a", "properties": {"startTime": "2024-05-01T09:55:00Z", "status": "Failed"}},
                        {"name": "run-b", "properties": {"startTime": "2024-05-01T09:56:00Z", "status": "Succeeded"}},
                        {"name": "", "properties": {"startTime": "2024-05-01T09:57:00Z", "status": "Failed"}}
                    ]
                }));
            })
            .await;

        let client = FlowClient::new(&Client::new(), &server.base_url(), "flow-token");
        let since = Utc.with_ymd_and_hms(2024, 5, 1, 9, 50, 0).unwrap();
        let fetch = client.list_runs_since("env-1", "flow-1", since).await;

        mock.assert_async().await;
        assert!(fetch.is_complete());
        let ids: Vec<&str> = fetch.items.iter().map(|run| run.run_id.as_str()).collect();
        assert_eq!(ids, vec!["run-a", "run-b"]);
        assert!(fetch.items.iter().all(|run| run.flow_id == "flow-1"));
    }

    #[tokio::test]
    async fn list_flows_follows_next_link() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/providers/Microsoft.ProcessSimple/scopes/admin/environments/env-1/v2/flows");
                then.status(200).json_body(json!({
                    "value": [{"name": "flow-b", "properties": {"displayName": "Beta", "state": "Started"}}],
                    "nextLink": server.url("/flows-page-2")
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/flows-page-2");
                then.status(200).json_body(json!({
                    "value": [{"name": "flow-a", "properties": {"displayName": "Alpha"}}]
                }));
            })
            .await;

        let client = FlowClient::new(&Client::new(), &server.base_url(), "flow-token");
        let fetch = client.list_flows("env-1").await;

        assert_eq!(fetch.pages, 2);
        assert_eq!(
            fetch.items,
            vec![
                Flow {
                    id: "flow-b".into(),
                    display_name: "Beta".into(),
                    state: Some("Started".into())
                },
                Flow {
                    id: "flow-a".into(),
                    display_name: "Alpha".into(),
                    state: None
                },
            ]
        );
    }

    #[tokio::test]
    async fn list_environments_reads_instance_url() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/providers/Microsoft.BusinessAppPlatform/scopes/admin/environments")
                    .query_param("api-version", "2020-10-01");
                then.status(200).json_body(json!({
                    "value": [
                        {"name": "env-1", "properties": {
                            "displayName": "Contoso (default)",
                            "linkedEnvironmentMetadata": {"instanceUrl": "https://contoso.crm.dynamics.com/"}
                        }},
                        {"name": "env-2", "properties": {"displayName": "Teams only"}}
                    ]
                }));
            })
            .await;

        let client = AdminClient::new(&Client::new(), &server.base_url(), "admin-token");
        let environments = client.list_environments().await.into_result().expect("environments");

        assert_eq!(environments.len(), 2);
        assert_eq!(
            environments[0].instance_url.as_deref(),
            Some("https://contoso.crm.dynamics.com/")
        );
        assert_eq!(environments[1].instance_url, None);
    }
}
