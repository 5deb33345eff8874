use chrono::{Duration, TimeZone, Utc};
use httpmock::prelude::*;
use reqwest::Client;
use serde_json::json;

use powerplatform_admin_tools::auth::{ClientCredentials, TokenProvider};
use powerplatform_admin_tools::dataverse::{DataverseFailureStore, TableSchema};
use powerplatform_admin_tools::dataverse::serviceclient::ServiceClient;
use powerplatform_admin_tools::flows::client::{FLOW_AUDIENCE, FlowClient};
use powerplatform_admin_tools::monitor::{DedupPolicy, FailureMonitor, MonitorSettings};

const ENTITY_SET: &str = "cr123_flowrunfailures";

fn credentials() -> ClientCredentials {
    ClientCredentials {
        tenant_id: "tenant".to_string(),
        client_id: "client".to_string(),
        client_secret: "secret".to_string(),
    }
}

#[tokio::test]
async fn records_only_unseen_failures() {
    let identity = MockServer::start_async().await;
    let flow_api = MockServer::start_async().await;
    let dataverse = MockServer::start_async().await;

    let flow_token = identity
        .mock_async(|when, then| {
            when.method(POST)
                .path("/tenant/oauth2/v2.0/token")
                .x_www_form_urlencoded_tuple("scope", "https://service.flow.microsoft.com/.default");
            then.status(200)
                .json_body(json!({"access_token": "flow-token", "expires_in": 3599}));
        })
        .await;
    let store_token = identity
        .mock_async(|when, then| {
            when.method(POST)
                .path("/tenant/oauth2/v2.0/token")
                .x_www_form_urlencoded_tuple("scope", &format!("{}/.default", dataverse.base_url()));
            then.status(200)
                .json_body(json!({"access_token": "store-token", "expires_in": 3599}));
        })
        .await;

    flow_api
        .mock_async(|when, then| {
            when.method(GET)
                .path("/providers/Microsoft.ProcessSimple/scopes/admin/environments/env-1/v2/flows")
                .header("authorization", "Bearer flow-token");
            then.status(200).json_body(json!({
                "value": [{"name": "flow-1", "properties": {"displayName": "Invoices"}}]
            }));
        })
        .await;
    flow_api
        .mock_async(|when, then| {
            when.method(GET)
                .path("/providers/Microsoft.ProcessSimple/environments/env-1/flows/flow-1/runs")
                .query_param("$filter", "startTime gt 2024-05-01T09:50:00.000Z")
                .header("authorization", "Bearer flow-token");
            then.status(200).json_body(json!({
                "value": [
                    {"name": "run-1", "properties": {"startTime": "2024-05-01T09:52:00Z", "status": "Failed"}},
                    {"name": "run-2", "properties": {"startTime": "2024-05-01T09:53:00Z", "status": "Succeeded"}},
                    {
                        "name": "run-3",
                        "properties": {
                            "startTime": "2024-05-01T09:54:00Z",
                            "endTime": "2024-05-01T09:55:00Z",
                            "status": "Failed"
                        }
                    }
                ]
            }));
        })
        .await;

    let entity_path = format!("/api/data/v9.2/{ENTITY_SET}");
    dataverse
        .mock_async(|when, then| {
            when.method(GET)
                .path(entity_path.as_str())
                .query_param("$filter", "cr123_flowrunid eq 'run-1'")
                .header("authorization", "Bearer store-token");
            then.status(200)
                .json_body(json!({"value": [{"cr123_flowrunid": "run-1"}]}));
        })
        .await;
    dataverse
        .mock_async(|when, then| {
            when.method(GET)
                .path(entity_path.as_str())
                .query_param("$filter", "cr123_flowrunid eq 'run-3'");
            then.status(200).json_body(json!({"value": []}));
        })
        .await;
    let insert = dataverse
        .mock_async(|when, then| {
            when.method(POST)
                .path(entity_path.as_str())
                .header("authorization", "Bearer store-token")
                .body_contains("\"cr123_flowrunid\":\"run-3\"");
            then.status(204);
        })
        .await;

    let http = Client::new();
    let mut tokens = TokenProvider::new(&http, credentials()).with_authority(&identity.base_url());
    let flow = tokens.token_for(FLOW_AUDIENCE).await.unwrap();
    let store = tokens.token_for(&dataverse.base_url()).await.unwrap();
    // A second request for the same audience is served from the provider.
    tokens.token_for(FLOW_AUDIENCE).await.unwrap();

    let source = FlowClient::new(&http, &flow_api.base_url(), flow.as_str());
    let store = DataverseFailureStore::new(
        ServiceClient::new(&http, &dataverse.base_url(), store.as_str()),
        TableSchema::new(ENTITY_SET, "cr123_"),
    );
    let settings = MonitorSettings {
        window: Duration::minutes(10),
        dedup_policy: DedupPolicy::FailOpen,
    };

    let now = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
    let summary = FailureMonitor::new(&source, &store, settings)
        .run(&["env-1".to_string()], now)
        .await;

    flow_token.assert_hits_async(1).await;
    store_token.assert_hits_async(1).await;
    insert.assert_hits_async(1).await;
    assert_eq!(summary.total_failures_processed(), 2);
    assert_eq!(summary.new_failures_added(), 1);
    assert_eq!(summary.failed_environments(), 0);
    assert!(
        summary
            .render()
            .ends_with("TotalFailuresProcessed=2, NewFailuresAdded=1")
    );
}
