use reqwest::{Client, StatusCode};
use serde_json::Value;

use crate::error::ApiError;
use crate::http::ensure_success;

const RUN_ID_HEADER: &str = "x-ms-workflow-run-id";

#[derive(Debug)]
pub struct TriggerResponse {
    pub status: StatusCode,
    pub run_id: Option<String>,
    pub body: String,
}

/// POST `payload` to an OAuth protected "When an HTTP request is received"
/// trigger.
pub async fn trigger_flow(
    client: &Client,
    trigger_url: &str,
    token: &str,
    payload: &Value,
) -> Result<TriggerResponse, ApiError> {
    log::debug!("POST {}", trigger_url);
    let resp = client
        .post(trigger_url)
        .bearer_auth(token)
        .json(payload)
        .send()
        .await?;

    let resp = ensure_success(resp).await?;
    let status = resp.status();
    let run_id = resp
        .headers()
        .get(RUN_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let body = resp.text().await?;

    Ok(TriggerResponse {
        status,
        run_id,
        body,
    })
}
