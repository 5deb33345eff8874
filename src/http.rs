use std::time::Duration;

use reqwest::{Client, Response};
use serde::Deserialize;

use crate::error::ApiError;

pub const ODATA_VERSION: &str = "4.0";

/// Build the single HTTP client shared by every call of a run.
pub fn build_client(timeout: Option<Duration>) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder.build()
}

pub(crate) fn build_url(base: &str, path: &str) -> String {
    let trimmed_base = base.trim_end_matches('/');
    if path.is_empty() {
        trimmed_base.to_string()
    } else {
        format!("{}/{}", trimmed_base, path.trim_start_matches('/'))
    }
}

/// Pass a successful response through, otherwise turn it into an
/// `ApiError::UnexpectedStatus` carrying the upstream error message.
pub(crate) async fn ensure_success(resp: Response) -> Result<Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    Err(ApiError::UnexpectedStatus {
        status,
        message: extract_error_message(&body),
    })
}

#[derive(Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: Option<ErrorBody>,
}

fn parse_error(body: &str) -> Option<ErrorBody> {
    serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .and_then(|parsed| parsed.error)
}

/// Pull the human readable part out of an OData / ARM style error body.
/// Keeps the code alongside the message since Dataverse codes are what
/// callers match on.
pub(crate) fn extract_error_message(body: &str) -> String {
    if let Some(error) = parse_error(body) {
        let message = error.message.unwrap_or_default();
        let message = message.trim();
        match error.code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() && !message.is_empty() => {
                return format!("{code}: {message}");
            }
            Some(code) if !code.is_empty() => return code.to_string(),
            _ if !message.is_empty() => return message.to_string(),
            _ => {}
        }
    }

    let fallback = body.trim();
    if fallback.is_empty() {
        "request failed without a response body".to_string()
    } else {
        fallback.to_string()
    }
}
