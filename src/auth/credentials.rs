use chrono::{Duration, Utc};
use reqwest::Client;
use serde::Deserialize;

use crate::auth::token::AccessToken;
use crate::error::AuthError;

pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";

/// Token lifetime assumed when the endpoint omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// App registration secrets used for the client-credentials grant.
#[derive(Clone, Deserialize)]
pub struct ClientCredentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    error: Option<String>,
    error_description: Option<String>,
}

/// `.default` scope for a resource URL, e.g.
/// `https://org.crm.dynamics.com/` becomes `https://org.crm.dynamics.com/.default`.
pub fn scope_for_audience(audience: &str) -> String {
    format!("{}/.default", audience.trim().trim_end_matches('/'))
}

pub fn token_url(authority: &str, tenant_id: &str) -> String {
    format!(
        "{}/{}/oauth2/v2.0/token",
        authority.trim_end_matches('/'),
        tenant_id
    )
}

pub async fn fetch_client_credentials_token(
    client: &Client,
    authority: &str,
    credentials: &ClientCredentials,
    audience: &str,
) -> Result<AccessToken, AuthError> {
    let url = token_url(authority, &credentials.tenant_id);
    let scope = scope_for_audience(audience);

    let params = [
        ("grant_type", "client_credentials"),
        ("client_id", credentials.client_id.as_str()),
        ("client_secret", credentials.client_secret.as_str()),
        ("scope", scope.as_str()),
    ];

    log::debug!("Requesting token for {} from {}", scope, url);
    let resp = client.post(&url).form(&params).send().await?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(AuthError::Rejected {
            status,
            body: describe_token_error(&body),
        });
    }

    let issued_at = Utc::now();
    let parsed: TokenResponse = resp
        .json()
        .await
        .map_err(|e| AuthError::InvalidResponse(format!("Failed to parse JSON: {e}")))?;

    let access_token = parsed
        .access_token
        .ok_or_else(|| AuthError::InvalidResponse("No access_token in response".to_string()))?;
    if access_token.trim().is_empty() {
        return Err(AuthError::InvalidResponse(
            "Access token was empty".to_string(),
        ));
    }

    let expires_in = parsed.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);

    Ok(AccessToken {
        audience: audience.to_string(),
        secret: access_token,
        issued_at,
        expires_at: issued_at + Duration::seconds(expires_in),
    })
}

fn describe_token_error(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<TokenErrorResponse>(body) {
        match (parsed.error, parsed.error_description) {
            (Some(error), Some(description)) => return format!("{error}: {description}"),
            (None, Some(description)) => return description,
            (Some(error), None) => return error,
            (None, None) => {}
        }
    }
    body.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    use httpmock::prelude::*;
    use serde_json::json;

    fn credentials() -> ClientCredentials {
        ClientCredentials {
            tenant_id: "contoso-tenant".to_string(),
            client_id: "app-id".to_string(),
            client_secret: "s3cret".to_string(),
        }
    }

    #[test]
    fn scope_trims_trailing_slash() {
        assert_eq!(
            scope_for_audience("https://org.crm.dynamics.com/"),
            "https://org.crm.dynamics.com/.default"
        );
        assert_eq!(
            scope_for_audience("https://service.flow.microsoft.com"),
            "https://service.flow.microsoft.com/.default"
        );
    }

    #[tokio::test]
    async fn exchanges_client_credentials_for_token() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/contoso-tenant/oauth2/v2.0/token")
                    .x_www_form_urlencoded_tuple("grant_type", "client_credentials")
                    .x_www_form_urlencoded_tuple("client_id", "app-id")
                    .x_www_form_urlencoded_tuple("client_secret", "s3cret")
                    .x_www_form_urlencoded_tuple(
                        "scope",
                        "https://service.flow.microsoft.com/.default",
                    );
                then.status(200).json_body(json!({
                    "token_type": "Bearer",
                    "expires_in": 3599,
                    "access_token": "eyJ0eXAi"
                }));
            })
            .await;

        let token = fetch_client_credentials_token(
            &Client::new(),
            &server.base_url(),
            &credentials(),
            "https://service.flow.microsoft.com/",
        )
        .await
        .expect("token");

        mock.assert_async().await;
        assert_eq!(token.as_str(), "eyJ0eXAi");
        assert_eq!(token.audience, "https://service.flow.microsoft.com/");
        assert_eq!((token.expires_at - token.issued_at).num_seconds(), 3599);
    }

    #[tokio::test]
    async fn rejected_exchange_carries_upstream_description() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(401).json_body(json!({
                    "error": "invalid_client",
                    "error_description": "AADSTS7000215: Invalid client secret provided."
                }));
            })
            .await;

        let result = fetch_client_credentials_token(
            &Client::new(),
            &server.base_url(),
            &credentials(),
            "https://org.crm.dynamics.com",
        )
        .await;

        match result {
            Err(AuthError::Rejected { status, body }) => {
                assert_eq!(status.as_u16(), 401);
                assert_eq!(
                    body,
                    "invalid_client: AADSTS7000215: Invalid client secret provided."
                );
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_access_token_is_an_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200)
                    .json_body(json!({"access_token": "  ", "expires_in": 3600}));
            })
            .await;

        let result = fetch_client_credentials_token(
            &Client::new(),
            &server.base_url(),
            &credentials(),
            "https://org.crm.dynamics.com",
        )
        .await;

        assert!(matches!(result, Err(AuthError::InvalidResponse(_))));
    }

    #[test]
    fn debug_redacts_secret() {
        let rendered = format!("{:?}", credentials());
        assert!(!rendered.contains("s3cret"));
    }
}
