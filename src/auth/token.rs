use std::collections::HashMap;

use chrono::{DateTime, Utc};
use reqwest::Client;

use crate::auth::credentials::{
    ClientCredentials, DEFAULT_AUTHORITY, fetch_client_credentials_token,
};
use crate::error::AuthError;

/// Bearer token for one audience.
#[derive(Clone)]
pub struct AccessToken {
    pub audience: String,
    pub secret: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn as_str(&self) -> &str {
        &self.secret
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("audience", &self.audience)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

fn audience_key(audience: &str) -> String {
    audience.trim().trim_end_matches('/').to_ascii_lowercase()
}

/// Hands out one token per audience for the lifetime of a run. Tokens are
/// never refreshed; runs are expected to finish well inside the lifetime.
pub struct TokenProvider {
    client: Client,
    authority: String,
    credentials: ClientCredentials,
    tokens: HashMap<String, AccessToken>,
}

impl TokenProvider {
    pub fn new(client: &Client, credentials: ClientCredentials) -> Self {
        Self {
            client: client.clone(),
            authority: DEFAULT_AUTHORITY.to_string(),
            credentials,
            tokens: HashMap::new(),
        }
    }

    pub fn with_authority(mut self, authority: &str) -> Self {
        self.authority = authority.trim_end_matches('/').to_string();
        self
    }

    pub async fn token_for(&mut self, audience: &str) -> Result<AccessToken, AuthError> {
        let key = audience_key(audience);
        if let Some(cached) = self.tokens.get(&key) {
            if cached.is_expired_at(Utc::now()) {
                log::warn!(
                    "Token for {} expired at {}; requests may be rejected",
                    cached.audience,
                    cached.expires_at.to_rfc3339()
                );
            }
            return Ok(cached.clone());
        }

        let token = fetch_client_credentials_token(
            &self.client,
            &self.authority,
            &self.credentials,
            audience,
        )
        .await?;
        log::info!(
            "Acquired token for {} (expires {})",
            token.audience,
            token.expires_at.to_rfc3339()
        );

        self.tokens.insert(key, token.clone());
        Ok(token)
    }

    #[cfg(test)]
    fn audiences(&self) -> usize {
        self.tokens.len()
    }
}
