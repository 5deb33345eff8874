pub mod assign_role;
pub mod classic_look;
pub mod monitor;
pub mod trigger;

use std::path::Path;

use reqwest::Client;
use thiserror::Error;

use powerplatform_admin_tools::auth::TokenProvider;
use powerplatform_admin_tools::config::{self, Config};
use powerplatform_admin_tools::error::{ApiError, AuthError, ConfigError, ReportError};
use powerplatform_admin_tools::flows::{AdminClient, Environment};
use powerplatform_admin_tools::http::build_client;

/// Errors that end a command. Anything recoverable is handled inside the
/// command and only shows up in its summary.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Report(#[from] ReportError),
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
    #[error("invalid payload: {0}")]
    Payload(String),
}

pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(path) => Config::load(path)?,
        None => Config::load(&config::default_path()?)?,
    };
    config.apply_overrides(|name| std::env::var(name).ok());
    Ok(config)
}

pub struct Session {
    pub client: Client,
    pub tokens: TokenProvider,
}

impl Session {
    pub fn new(config: &Config) -> Result<Self, CommandError> {
        let client = build_client(config.request_timeout())?;
        let tokens = TokenProvider::new(&client, config.credentials())
            .with_authority(&config.endpoints.authority);
        Ok(Self { client, tokens })
    }
}

/// Environments from the admin API, narrowed to the configured ids when any
/// are configured.
pub async fn list_environments(
    config: &Config,
    session: &mut Session,
) -> Result<Vec<Environment>, CommandError> {
    let token = session
        .tokens
        .token_for(&config.endpoints.admin_audience)
        .await?;
    let admin = AdminClient::new(&session.client, &config.endpoints.admin_api, token.as_str());

    let fetch = admin.list_environments().await;
    if let Some(err) = &fetch.error {
        log::warn!(
            "Environment listing incomplete after {} page(s): {}",
            fetch.pages,
            err
        );
    }
    let environments = fetch.into_result()?;

    let wanted = config.environment_ids();
    if wanted.is_empty() {
        return Ok(environments);
    }

    for id in &wanted {
        if !environments.iter().any(|env| env.id.eq_ignore_ascii_case(id)) {
            log::warn!("Configured environment {} was not returned by the admin API", id);
        }
    }
    Ok(environments
        .into_iter()
        .filter(|env| wanted.iter().any(|id| env.id.eq_ignore_ascii_case(id)))
        .collect())
}
