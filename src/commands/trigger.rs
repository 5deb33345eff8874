use std::fs;
use std::path::PathBuf;

use colored::Colorize;
use serde_json::Value;

use powerplatform_admin_tools::config::Config;
use powerplatform_admin_tools::flows::trigger::trigger_flow;

use super::{CommandError, Session};

fn read_payload(
    payload: Option<String>,
    payload_file: Option<PathBuf>,
) -> Result<Value, CommandError> {
    let text = match (payload, payload_file) {
        (Some(text), _) => text,
        (None, Some(path)) => fs::read_to_string(&path)
            .map_err(|e| CommandError::Payload(format!("{}: {e}", path.display())))?,
        (None, None) => return Ok(Value::Object(Default::default())),
    };
    serde_json::from_str(&text).map_err(|e| CommandError::Payload(e.to_string()))
}

pub async fn run(
    config: Config,
    url: &str,
    payload: Option<String>,
    payload_file: Option<PathBuf>,
    audience: Option<String>,
) -> Result<(), CommandError> {
    config.validate_credentials()?;
    let payload = read_payload(payload, payload_file)?;

    let mut session = Session::new(&config)?;
    let audience = audience.unwrap_or_else(|| config.endpoints.flow_audience.clone());
    let token = session.tokens.token_for(&audience).await?;

    let response = trigger_flow(&session.client, url, token.as_str(), &payload).await?;

    println!(
        "{} flow triggered ({})",
        "✓".green().bold(),
        response.status
    );
    if let Some(run_id) = &response.run_id {
        println!("Run id: {}", run_id);
    }
    if !response.body.trim().is_empty() {
        println!("{}", response.body);
    }
    Ok(())
}
