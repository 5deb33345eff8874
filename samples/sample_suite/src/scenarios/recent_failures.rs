use chrono::{Duration, Utc};
use reqwest::Client;

use powerplatform_admin_tools::auth::TokenProvider;
use powerplatform_admin_tools::flows::client::{DEFAULT_FLOW_API_URL, FLOW_AUDIENCE, FlowClient};
use powerplatform_admin_tools::monitor::{select_failures, sort_flows};

use crate::config::Secrets;

/// Read-only: prints failed runs without touching the failure table.
pub async fn run(client: &Client, tokens: &mut TokenProvider, secrets: &Secrets) -> Result<(), String> {
    println!("Scenario: recent failures");

    let token = tokens
        .token_for(FLOW_AUDIENCE)
        .await
        .map_err(|e| e.to_string())?;
    let flows = FlowClient::new(client, DEFAULT_FLOW_API_URL, token.as_str());
    let environment_id = secrets.sample_environment_id.as_str();
    let since = Utc::now() - Duration::hours(secrets.lookback_hours);

    let mut listed = flows
        .list_flows(environment_id)
        .await
        .into_result()
        .map_err(|e| e.to_string())?;
    sort_flows(&mut listed);
    println!("Flows in {}: {}", environment_id, listed.len());

    for flow in &listed {
        let fetch = flows.list_runs_since(environment_id, &flow.id, since).await;
        if let Some(err) = &fetch.error {
            println!("  {}: run history incomplete ({})", flow.display_name, err);
        }
        for run in select_failures(fetch.items, since) {
            println!(
                "  {} run {} failed at {}{}",
                flow.display_name,
                run.run_id,
                run.start_time.to_rfc3339(),
                if run.is_aborted { " (aborted)" } else { "" }
            );
        }
    }

    Ok(())
}
