use chrono::Utc;
use colored::Colorize;

use powerplatform_admin_tools::config::Config;
use powerplatform_admin_tools::dataverse::{DataverseFailureStore, ServiceClient};
use powerplatform_admin_tools::flows::FlowClient;
use powerplatform_admin_tools::monitor::{
    DedupPolicy, EnvironmentStatus, FailureMonitor, RunSummary,
};

use super::{CommandError, Session};

pub async fn run(
    mut config: Config,
    window_minutes: Option<i64>,
    fail_closed: bool,
) -> Result<(), CommandError> {
    if let Some(minutes) = window_minutes {
        config.monitor.window_minutes = minutes;
    }
    if fail_closed {
        config.monitor.dedup_policy = DedupPolicy::FailClosed;
    }
    let store_config = config.validate_for_monitor()?.clone();
    let environments = config.environment_ids();

    let mut session = Session::new(&config)?;
    let flow_token = session
        .tokens
        .token_for(&config.endpoints.flow_audience)
        .await?;
    let store_token = session.tokens.token_for(&store_config.url).await?;

    let source = FlowClient::new(&session.client, &config.endpoints.flow_api, flow_token.as_str());
    let store = DataverseFailureStore::new(
        ServiceClient::new(&session.client, &store_config.url, store_token.as_str()),
        store_config.schema(),
    )
    .with_alternate_key(store_config.alternate_key);

    let monitor = FailureMonitor::new(&source, &store, config.monitor.settings());
    let summary = monitor.run(&environments, Utc::now()).await;
    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("{}", "Flow failure monitor".bold());
    println!(
        "Window start: {}",
        summary.window_start.to_rfc3339()
    );

    for env in &summary.environments {
        match &env.status {
            EnvironmentStatus::Failed(reason) => {
                println!("{} {}: {}", "✗".red().bold(), env.environment_id, reason.red());
            }
            EnvironmentStatus::Completed => {
                let marker = if env.has_errors() {
                    "!".yellow().bold()
                } else {
                    "✓".green().bold()
                };
                println!(
                    "{} {}: {} flow(s), {} failure(s), {} new, {} already recorded",
                    marker,
                    env.environment_id,
                    env.flows_scanned,
                    env.failures_found,
                    env.inserted,
                    env.already_recorded
                );
                if env.flow_listing_incomplete {
                    println!("    flow listing incomplete; later flows were not scanned");
                }
                if env.error_count() > 0 {
                    println!(
                        "    {} flow fetch error(s), {} dedup error(s), {} insert error(s)",
                        env.flow_errors, env.dedup_errors, env.insert_errors
                    );
                }
            }
        }
    }

    println!(
        "TotalFailuresProcessed={}, NewFailuresAdded={}",
        summary.total_failures_processed().to_string().bold(),
        summary.new_failures_added().to_string().bold()
    );
    if summary.failed_environments() > 0 {
        println!(
            "{}",
            format!(
                "{} environment(s) could not be scanned",
                summary.failed_environments()
            )
            .red()
        );
    }
}
