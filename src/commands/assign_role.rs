use colored::Colorize;

use powerplatform_admin_tools::config::Config;
use powerplatform_admin_tools::error::ConfigError;
use powerplatform_admin_tools::pac::{RoleAssignment, SystemRunner, assign_role_everywhere};

use super::{CommandError, Session, list_environments};

pub async fn run(
    config: Config,
    role: String,
    application_id: Option<String>,
    pac: &str,
) -> Result<(), CommandError> {
    config.validate_credentials()?;
    if role.trim().is_empty() {
        return Err(ConfigError::Invalid("role must not be empty".to_string()).into());
    }

    let assignment = RoleAssignment {
        application_id: application_id.unwrap_or_else(|| config.client_id.trim().to_string()),
        role,
    };

    let mut session = Session::new(&config)?;
    let environments = list_environments(&config, &mut session).await?;

    let summary = assign_role_everywhere(&SystemRunner, pac, &environments, &assignment);

    println!(
        "{} '{}' assigned in {} environment(s)",
        "✓".green().bold(),
        assignment.role,
        summary.succeeded.len()
    );
    for environment_id in &summary.skipped {
        println!("{} skipped {} (no Dataverse)", "-".dimmed(), environment_id);
    }
    for (environment_id, reason) in &summary.failed {
        println!("{} {}: {}", "✗".red().bold(), environment_id, reason.red());
    }
    Ok(())
}
