use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use colored::Colorize;

use powerplatform_admin_tools::config::Config;
use powerplatform_admin_tools::error::ReportError;
use powerplatform_admin_tools::reports::classic_look::{collect_report, write_csv};

use super::{CommandError, Session, list_environments};

pub async fn run(config: Config, output: &Path) -> Result<(), CommandError> {
    config.validate_credentials()?;
    let mut session = Session::new(&config)?;

    let environments = list_environments(&config, &mut session).await?;
    log::info!("Reporting on {} environment(s)", environments.len());

    let report = collect_report(&session.client, &mut session.tokens, &environments).await;

    let file = File::create(output).map_err(ReportError::from)?;
    write_csv(BufWriter::new(file), &report.rows)?;

    println!(
        "{} {} app(s) written to {}",
        "✓".green().bold(),
        report.rows.len(),
        output.display()
    );
    for (environment_id, reason) in &report.skipped {
        println!("{} skipped {}: {}", "!".yellow().bold(), environment_id, reason);
    }
    Ok(())
}
