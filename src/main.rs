mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;
use log::LevelFilter;

use powerplatform_admin_tools::pac::DEFAULT_PAC_PROGRAM;

use commands::load_config;

/// Power Platform admin automation.
#[derive(Parser)]
#[command(name = "ppadmin", version, about = "Power Platform admin automation")]
struct Cli {
    /// Path to the JSON config file (defaults to <config dir>/ppadmin/config.json)
    #[arg(long, global = true, env = "PPADMIN_CONFIG")]
    config: Option<PathBuf>,

    /// Log at debug level regardless of the configured level
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record failed flow runs from the polling window into the Dataverse table
    MonitorFailures {
        /// Override monitor.window_minutes
        #[arg(long)]
        window_minutes: Option<i64>,

        /// Skip the insert when the existence check fails
        #[arg(long)]
        fail_closed: bool,
    },
    /// Write the Classic Look opt-out of every model-driven app to CSV
    ClassicLookReport {
        /// CSV file to write
        #[arg(long, short, default_value = "classic-look-report.csv")]
        output: PathBuf,
    },
    /// Grant an application user a security role in every environment
    AssignRole {
        /// Security role name
        #[arg(long)]
        role: String,

        /// Application id to assign (defaults to the configured client id)
        #[arg(long)]
        application_id: Option<String>,

        /// Power Platform CLI executable
        #[arg(long, default_value = DEFAULT_PAC_PROGRAM)]
        pac: String,
    },
    /// Invoke an OAuth protected HTTP-triggered flow
    TriggerFlow {
        /// Trigger URL of the flow
        #[arg(long)]
        url: String,

        /// JSON payload
        #[arg(long, conflicts_with = "payload_file")]
        payload: Option<String>,

        /// File holding the JSON payload
        #[arg(long)]
        payload_file: Option<PathBuf>,

        /// Token audience (defaults to endpoints.flow_audience)
        #[arg(long)]
        audience: Option<String>,
    },
}

fn init_logging(level: LevelFilter) {
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{} {}", "✗".red().bold(), err);
            return ExitCode::FAILURE;
        }
    };

    init_logging(if cli.verbose {
        LevelFilter::Debug
    } else {
        config.log_level.level_filter()
    });

    let result = match cli.command {
        Commands::MonitorFailures {
            window_minutes,
            fail_closed,
        } => commands::monitor::run(config, window_minutes, fail_closed).await,
        Commands::ClassicLookReport { output } => {
            commands::classic_look::run(config, &output).await
        }
        Commands::AssignRole {
            role,
            application_id,
            pac,
        } => commands::assign_role::run(config, role, application_id, &pac).await,
        Commands::TriggerFlow {
            url,
            payload,
            payload_file,
            audience,
        } => {
            commands::trigger::run(config, &url, payload, payload_file, audience).await
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err}");
            eprintln!("{} {}", "✗".red().bold(), err);
            ExitCode::FAILURE
        }
    }
}
