//! Grant an application user a security role in every environment through
//! the Power Platform CLI.

use std::process::Command;

use crate::error::PacError;
use crate::flows::model::Environment;

pub const DEFAULT_PAC_PROGRAM: &str = "pac";

#[derive(Debug, Clone)]
pub struct RoleAssignment {
    /// Application (client) id of the app registration.
    pub application_id: String,
    /// Security role name, e.g. `System Administrator`.
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs external programs. Swapped out in tests.
pub trait CommandRunner {
    fn run(&self, program: &str, args: &[String]) -> std::io::Result<CommandOutput>;
}

pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String]) -> std::io::Result<CommandOutput> {
        let output = Command::new(program).args(args).output()?;
        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

pub fn assign_user_args(environment_id: &str, assignment: &RoleAssignment) -> Vec<String> {
    vec![
        "admin".to_string(),
        "assign-user".to_string(),
        "--environment".to_string(),
        environment_id.to_string(),
        "--user".to_string(),
        assignment.application_id.clone(),
        "--role".to_string(),
        assignment.role.clone(),
        "--application-user".to_string(),
    ]
}

pub fn assign_role(
    runner: &dyn CommandRunner,
    program: &str,
    environment_id: &str,
    assignment: &RoleAssignment,
) -> Result<(), PacError> {
    let args = assign_user_args(environment_id, assignment);
    log::debug!("{} {}", program, args.join(" "));

    let output = runner
        .run(program, &args)
        .map_err(|source| PacError::Spawn {
            program: program.to_string(),
            source,
        })?;

    if output.success() {
        Ok(())
    } else {
        let detail = if output.stderr.trim().is_empty() {
            output.stdout.trim().to_string()
        } else {
            output.stderr.trim().to_string()
        };
        Err(PacError::Failed {
            code: output.code,
            stderr: detail,
        })
    }
}

#[derive(Debug, Default)]
pub struct AssignmentSummary {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, String)>,
    pub skipped: Vec<String>,
}

/// One `pac admin assign-user` per environment with a Dataverse database,
/// in order. A failure is recorded and the loop moves on.
pub fn assign_role_everywhere(
    runner: &dyn CommandRunner,
    program: &str,
    environments: &[Environment],
    assignment: &RoleAssignment,
) -> AssignmentSummary {
    let mut summary = AssignmentSummary::default();

    for environment in environments {
        if environment.instance_url.is_none() {
            log::info!("Skipping {}: no Dataverse database", environment.display_name);
            summary.skipped.push(environment.id.clone());
            continue;
        }

        log::info!(
            "Assigning '{}' to {} in {}",
            assignment.role,
            assignment.application_id,
            environment.display_name
        );
        match assign_role(runner, program, &environment.id, assignment) {
            Ok(()) => summary.succeeded.push(environment.id.clone()),
            Err(err) => {
                log::error!("{}: {}", environment.display_name, err);
                summary.failed.push((environment.id.clone(), err.to_string()));
            }
        }
    }

    summary
}
