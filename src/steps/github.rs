//! GitHub repository steps: deployment environments and workflow dispatch.

use crate::cli::CommandRunner;
use crate::{DashopsError, Result};
use std::fmt;
use std::str::FromStr;

/// What a dispatched pipeline run should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DeployAction {
    /// Provision the client's Azure resources
    #[value(name = "provision-app")]
    ProvisionApp,
    /// Build and publish the dashboard
    #[value(name = "deploy-app")]
    DeployApp,
}

impl fmt::Display for DeployAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProvisionApp => write!(f, "provision-app"),
            Self::DeployApp => write!(f, "deploy-app"),
        }
    }
}

impl FromStr for DeployAction {
    type Err = DashopsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "provision-app" => Ok(Self::ProvisionApp),
            "deploy-app" => Ok(Self::DeployApp),
            other => Err(DashopsError::Other(anyhow::anyhow!(
                "unknown action '{}': expected provision-app or deploy-app",
                other
            ))),
        }
    }
}

/// Validates an `owner/name` repository reference.
pub fn validate_repo(repo: &str) -> Result<()> {
    let valid_part = |s: &str| {
        !s.is_empty()
            && s
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    };

    match repo.split_once('/') {
        Some((owner, name)) if valid_part(owner) && valid_part(name) => Ok(()),
        _ => Err(DashopsError::InvalidName(format!(
            "repository '{}' must look like owner/name",
            repo
        ))),
    }
}

/// Creates the deployment environment. The API call is an upsert, so
/// repeating it is harmless.
pub async fn ensure_environment(runner: &dyn CommandRunner, repo: &str, environment: &str) -> Result<()> {
    validate_repo(repo)?;
    let path = format!("repos/{}/environments/{}", repo, environment);

    runner
        .run("gh", &["api", "--method", "PUT", &path, "--silent"])
        .await
        .map_err(|e| DashopsError::step("github-environment", environment, e))?;
    Ok(())
}

/// Starts the deployment workflow for `client`.
pub async fn dispatch_workflow(
    runner: &dyn CommandRunner,
    repo: &str,
    workflow: &str,
    git_ref: &str,
    client: &str,
    action: DeployAction,
) -> Result<()> {
    validate_repo(repo)?;
    let client_field = format!("client={}", client);
    let action_field = format!("action={}", action);

    runner
        .run(
            "gh",
            &[
                "workflow", "run", workflow,
                "--repo", repo,
                "--ref", git_ref,
                "-f", &client_field,
                "-f", &action_field,
            ],
        )
        .await
        .map_err(|e| DashopsError::step("workflow-dispatch", workflow, e))?;
    Ok(())
}
