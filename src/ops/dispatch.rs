use super::{Context, Report};
use crate::resolver::Resolver;
use crate::steps::github::{self, DeployAction};
use crate::steps::Outcome;
use crate::{keys, Result};
use std::sync::Arc;
use tracing::info;

/// Triggers the deployment workflow for the client.
///
/// The workflow receives `client` and `action` as inputs and runs on
/// `Config::git_ref`.
pub async fn dispatch(ctx: &mut Context, action: DeployAction) -> Result<Report> {
    ctx.init_remote_lenient().await;

    let resolver = Resolver::new([keys::CLIENT]).hard_required([keys::GITHUB_REPO]);
    let resolution = ctx.resolve(&resolver).await?;
    let mut report = Report::new(resolution.clone());

    let client = resolution.require(keys::CLIENT)?;
    let repo = resolution.require(keys::GITHUB_REPO)?;
    let workflow = ctx.config.workflow.clone();
    let runner = Arc::clone(&ctx.runner);

    github::dispatch_workflow(runner.as_ref(), repo, &workflow, &ctx.config.git_ref, client, action).await?;
    report.record("workflow-dispatch", format!("{} ({})", workflow, action), Outcome::Created);

    info!(client, repo, workflow = %workflow, action = %action, "workflow dispatched");
    Ok(report)
}
