use super::{Context, Report};
use crate::resolver::Resolver;
use crate::sas::ensure_not_expired;
use crate::steps::{github, Outcome};
use crate::stores::github::validate_github_secret_name;
use crate::{keys, ClientRecord, DashopsError, Result, SecretStore};
use std::sync::Arc;
use tracing::{info, warn};

/// Pushes the resolved configuration to the client's GitHub environment.
///
/// Every resolved key becomes an environment secret. Keys GitHub will not
/// accept as secret names (such as `GITHUB_REPO`) are skipped. The local
/// file is rewritten with the resolved values afterwards.
///
/// # Errors
///
/// - [`DashopsError::MissingConfig`] if `GITHUB_REPO` does not resolve
/// - [`DashopsError::SasExpired`] if the record carries an expired SAS, so a
///   dead token is never published
pub async fn sync(ctx: &mut Context) -> Result<Report> {
    ctx.init_remote_lenient().await;

    let resolver = Resolver::new(keys::ALL.iter().copied()).hard_required([keys::GITHUB_REPO]);
    let resolution = ctx.resolve(&resolver).await?;
    ensure_not_expired(resolution.client(), resolution.record(), ctx.now())?;

    let mut report = Report::new(resolution.clone());
    let client = resolution.client().to_string();

    let mut store = ctx.github_store(&resolution).ok_or_else(|| DashopsError::MissingConfig {
        client: client.clone(),
        keys: vec![keys::GITHUB_REPO.to_string()],
    })?;
    let repo = store.repo().to_string();
    let environment = store.environment().unwrap_or(client.as_str()).to_string();

    github::validate_repo(&repo)?;
    store.init().await?;

    let runner = Arc::clone(&ctx.runner);
    github::ensure_environment(runner.as_ref(), &repo, &environment).await?;
    report.record("github-environment", format!("{}:{}", repo, environment), Outcome::Updated);

    let mut pushed = ClientRecord::new();
    for (name, value) in resolution.record().iter() {
        if let Err(e) = validate_github_secret_name(name) {
            warn!(key = name, error = %e, "not a valid GitHub secret name, skipping");
            continue;
        }
        store.set_secret(name, value).await?;
        report.record("github-secret", name, Outcome::Updated);
        pushed.insert(name, value);
    }
    info!(client = %client, repo = %repo, environment = %environment, secrets = pushed.len(), "secrets synced");

    ctx.persist_local(resolution.record()).await?;
    report.record("local-config", format!("{}.env", client), Outcome::Updated);

    report.written = pushed;
    Ok(report)
}
