use super::{Context, Report};
use crate::config::validate_sas_days;
use crate::resolver::Resolver;
use crate::steps::{azure, Outcome};
use crate::{keys, sas, ClientRecord, DashopsError, Result, SecretStore};
use std::sync::Arc;
use tracing::info;

const KEYS: &[&str] = &[
    keys::CLIENT,
    keys::RESOURCE_GROUP,
    keys::STORAGE_ACCOUNT,
    keys::STORAGE_CONTAINER,
    keys::ENVIRONMENT_NAME,
    keys::GITHUB_REPO,
];

/// Mints a new read/list SAS for the client's data container.
///
/// The token expires `Config::sas_days` after the context clock. `SAS_TOKEN`,
/// `SAS_EXPIRY` and `SAS_URL` are written to the remote record and the local
/// file; with `sync_github` the URL also replaces the environment's
/// `SAS_URL` secret.
///
/// # Errors
///
/// - an invalid lifetime, before anything runs
/// - [`DashopsError::MissingConfig`] if `sync_github` is set and
///   `GITHUB_REPO` does not resolve
/// - [`DashopsError::StepFailed`] if the key lookup, token generation or
///   remote write fails; a token that cannot be stored is not reported
pub async fn refresh_sas(ctx: &mut Context, sync_github: bool) -> Result<Report> {
    let days = ctx.config.sas_days;
    validate_sas_days(days)?;
    ctx.remote.init().await?;

    let mut resolver = Resolver::new(KEYS.iter().copied());
    if sync_github {
        resolver = resolver.hard_required([keys::GITHUB_REPO]);
    }
    let resolution = ctx.resolve(&resolver).await?;
    let mut report = Report::new(resolution.clone());
    let runner = Arc::clone(&ctx.runner);
    let runner = runner.as_ref();

    let client = resolution.require(keys::CLIENT)?;
    let resource_group = resolution.require(keys::RESOURCE_GROUP)?;
    let account = resolution.require(keys::STORAGE_ACCOUNT)?;
    let container = resolution.require(keys::STORAGE_CONTAINER)?;

    let expiry = sas::expiry_after(ctx.now(), days);
    info!(client, account, container, expiry = %expiry, "generating SAS token");

    let account_key = azure::storage_account_key(runner, account, resource_group).await?;
    let token = azure::generate_container_sas(runner, account, container, &account_key, &expiry).await?;
    let url = sas::sas_url(account, container, &token);
    report.record("sas-token", container, Outcome::Created);

    let written = ClientRecord::new()
        .with(keys::SAS_TOKEN, &token)
        .with(keys::SAS_EXPIRY, &expiry)
        .with(keys::SAS_URL, &url);

    ctx.persist_remote(&written)
        .await
        .map_err(|e| DashopsError::step("remote-config", ctx.remote.scope(), e))?;
    report.record("remote-config", ctx.remote.scope(), Outcome::Updated);

    ctx.persist_local(&written).await?;
    report.record("local-config", format!("{}.env", client), Outcome::Updated);

    if sync_github {
        let mut store = ctx.github_store(&resolution).ok_or_else(|| DashopsError::MissingConfig {
            client: client.to_string(),
            keys: vec![keys::GITHUB_REPO.to_string()],
        })?;
        store.init().await?;
        store.set_secret(keys::SAS_URL, &url).await?;
        report.record("github-secret", keys::SAS_URL, Outcome::Updated);
    }

    info!(client, expiry = %expiry, "SAS token refreshed");
    report.written = written;
    Ok(report)
}
