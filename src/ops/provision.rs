use super::{Context, Report};
use crate::resolver::Resolver;
use crate::steps::{azure, github, Outcome};
use crate::{keys, ClientRecord, DashopsError, Result, SecretStore};
use std::sync::Arc;
use tracing::info;

const KEYS: &[&str] = &[
    keys::CLIENT,
    keys::RESOURCE_GROUP,
    keys::LOCATION,
    keys::STORAGE_ACCOUNT,
    keys::STORAGE_CONTAINER,
    keys::VAULT_NAME,
    keys::STATIC_WEB_APP,
    keys::SWA_LOCATION,
    keys::ENVIRONMENT_NAME,
    keys::GITHUB_REPO,
    keys::AZURE_TENANT_ID,
    keys::OWNER_EMAIL,
    keys::OWNER_NAME,
];

/// Creates or reconciles every Azure resource a client dashboard needs.
///
/// Order: resource group, storage account, blob container, Key Vault,
/// remote record, Static Web App, storage CORS rule, GitHub deployment
/// token, local file. Running it again against existing resources changes
/// nothing but the persisted record.
///
/// # Errors
///
/// - [`DashopsError::MissingConfig`] before any write if
///   `AZURE_SUBSCRIPTION_ID` does not resolve
/// - [`DashopsError::StepFailed`] for `key-vault`, before any write, if the
///   resolved `VAULT_NAME` is not the vault the remote record lives in
/// - [`DashopsError::StepFailed`] naming the first step that failed
pub async fn provision(ctx: &mut Context) -> Result<Report> {
    ctx.remote.init().await?;

    let resolver = Resolver::new(KEYS.iter().copied()).hard_required([keys::AZURE_SUBSCRIPTION_ID]);
    let resolution = ctx.resolve(&resolver).await?;
    let mut report = Report::new(resolution.clone());
    let runner = Arc::clone(&ctx.runner);
    let runner = runner.as_ref();

    let client = resolution.require(keys::CLIENT)?;
    let subscription = resolution.require(keys::AZURE_SUBSCRIPTION_ID)?;
    let resource_group = resolution.require(keys::RESOURCE_GROUP)?;
    let location = resolution.require(keys::LOCATION)?;
    let account = resolution.require(keys::STORAGE_ACCOUNT)?;
    let container = resolution.require(keys::STORAGE_CONTAINER)?;
    let vault = resolution.require(keys::VAULT_NAME)?;
    let swa = resolution.require(keys::STATIC_WEB_APP)?;
    let swa_location = resolution.require(keys::SWA_LOCATION)?;
    ctx.check_record_vault(vault)?;

    info!(client, subscription, resource_group, "provisioning client resources");
    azure::use_subscription(runner, subscription).await?;

    let outcome = azure::ensure_resource_group(runner, resource_group, location, client).await?;
    report.record("resource-group", resource_group, outcome);

    let outcome = azure::ensure_storage_account(runner, account, resource_group, location).await?;
    report.record("storage-account", account, outcome);

    let account_key = azure::storage_account_key(runner, account, resource_group).await?;
    let outcome = azure::ensure_container(runner, account, container, &account_key).await?;
    report.record("storage-container", container, outcome);

    let outcome = azure::ensure_key_vault(runner, vault, resource_group, location).await?;
    report.record("key-vault", vault, outcome);

    // The vault exists now, so the resolved record has somewhere to live
    let mut written = resolution.record().clone();
    if written.get(keys::AZURE_TENANT_ID).is_none() {
        let signed_in = azure::current_account(runner).await?;
        written.insert(keys::AZURE_TENANT_ID, signed_in.tenant_id);
    }
    ctx.persist_remote(&written)
        .await
        .map_err(|e| DashopsError::step("remote-config", ctx.remote.scope(), e))?;
    report.record("remote-config", ctx.remote.scope(), Outcome::Updated);

    let outcome = azure::ensure_static_web_app(runner, swa, resource_group, swa_location).await?;
    report.record("static-web-app", swa, outcome);

    let hostname = azure::static_web_app_hostname(runner, swa, resource_group)
        .await
        .map_err(|e| DashopsError::step("static-web-app", swa, e))?
        .ok_or_else(|| {
            DashopsError::step(
                "static-web-app",
                swa,
                DashopsError::NotFound(format!("{} has no hostname after creation", swa)),
            )
        })?;
    let dashboard_url = format!("https://{}", hostname);
    let token = azure::static_web_app_token(runner, swa, resource_group).await?;

    let outcome = azure::allow_cors_origin(runner, account, &account_key, &dashboard_url).await?;
    report.record("storage-cors", &dashboard_url, outcome);

    let learned = ClientRecord::new()
        .with(keys::DASHBOARD_URL, &dashboard_url)
        .with(keys::SWA_DEPLOYMENT_TOKEN, &token);
    ctx.persist_remote(&learned)
        .await
        .map_err(|e| DashopsError::step("remote-config", ctx.remote.scope(), e))?;
    written.merge(&learned);

    if let Some(mut store) = ctx.github_store(&resolution) {
        let environment = store.environment().unwrap_or(client).to_string();
        github::ensure_environment(runner, store.repo(), &environment).await?;
        report.record("github-environment", format!("{}:{}", store.repo(), environment), Outcome::Updated);

        store.init().await?;
        store.set_secret(keys::SWA_DEPLOYMENT_TOKEN, &token).await?;
        report.record("github-secret", keys::SWA_DEPLOYMENT_TOKEN, Outcome::Updated);
    } else {
        info!(client, "GITHUB_REPO not set, skipping deployment token upload");
    }

    ctx.persist_local(&written).await?;
    report.record("local-config", format!("{}.env", client), Outcome::Updated);

    info!(client, dashboard = %dashboard_url, "client provisioned");
    report.written = written;
    Ok(report)
}
