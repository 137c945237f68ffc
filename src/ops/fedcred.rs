use super::{Context, Report};
use crate::resolver::Resolver;
use crate::steps::identity::{self, FederatedCredential};
use crate::steps::{github, Outcome};
use crate::stores::github::GitHubStore;
use crate::{keys, ClientRecord, DashopsError, Result, SecretStore};
use std::sync::Arc;
use tracing::info;

const KEYS: &[&str] = &[
    keys::CLIENT,
    keys::RESOURCE_GROUP,
    keys::APP_REGISTRATION,
    keys::ENVIRONMENT_NAME,
];

const HARD_REQUIRED: &[&str] = &[
    keys::AZURE_SUBSCRIPTION_ID,
    keys::AZURE_TENANT_ID,
    keys::GITHUB_REPO,
];

/// Lets the client's GitHub environment deploy to Azure without a stored
/// password.
///
/// Ensures the environment, the app registration and its service principal,
/// a federated credential trusting
/// `repo:{GITHUB_REPO}:environment:{ENVIRONMENT_NAME}`, and the configured
/// role assignments on the resource group. The identity ids then go to the
/// environment's secrets, the remote record and the local file.
pub async fn fedcred(ctx: &mut Context) -> Result<Report> {
    ctx.remote.init().await?;

    let resolver = Resolver::new(KEYS.iter().copied()).hard_required(HARD_REQUIRED.iter().copied());
    let resolution = ctx.resolve(&resolver).await?;
    let mut report = Report::new(resolution.clone());
    let runner = Arc::clone(&ctx.runner);
    let runner = runner.as_ref();

    let client = resolution.require(keys::CLIENT)?;
    let subscription = resolution.require(keys::AZURE_SUBSCRIPTION_ID)?;
    let tenant = resolution.require(keys::AZURE_TENANT_ID)?;
    let repo = resolution.require(keys::GITHUB_REPO)?;
    let environment = resolution.require(keys::ENVIRONMENT_NAME)?;
    let resource_group = resolution.require(keys::RESOURCE_GROUP)?;
    let app_name = resolution.require(keys::APP_REGISTRATION)?;

    github::validate_repo(repo)?;
    info!(client, repo, environment, "configuring federated deployment identity");

    github::ensure_environment(runner, repo, environment).await?;
    report.record("github-environment", format!("{}:{}", repo, environment), Outcome::Updated);

    let (app_id, outcome) = identity::ensure_app_registration(runner, app_name).await?;
    report.record("app-registration", app_name, outcome);

    let outcome = identity::ensure_service_principal(runner, &app_id).await?;
    report.record("service-principal", &app_id, outcome);

    let credential = FederatedCredential::for_environment(repo, environment);
    let outcome = identity::ensure_federated_credential(runner, &app_id, &credential).await?;
    report.record("federated-credential", &credential.subject, outcome);

    let scope = identity::resource_group_scope(subscription, resource_group);
    for role in &ctx.config.roles {
        let outcome = identity::assign_role(runner, &app_id, role, &scope).await?;
        report.record("role-assignment", format!("{} on {}", role, resource_group), outcome);
    }

    let ids = ClientRecord::new()
        .with(keys::AZURE_CLIENT_ID, &app_id)
        .with(keys::AZURE_TENANT_ID, tenant)
        .with(keys::AZURE_SUBSCRIPTION_ID, subscription);

    let mut store = GitHubStore::new(Arc::clone(&ctx.runner), repo, Some(environment.to_string()));
    store.init().await?;
    for (name, value) in ids.iter() {
        store.set_secret(name, value).await?;
        report.record("github-secret", name, Outcome::Updated);
    }

    let written = ids.with(keys::GITHUB_REPO, repo).with(keys::ENVIRONMENT_NAME, environment);
    ctx.persist_remote(&written)
        .await
        .map_err(|e| DashopsError::step("remote-config", ctx.remote.scope(), e))?;
    report.record("remote-config", ctx.remote.scope(), Outcome::Updated);

    ctx.persist_local(&written).await?;
    report.record("local-config", format!("{}.env", client), Outcome::Updated);

    info!(client, app_id = %app_id, "federated credential configured");
    report.written = written;
    Ok(report)
}
