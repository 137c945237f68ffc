//! Azure resource steps: subscription, resource group, storage, Key Vault and
//! Static Web App.

use super::{create_tolerating_existing, probe, run_expecting_output, Outcome};
use crate::cli::CommandRunner;
use crate::{DashopsError, Result};
use serde::Deserialize;
use tracing::info;

/// The account `az` is logged in as.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct AzureAccount {
    /// Subscription id
    pub id: String,
    /// Tenant id
    #[serde(rename = "tenantId")]
    pub tenant_id: String,
    /// Subscription display name
    #[serde(default)]
    pub name: String,
}

/// Returns the active account.
///
/// # Errors
///
/// Returns [`DashopsError::NotAuthenticated`] if `az` has no login.
pub async fn current_account(runner: &dyn CommandRunner) -> Result<AzureAccount> {
    let out = runner
        .run("az", &["account", "show", "--output", "json"])
        .await
        .map_err(|e| match e {
            DashopsError::ToolNotInstalled(_) => e,
            other => DashopsError::NotAuthenticated(format!("run `az login` first ({})", other)),
        })?;
    Ok(serde_json::from_str(&out)?)
}

/// Makes `subscription` the active subscription if it is not already.
pub async fn use_subscription(runner: &dyn CommandRunner, subscription: &str) -> Result<()> {
    let account = current_account(runner).await?;
    if account.id == subscription {
        return Ok(());
    }

    info!(from = %account.id, to = %subscription, "switching subscription");
    runner
        .run("az", &["account", "set", "--subscription", subscription])
        .await
        .map_err(|e| DashopsError::step("subscription", subscription, e))?;
    Ok(())
}

/// Creates the resource group unless `az group exists` says it is there.
pub async fn ensure_resource_group(
    runner: &dyn CommandRunner,
    name: &str,
    location: &str,
    client: &str,
) -> Result<Outcome> {
    let step = |e| DashopsError::step("resource-group", name, e);

    let exists = runner
        .run("az", &["group", "exists", "--name", name])
        .await
        .map_err(step)?;
    if exists.trim().eq_ignore_ascii_case("true") {
        return Ok(Outcome::Existing);
    }

    let tag = format!("client={}", client);
    create_tolerating_existing(
        runner,
        "az",
        &[
            "group", "create",
            "--name", name,
            "--location", location,
            "--tags", &tag,
            "--output", "none",
        ],
    )
    .await
    .map_err(step)
}

/// Creates a StorageV2 account with public blob access disabled.
pub async fn ensure_storage_account(
    runner: &dyn CommandRunner,
    account: &str,
    resource_group: &str,
    location: &str,
) -> Result<Outcome> {
    let step = |e| DashopsError::step("storage-account", account, e);

    let found = probe(
        runner,
        "az",
        &[
            "storage", "account", "show",
            "--name", account,
            "--resource-group", resource_group,
            "--query", "name",
            "--output", "tsv",
        ],
    )
    .await
    .map_err(step)?;
    if found.is_some() {
        return Ok(Outcome::Existing);
    }

    create_tolerating_existing(
        runner,
        "az",
        &[
            "storage", "account", "create",
            "--name", account,
            "--resource-group", resource_group,
            "--location", location,
            "--sku", "Standard_LRS",
            "--kind", "StorageV2",
            "--min-tls-version", "TLS1_2",
            "--allow-blob-public-access", "false",
            "--output", "none",
        ],
    )
    .await
    .map_err(step)
}

/// Returns the first access key of the storage account.
pub async fn storage_account_key(
    runner: &dyn CommandRunner,
    account: &str,
    resource_group: &str,
) -> Result<String> {
    run_expecting_output(
        runner,
        "az",
        &[
            "storage", "account", "keys", "list",
            "--account-name", account,
            "--resource-group", resource_group,
            "--query", "[0].value",
            "--output", "tsv",
        ],
    )
    .await
    .map_err(|e| DashopsError::step("storage-key", account, e))
}

/// Creates the blob container. `az` reports `false` when it already existed.
pub async fn ensure_container(
    runner: &dyn CommandRunner,
    account: &str,
    container: &str,
    account_key: &str,
) -> Result<Outcome> {
    let created = runner
        .run(
            "az",
            &[
                "storage", "container", "create",
                "--name", container,
                "--account-name", account,
                "--account-key", account_key,
                "--query", "created",
                "--output", "tsv",
            ],
        )
        .await
        .map_err(|e| DashopsError::step("storage-container", container, e))?;

    if created.trim().eq_ignore_ascii_case("false") {
        Ok(Outcome::Existing)
    } else {
        Ok(Outcome::Created)
    }
}

/// Creates the Key Vault with access policies, so the creator can write
/// secrets straight away.
pub async fn ensure_key_vault(
    runner: &dyn CommandRunner,
    vault: &str,
    resource_group: &str,
    location: &str,
) -> Result<Outcome> {
    let step = |e| DashopsError::step("key-vault", vault, e);

    let found = probe(
        runner,
        "az",
        &["keyvault", "show", "--name", vault, "--query", "name", "--output", "tsv"],
    )
    .await
    .map_err(step)?;
    if found.is_some() {
        return Ok(Outcome::Existing);
    }

    create_tolerating_existing(
        runner,
        "az",
        &[
            "keyvault", "create",
            "--name", vault,
            "--resource-group", resource_group,
            "--location", location,
            "--enable-rbac-authorization", "false",
            "--output", "none",
        ],
    )
    .await
    .map_err(step)
}

/// Creates a Free tier Static Web App.
pub async fn ensure_static_web_app(
    runner: &dyn CommandRunner,
    name: &str,
    resource_group: &str,
    location: &str,
) -> Result<Outcome> {
    let step = |e| DashopsError::step("static-web-app", name, e);

    if static_web_app_hostname(runner, name, resource_group)
        .await
        .map_err(step)?
        .is_some()
    {
        return Ok(Outcome::Existing);
    }

    create_tolerating_existing(
        runner,
        "az",
        &[
            "staticwebapp", "create",
            "--name", name,
            "--resource-group", resource_group,
            "--location", location,
            "--sku", "Free",
            "--output", "none",
        ],
    )
    .await
    .map_err(step)
}

/// Default hostname of the Static Web App, or `None` if it does not exist.
pub async fn static_web_app_hostname(
    runner: &dyn CommandRunner,
    name: &str,
    resource_group: &str,
) -> Result<Option<String>> {
    probe(
        runner,
        "az",
        &[
            "staticwebapp", "show",
            "--name", name,
            "--resource-group", resource_group,
            "--query", "defaultHostname",
            "--output", "tsv",
        ],
    )
    .await
}

/// Deployment token the pipeline uses to publish the dashboard.
pub async fn static_web_app_token(
    runner: &dyn CommandRunner,
    name: &str,
    resource_group: &str,
) -> Result<String> {
    run_expecting_output(
        runner,
        "az",
        &[
            "staticwebapp", "secrets", "list",
            "--name", name,
            "--resource-group", resource_group,
            "--query", "properties.apiKey",
            "--output", "tsv",
        ],
    )
    .await
    .map_err(|e| DashopsError::step("deployment-token", name, e))
}

/// Lets the dashboard origin read blobs from the browser.
///
/// `az storage cors add` appends blindly, so existing rules are checked first.
pub async fn allow_cors_origin(
    runner: &dyn CommandRunner,
    account: &str,
    account_key: &str,
    origin: &str,
) -> Result<Outcome> {
    let step = |e| DashopsError::step("storage-cors", origin, e);

    let rules = runner
        .run(
            "az",
            &[
                "storage", "cors", "list",
                "--services", "b",
                "--account-name", account,
                "--account-key", account_key,
                "--output", "json",
            ],
        )
        .await
        .map_err(step)?;
    if rules.contains(origin) {
        return Ok(Outcome::Existing);
    }

    runner
        .run(
            "az",
            &[
                "storage", "cors", "add",
                "--services", "b",
                "--methods", "GET", "HEAD", "OPTIONS",
                "--origins", origin,
                "--allowed-headers", "*",
                "--exposed-headers", "*",
                "--max-age", "3600",
                "--account-name", account,
                "--account-key", account_key,
            ],
        )
        .await
        .map_err(step)?;
    Ok(Outcome::Created)
}

/// Generates a read/list SAS for the container, HTTPS only.
pub async fn generate_container_sas(
    runner: &dyn CommandRunner,
    account: &str,
    container: &str,
    account_key: &str,
    expiry: &str,
) -> Result<String> {
    run_expecting_output(
        runner,
        "az",
        &[
            "storage", "container", "generate-sas",
            "--account-name", account,
            "--name", container,
            "--account-key", account_key,
            "--permissions", "rl",
            "--expiry", expiry,
            "--https-only",
            "--output", "tsv",
        ],
    )
    .await
    .map_err(|e| DashopsError::step("sas-token", container, e))
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::cli::ScriptedRunner;

    #[tokio::test]
    async fn test_existing_resource_group_is_not_recreated() {
        let runner = ScriptedRunner::new().respond("az group exists", "true\n");
        let outcome = ensure_resource_group(&runner, "abcd-rg", "eastus", "abcd").await.unwrap();

        assert_eq!(outcome, Outcome::Existing);
        assert!(runner.commands_matching("az group create").is_empty());
    }

    #[tokio::test]
    async fn test_missing_resource_group_is_created() {
        let runner = ScriptedRunner::new().respond("az group exists", "false");
        let outcome = ensure_resource_group(&runner, "abcd-rg", "eastus", "abcd").await.unwrap();

        assert_eq!(outcome, Outcome::Created);
        assert_eq!(
            runner.commands_matching("az group create"),
            vec!["az group create --name abcd-rg --location eastus --tags client=abcd --output none"]
        );
    }

    #[tokio::test]
    async fn test_storage_account_created_when_show_fails_not_found() {
        let runner = ScriptedRunner::new().fail(
            "az storage account show",
            "ERROR: (ResourceNotFound) The Resource 'Microsoft.Storage/storageAccounts/abcdstorage' was not found.",
        );
        let outcome = ensure_storage_account(&runner, "abcdstorage", "abcd-rg", "eastus")
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Created);
        assert_eq!(runner.commands_matching("az storage account create").len(), 1);
    }

    #[tokio::test]
    async fn test_create_failure_names_step() {
        let runner = ScriptedRunner::new()
            .respond("az keyvault show", "")
            .fail("az keyvault create", "ERROR: (VaultAlreadyExists) name is in use by a deleted vault");

        // "AlreadyExists" without the space is a different, fatal condition
        let err = ensure_key_vault(&runner, "abcd-kv", "abcd-rg", "eastus").await.unwrap_err();
        assert!(err.to_string().starts_with("key-vault abcd-kv:"));
    }

    #[tokio::test]
    async fn test_container_outcome_from_created_flag() {
        let runner = ScriptedRunner::new().respond("az storage container create", "False");
        let outcome = ensure_container(&runner, "abcdstorage", "abcd-data", "key").await.unwrap();
        assert_eq!(outcome, Outcome::Existing);
    }

    #[tokio::test]
    async fn test_cors_rule_added_once() {
        let runner = ScriptedRunner::new().respond(
            "az storage cors list",
            r#"[{"AllowedOrigins":"https://abcd.azurestaticapps.net","Service":"blob"}]"#,
        );
        let outcome = allow_cors_origin(&runner, "abcdstorage", "key", "https://abcd.azurestaticapps.net")
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Existing);
        assert!(runner.commands_matching("az storage cors add").is_empty());
    }

    #[tokio::test]
    async fn test_use_subscription_switches_only_when_needed() {
        let account = r#"{"id":"sub-1","tenantId":"tenant-1","name":"Dashboards"}"#;
        let runner = ScriptedRunner::new().respond("az account show", account);

        use_subscription(&runner, "sub-1").await.unwrap();
        assert!(runner.commands_matching("az account set").is_empty());

        use_subscription(&runner, "sub-2").await.unwrap();
        assert_eq!(
            runner.commands_matching("az account set"),
            vec!["az account set --subscription sub-2"]
        );
    }

    #[tokio::test]
    async fn test_not_logged_in() {
        let runner = ScriptedRunner::new().fail("az account show", "Please run 'az login' to setup account.");
        assert!(matches!(
            current_account(&runner).await,
            Err(DashopsError::NotAuthenticated(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_sas_is_fatal() {
        let runner = ScriptedRunner::new();
        let err = generate_container_sas(&runner, "abcdstorage", "abcd-data", "key", "2026-11-01T12:00Z")
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("sas-token abcd-data:"));
    }
}
