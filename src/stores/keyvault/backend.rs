//! Key Vault store over the `az` CLI.

use crate::cli::{CommandRunner, StatusCache};
use crate::validation::validate_secret_name;
use crate::{DashopsError, Result, SecretStore};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Azure Key Vault accessed through `az keyvault secret`.
pub struct KeyVaultStore {
    runner: Arc<dyn CommandRunner>,
    vault: String,
    status_cache: Mutex<StatusCache>,
}

impl KeyVaultStore {
    /// Creates a store for the vault named `vault`.
    pub fn new(runner: Arc<dyn CommandRunner>, vault: impl Into<String>) -> Self {
        Self {
            runner,
            vault: vault.into(),
            status_cache: Mutex::new(StatusCache::default()),
        }
    }

    /// Name of the vault.
    pub fn vault(&self) -> &str {
        &self.vault
    }

    async fn is_logged_in(&self) -> bool {
        if let Ok(cache) = self.status_cache.lock() {
            if let Some(authenticated) = cache.get() {
                return authenticated;
            }
        }

        let authenticated = self
            .runner
            .run("az", &["account", "show", "--output", "none"])
            .await
            .is_ok();

        if let Ok(mut cache) = self.status_cache.lock() {
            cache.set(authenticated);
        }

        authenticated
    }

    fn map_not_found(&self, name: &str, err: DashopsError) -> DashopsError {
        if err.is_not_found() {
            DashopsError::NotFound(format!("{} in vault {}", name, self.vault))
        } else {
            err
        }
    }
}

#[async_trait]
impl SecretStore for KeyVaultStore {
    fn name(&self) -> &str {
        "keyvault"
    }

    fn scope(&self) -> String {
        self.vault.clone()
    }

    async fn init(&mut self) -> Result<()> {
        if !self.runner.exists("az").await? {
            return Err(DashopsError::ToolNotInstalled(
                "az command not found - install the Azure CLI".to_string(),
            ));
        }

        if !self.is_logged_in().await {
            return Err(DashopsError::NotAuthenticated(
                "Azure CLI has no active account. Run: az login".to_string(),
            ));
        }

        Ok(())
    }

    async fn get_secret(&self, name: &str) -> Result<String> {
        validate_secret_name(name)?;

        let output = self
            .runner
            .run(
                "az",
                &[
                    "keyvault", "secret", "show",
                    "--vault-name", &self.vault,
                    "--name", name,
                    "--query", "value",
                    "--output", "tsv",
                ],
            )
            .await
            .map_err(|e| self.map_not_found(name, e))?;

        let value = output.trim_end_matches(['\r', '\n']);
        if value.is_empty() {
            return Err(DashopsError::NotFound(format!("{} in vault {} is empty", name, self.vault)));
        }
        Ok(value.to_string())
    }

    async fn secret_exists(&self, name: &str) -> Result<bool> {
        match self.get_secret(name).await {
            Ok(_) => Ok(true),
            Err(DashopsError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn list_secrets(&self) -> Result<Vec<String>> {
        let output = self
            .runner
            .run(
                "az",
                &[
                    "keyvault", "secret", "list",
                    "--vault-name", &self.vault,
                    "--query", "[].name",
                    "--output", "json",
                ],
            )
            .await?;

        if output.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&output)?)
    }

    async fn set_secret(&mut self, name: &str, value: &str) -> Result<()> {
        validate_secret_name(name)?;

        // Value goes through stdin so it never shows up in the process list
        self.runner
            .run_with_stdin(
                "az",
                &[
                    "keyvault", "secret", "set",
                    "--vault-name", &self.vault,
                    "--name", name,
                    "--file", "/dev/stdin",
                    "--encoding", "utf-8",
                    "--output", "none",
                ],
                value,
            )
            .await
            .map_err(|e| DashopsError::step("keyvault-secret", name, e))?;

        Ok(())
    }
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::cli::ScriptedRunner;

    fn kv_store(runner: ScriptedRunner) -> (Arc<ScriptedRunner>, KeyVaultStore) {
        let runner = Arc::new(runner);
        let store = KeyVaultStore::new(runner.clone(), "abcd-kv");
        (runner, store)
    }

    #[tokio::test]
    async fn test_get_secret_trims_tsv_newline() {
        let (runner, store) = kv_store(
            ScriptedRunner::new().respond("az keyvault secret show", "{\"LOCATION\":\"EastUS\"}\n"),
        );

        let value = store.get_secret("abcd-config").await.unwrap();
        assert_eq!(value, "{\"LOCATION\":\"EastUS\"}");
        assert_eq!(
            runner.commands(),
            vec!["az keyvault secret show --vault-name abcd-kv --name abcd-config --query value --output tsv"]
        );
    }

    #[tokio::test]
    async fn test_missing_secret_maps_to_not_found() {
        let (_, store) = kv_store(ScriptedRunner::new().fail(
            "az keyvault secret show",
            "ERROR: (SecretNotFound) A secret with (name/id) abcd-config was not found in this key vault.",
        ));

        assert!(matches!(
            store.get_secret("abcd-config").await,
            Err(DashopsError::NotFound(_))
        ));
        assert!(!store.secret_exists("abcd-config").await.unwrap());
    }

    #[tokio::test]
    async fn test_forbidden_is_not_not_found() {
        let (_, store) = kv_store(ScriptedRunner::new().fail(
            "az keyvault secret show",
            "ERROR: (Forbidden) The user does not have secrets get permission",
        ));

        assert!(matches!(
            store.get_secret("abcd-config").await,
            Err(DashopsError::CommandFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_set_secret_sends_value_on_stdin() {
        let (runner, mut store) = kv_store(ScriptedRunner::new());
        let blob = r#"{"SWA_DEPLOYMENT_TOKEN":"swa-token-1"}"#;
        store.set_secret("abcd-config", blob).await.unwrap();

        let invocations = runner.invocations();
        assert_eq!(invocations.len(), 1);
        assert_eq!(
            invocations[0].command,
            "az keyvault secret set --vault-name abcd-kv --name abcd-config --file /dev/stdin --encoding utf-8 --output none"
        );
        assert!(!invocations[0].command.contains("swa-token-1"));
        assert_eq!(invocations[0].stdin.as_deref(), Some(blob));
    }

    #[tokio::test]
    async fn test_list_secrets() {
        let (_, store) = kv_store(
            ScriptedRunner::new().respond("az keyvault secret list", "[\"abcd-config\", \"other\"]"),
        );
        assert_eq!(store.list_secrets().await.unwrap(), vec!["abcd-config", "other"]);
    }

    #[tokio::test]
    async fn test_init_requires_login() {
        let (_, mut store) = kv_store(ScriptedRunner::new().fail("az account show", "Please run 'az login'"));
        assert!(matches!(store.init().await, Err(DashopsError::NotAuthenticated(_))));

        let (_, mut store) = kv_store(ScriptedRunner::new().without_tool("az"));
        assert!(matches!(store.init().await, Err(DashopsError::ToolNotInstalled(_))));
    }
}
