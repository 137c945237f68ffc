//! Key Vault store over the Azure SDK.

use crate::validation::validate_secret_name;
use crate::{DashopsError, Result, SecretStore};
use async_trait::async_trait;
use azure_identity::DefaultAzureCredential;
use azure_security_keyvault::SecretClient;
use futures::StreamExt;
use std::sync::Arc;

/// Azure Key Vault accessed through the official SDK.
///
/// Credentials come from `DefaultAzureCredential`: environment variables,
/// managed identity, then the Azure CLI login.
pub struct KeyVaultSdkStore {
    client: Option<SecretClient>,
    vault: String,
}

impl KeyVaultSdkStore {
    /// Creates a store for the vault named `vault`.
    pub fn new(vault: impl Into<String>) -> Self {
        Self {
            client: None,
            vault: vault.into(),
        }
    }

    fn vault_url(&self) -> String {
        format!("https://{}.vault.azure.net", self.vault)
    }

    fn client(&self) -> Result<&SecretClient> {
        self.client.as_ref().ok_or_else(|| {
            DashopsError::NotAuthenticated(format!("vault {} not initialized", self.vault))
        })
    }
}

fn is_missing(e: &impl std::fmt::Display) -> bool {
    let msg = e.to_string();
    msg.contains("SecretNotFound") || msg.contains("404")
}

#[async_trait]
impl SecretStore for KeyVaultSdkStore {
    fn name(&self) -> &str {
        "keyvault-sdk"
    }

    fn scope(&self) -> String {
        self.vault.clone()
    }

    async fn init(&mut self) -> Result<()> {
        if self.vault.is_empty() {
            return Err(DashopsError::Other(anyhow::anyhow!("Key Vault name is required")));
        }

        let credential = Arc::new(DefaultAzureCredential::create(Default::default()).map_err(
            |e| DashopsError::NotAuthenticated(format!("Failed to create Azure credentials: {}", e)),
        )?);

        self.client = Some(SecretClient::new(&self.vault_url(), credential).map_err(|e| {
            DashopsError::Other(anyhow::anyhow!("Failed to create Secret client: {}", e))
        })?);

        Ok(())
    }

    async fn get_secret(&self, name: &str) -> Result<String> {
        validate_secret_name(name)?;

        let secret = self
            .client()?
            .get(name)
            .into_future()
            .await
            .map_err(|e| {
                if is_missing(&e) {
                    DashopsError::NotFound(format!("{} in vault {}", name, self.vault))
                } else {
                    DashopsError::Other(anyhow::anyhow!("Azure error: {}", e))
                }
            })?;

        Ok(secret.value)
    }

    async fn secret_exists(&self, name: &str) -> Result<bool> {
        validate_secret_name(name)?;

        match self.client()?.get(name).into_future().await {
            Ok(_) => Ok(true),
            Err(e) if is_missing(&e) => Ok(false),
            Err(e) => Err(DashopsError::Other(anyhow::anyhow!("Azure error: {}", e))),
        }
    }

    async fn list_secrets(&self) -> Result<Vec<String>> {
        let mut stream = self.client()?.list_secrets().into_stream();
        let mut names = Vec::new();

        while let Some(page) = stream.next().await {
            let page = page.map_err(|e| {
                DashopsError::Other(anyhow::anyhow!("Failed to list secrets: {}", e))
            })?;
            for secret in page.value {
                if let Some(name) = secret.id.rsplit('/').next() {
                    names.push(name.to_string());
                }
            }
        }

        Ok(names)
    }

    async fn set_secret(&mut self, name: &str, value: &str) -> Result<()> {
        validate_secret_name(name)?;

        self.client()?
            .set(name, value)
            .into_future()
            .await
            .map_err(|e| DashopsError::Other(anyhow::anyhow!("Failed to set secret: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vault_url() {
        let store = KeyVaultSdkStore::new("abcd-kv");
        assert_eq!(store.vault_url(), "https://abcd-kv.vault.azure.net");
    }

    #[tokio::test]
    async fn test_uninitialized_store() {
        let store = KeyVaultSdkStore::new("abcd-kv");
        assert!(matches!(
            store.get_secret("abcd-config").await,
            Err(DashopsError::NotAuthenticated(_))
        ));
    }
}
