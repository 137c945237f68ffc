//! Secret store trait.
//!
//! A [`SecretStore`] is anywhere a client's configuration is written to or
//! read from by name: the Key Vault holding the canonical JSON blob, or the
//! GitHub environment whose secrets mirror it for pipeline runs.

use crate::Result;
use async_trait::async_trait;

/// SecretStore represents a named-secret backend.
///
/// Implementations must be `Send + Sync` so they can be boxed behind the
/// factory.
///
/// # Implementations
///
/// - **keyvault**: Azure Key Vault through the `az` CLI
/// - **keyvault-sdk**: Azure Key Vault through the Azure SDK (feature `azure-sdk`)
/// - **github**: GitHub repository or environment secrets through `gh`
/// - **mock**: in-memory store with error injection (feature `mock`)
///
/// # Example
///
/// ```no_run
/// use dashops::{factory, Config, SecretStore, StoreType};
///
/// #[tokio::main]
/// async fn main() -> dashops::Result<()> {
///     let config = Config::new("abcd")?.with_store(StoreType::KeyVault);
///     let mut store = factory::new_store(&config, factory::system_runner())?;
///
///     store.init().await?;
///     store.set_secret("abcd-config", r#"{"LOCATION":"eastus"}"#).await?;
///     println!("{}", store.get_secret("abcd-config").await?);
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait SecretStore: Send + Sync {
    // ========================================================================
    // Metadata
    // ========================================================================

    /// Returns the store name (e.g., "keyvault", "github").
    fn name(&self) -> &str;

    /// Human-readable location of the secrets (vault name, repo/environment).
    fn scope(&self) -> String;

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Checks that the backing CLI is installed and logged in.
    ///
    /// # Errors
    ///
    /// - [`DashopsError::ToolNotInstalled`](crate::DashopsError::ToolNotInstalled)
    /// - [`DashopsError::NotAuthenticated`](crate::DashopsError::NotAuthenticated)
    async fn init(&mut self) -> Result<()>;

    // ========================================================================
    // Reads
    // ========================================================================

    /// Retrieves a secret value.
    ///
    /// # Errors
    ///
    /// - [`DashopsError::NotFound`](crate::DashopsError::NotFound): no such secret
    /// - [`DashopsError::NotSupported`](crate::DashopsError::NotSupported):
    ///   the store is write-only
    async fn get_secret(&self, name: &str) -> Result<String>;

    /// Checks if a secret exists.
    async fn secret_exists(&self, name: &str) -> Result<bool>;

    /// Lists secret names.
    async fn list_secrets(&self) -> Result<Vec<String>>;

    // ========================================================================
    // Writes
    // ========================================================================

    /// Creates or overwrites a secret.
    async fn set_secret(&mut self, name: &str, value: &str) -> Result<()>;

    /// Creates a secret that must not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`DashopsError::AlreadyExists`](crate::DashopsError::AlreadyExists)
    /// if the secret is already present.
    async fn create_secret(&mut self, name: &str, value: &str) -> Result<()> {
        if self.secret_exists(name).await? {
            return Err(crate::DashopsError::AlreadyExists(name.to_string()));
        }
        self.set_secret(name, value).await
    }
}
