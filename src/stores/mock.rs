//! Mock store for testing.
//!
//! Keeps secrets in memory and can be told to fail, so the remote-tier
//! fallback and write paths can be exercised without a vault.

use crate::{DashopsError, Result, SecretStore};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Mock store for testing.
///
/// # Example
///
/// ```
/// use dashops::stores::mock::MockStore;
/// use dashops::{DashopsError, SecretStore};
///
/// #[tokio::main]
/// async fn main() -> dashops::Result<()> {
///     let mut store = MockStore::new();
///     store.set("abcd-config", r#"{"LOCATION":"EastUS"}"#).await;
///
///     assert_eq!(store.get_secret("abcd-config").await?, r#"{"LOCATION":"EastUS"}"#);
///
///     store.get_error = Some(DashopsError::NotAuthenticated("expired".to_string()));
///     assert!(store.get_secret("abcd-config").await.is_err());
///     Ok(())
/// }
/// ```
pub struct MockStore {
    secrets: Arc<RwLock<BTreeMap<String, String>>>,
    write_only: bool,

    /// Error to return from `init()`
    pub init_error: Option<DashopsError>,
    /// Error to return from `get_secret()` and `secret_exists()`
    pub get_error: Option<DashopsError>,
    /// Error to return from `set_secret()`
    pub set_error: Option<DashopsError>,
}

impl MockStore {
    /// Creates a new mock store with no secrets.
    pub fn new() -> Self {
        Self {
            secrets: Arc::new(RwLock::new(BTreeMap::new())),
            write_only: false,
            init_error: None,
            get_error: None,
            set_error: None,
        }
    }

    /// Creates a store that accepts writes but refuses reads, like GitHub.
    pub fn write_only() -> Self {
        Self {
            write_only: true,
            ..Self::new()
        }
    }

    /// Returns a handle on the same secrets with no injected errors.
    pub fn share(&self) -> Self {
        Self {
            secrets: Arc::clone(&self.secrets),
            write_only: self.write_only,
            ..Self::new()
        }
    }

    /// Pre-populates a secret.
    pub async fn set(&self, name: impl Into<String>, value: impl Into<String>) {
        self.secrets.write().await.insert(name.into(), value.into());
    }

    /// Returns a secret regardless of `write_only`, for assertions.
    pub async fn peek(&self, name: &str) -> Option<String> {
        self.secrets.read().await.get(name).cloned()
    }

    /// Snapshot of every stored secret.
    pub async fn snapshot(&self) -> BTreeMap<String, String> {
        self.secrets.read().await.clone()
    }
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

fn injected(err: &DashopsError) -> DashopsError {
    DashopsError::Other(anyhow::anyhow!("{}", err))
}

#[async_trait]
impl SecretStore for MockStore {
    fn name(&self) -> &str {
        "mock"
    }

    fn scope(&self) -> String {
        "memory".to_string()
    }

    async fn init(&mut self) -> Result<()> {
        match self.init_error {
            Some(ref err) => Err(injected(err)),
            None => Ok(()),
        }
    }

    async fn get_secret(&self, name: &str) -> Result<String> {
        if self.write_only {
            return Err(DashopsError::NotSupported(
                "mock store is write-only".to_string(),
            ));
        }
        if let Some(ref err) = self.get_error {
            return Err(injected(err));
        }

        self.secrets
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| DashopsError::NotFound(name.to_string()))
    }

    async fn secret_exists(&self, name: &str) -> Result<bool> {
        if let Some(ref err) = self.get_error {
            return Err(injected(err));
        }
        Ok(self.secrets.read().await.contains_key(name))
    }

    async fn list_secrets(&self) -> Result<Vec<String>> {
        Ok(self.secrets.read().await.keys().cloned().collect())
    }

    async fn set_secret(&mut self, name: &str, value: &str) -> Result<()> {
        if let Some(ref err) = self.set_error {
            return Err(injected(err));
        }
        self.secrets
            .write()
            .await
            .insert(name.to_string(), value.to_string());
        Ok(())
    }
}

/// Registers the mock store with the factory.
pub fn register() {
    crate::factory::register_store("mock", |_cfg, _runner| Ok(Box::new(MockStore::new())));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_set_and_get() {
        let mut store = MockStore::new();
        store.init().await.unwrap();

        store.set_secret("abcd-config", "{}").await.unwrap();
        assert_eq!(store.get_secret("abcd-config").await.unwrap(), "{}");
        assert!(store.secret_exists("abcd-config").await.unwrap());
    }

    #[tokio::test]
    async fn test_mock_missing_secret() {
        let store = MockStore::new();
        let result = store.get_secret("nope").await;
        assert!(matches!(result, Err(DashopsError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_create_secret_refuses_duplicates() {
        let mut store = MockStore::new();
        store.create_secret("A", "1").await.unwrap();

        let result = store.create_secret("A", "2").await;
        assert!(matches!(result, Err(DashopsError::AlreadyExists(_))));
        assert_eq!(store.peek("A").await.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_write_only_store() {
        let mut store = MockStore::write_only();
        store.set_secret("SAS_URL", "https://x").await.unwrap();

        assert!(matches!(
            store.get_secret("SAS_URL").await,
            Err(DashopsError::NotSupported(_))
        ));
        assert_eq!(store.list_secrets().await.unwrap(), vec!["SAS_URL".to_string()]);
    }

    #[tokio::test]
    async fn test_error_injection() {
        let mut store = MockStore::new();
        store.set_error = Some(DashopsError::CommandFailed("vault offline".to_string()));

        let err = store.set_secret("A", "1").await.unwrap_err();
        assert!(err.to_string().contains("vault offline"));
    }
}
