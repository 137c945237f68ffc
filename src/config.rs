//! Configuration types for a dashops run.
//!
//! A [`Config`] is built once per invocation and passed by reference to every
//! operation. Nothing downstream reads the process environment.

use crate::{ClientId, DashopsError, Result};
use std::collections::HashMap;
use std::path::PathBuf;

/// Secret store implementation identifier.
///
/// Each variant corresponds to an implementation registered with the
/// factory. GitHub secrets are not a variant: the store is write-only and
/// cannot hold the remote record, so operations build it directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreType {
    /// Azure Key Vault via the `az` CLI
    KeyVault,
    /// Azure Key Vault via the Azure SDK (feature `azure-sdk`)
    KeyVaultSdk,
    /// In-memory store (feature `mock`)
    Mock,
}

impl std::fmt::Display for StoreType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KeyVault => write!(f, "keyvault"),
            Self::KeyVaultSdk => write!(f, "keyvault-sdk"),
            Self::Mock => write!(f, "mock"),
        }
    }
}

impl std::str::FromStr for StoreType {
    type Err = DashopsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "keyvault" | "azure" | "az" => Ok(Self::KeyVault),
            "keyvault-sdk" | "azure-sdk" => Ok(Self::KeyVaultSdk),
            "mock" => Ok(Self::Mock),
            "github" | "gh" => Err(DashopsError::NotSupported(
                "github secrets are write-only and cannot hold the configuration record; use keyvault"
                    .to_string(),
            )),
            other => Err(DashopsError::Other(anyhow::anyhow!(
                "unknown store type: {}. Valid options: keyvault, keyvault-sdk, mock",
                other
            ))),
        }
    }
}

/// Default number of days a refreshed SAS token stays valid.
pub const DEFAULT_SAS_DAYS: u32 = 7;

/// Longest SAS lifetime accepted.
pub const MAX_SAS_DAYS: u32 = 365;

/// Checks a SAS lifetime is between 1 and [`MAX_SAS_DAYS`] days.
pub fn validate_sas_days(days: u32) -> Result<()> {
    if days == 0 || days > MAX_SAS_DAYS {
        return Err(DashopsError::Other(anyhow::anyhow!(
            "SAS lifetime must be between 1 and {} days, got {}",
            MAX_SAS_DAYS,
            days
        )));
    }
    Ok(())
}

/// Configuration for one client run.
///
/// Use the builder pattern:
///
/// ```
/// use dashops::{Config, StoreType};
///
/// let config = Config::new("abcd").unwrap()
///     .with_config_dir("/etc/dashops/clients")
///     .with_github_repo("acme/dashboards")
///     .with_option("LOCATION", "westeurope");
///
/// assert_eq!(config.client.as_str(), "abcd");
/// assert_eq!(config.store, StoreType::KeyVault);
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Client identifier
    pub client: ClientId,

    /// Directory holding `{client}.env` files (default: `clients`)
    pub config_dir: PathBuf,

    /// Store holding the remote JSON blob (default: Key Vault via `az`)
    pub store: StoreType,

    /// Vault holding the blob; `None` means the client's own `{client}-kv`
    pub vault: Option<String>,

    /// `owner/name` of the dashboard repository, if known up front
    pub github_repo: Option<String>,

    /// Workflow file dispatched by `dispatch` (default: `deploy.yml`)
    pub workflow: String,

    /// Git ref the workflow runs on (default: `main`)
    pub git_ref: String,

    /// SAS token lifetime in days (default: 7)
    pub sas_days: u32,

    /// Role names granted to the deployment identity on the resource group
    pub roles: Vec<String>,

    /// Values that take part in resolution at the local tier, e.g. from
    /// command-line flags
    pub options: HashMap<String, String>,
}

impl Config {
    /// Creates a configuration for `client` with defaults everywhere else.
    ///
    /// # Errors
    ///
    /// Returns an error if the client identifier is missing or invalid.
    pub fn new(client: &str) -> Result<Self> {
        Ok(Self {
            client: ClientId::parse(client)?,
            config_dir: PathBuf::from("clients"),
            store: StoreType::KeyVault,
            vault: None,
            github_repo: None,
            workflow: "deploy.yml".to_string(),
            git_ref: "main".to_string(),
            sas_days: DEFAULT_SAS_DAYS,
            roles: vec!["Contributor".to_string()],
            options: HashMap::new(),
        })
    }

    /// Builds a configuration from `DASHOPS_*` environment variables.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `DASHOPS_CONFIG_DIR` | `config_dir` |
    /// | `DASHOPS_STORE` | `store` |
    /// | `DASHOPS_VAULT` | `vault` |
    /// | `DASHOPS_GITHUB_REPO` | `github_repo` |
    /// | `DASHOPS_WORKFLOW` | `workflow` |
    /// | `DASHOPS_SAS_DAYS` | `sas_days` |
    pub fn from_env(client: &str) -> Result<Self> {
        let mut config = Self::new(client)?;
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        if let Some(dir) = var("DASHOPS_CONFIG_DIR") {
            config = config.with_config_dir(dir);
        }
        if let Some(store) = var("DASHOPS_STORE") {
            config = config.with_store(store.parse()?);
        }
        if let Some(vault) = var("DASHOPS_VAULT") {
            config = config.with_vault(vault);
        }
        if let Some(repo) = var("DASHOPS_GITHUB_REPO") {
            config = config.with_github_repo(repo);
        }
        if let Some(workflow) = var("DASHOPS_WORKFLOW") {
            config = config.with_workflow(workflow);
        }
        if let Some(days) = var("DASHOPS_SAS_DAYS") {
            let days = days.trim().parse().map_err(|e| {
                DashopsError::Other(anyhow::anyhow!("DASHOPS_SAS_DAYS is not a number: {}", e))
            })?;
            config = config.with_sas_days(days)?;
        }

        Ok(config)
    }

    /// Sets the directory holding local env files.
    pub fn with_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = dir.into();
        self
    }

    /// Sets the store holding the remote blob.
    pub fn with_store(mut self, store: StoreType) -> Self {
        self.store = store;
        self
    }

    /// Reads the remote blob from `vault` instead of the client's own vault.
    pub fn with_vault(mut self, vault: impl Into<String>) -> Self {
        self.vault = Some(vault.into());
        self
    }

    /// Sets the dashboard repository (`owner/name`).
    pub fn with_github_repo(mut self, repo: impl Into<String>) -> Self {
        self.github_repo = Some(repo.into());
        self
    }

    /// Sets the workflow file dispatched by `dispatch`.
    pub fn with_workflow(mut self, workflow: impl Into<String>) -> Self {
        self.workflow = workflow.into();
        self
    }

    /// Sets the git ref used for workflow dispatch.
    pub fn with_git_ref(mut self, git_ref: impl Into<String>) -> Self {
        self.git_ref = git_ref.into();
        self
    }

    /// Sets the SAS lifetime.
    ///
    /// # Errors
    ///
    /// Rejects zero and anything over a year.
    pub fn with_sas_days(mut self, days: u32) -> Result<Self> {
        validate_sas_days(days)?;
        self.sas_days = days;
        Ok(self)
    }

    /// Replaces the roles granted to the deployment identity.
    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a configuration value that resolves at the local tier.
    ///
    /// These override the env file but never the remote record.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Gets an option value.
    pub fn get_option(&self, key: &str) -> Option<&String> {
        self.options.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = Config::new("ABCD")
            .unwrap()
            .with_store(StoreType::Mock)
            .with_vault("shared-kv")
            .with_option("LOCATION", "westeurope")
            .with_roles(["Contributor", "Storage Blob Data Contributor"])
            .with_sas_days(14)
            .unwrap();

        assert_eq!(config.client.as_str(), "abcd");
        assert_eq!(config.store, StoreType::Mock);
        assert_eq!(config.vault.as_deref(), Some("shared-kv"));
        assert_eq!(config.get_option("LOCATION"), Some(&"westeurope".to_string()));
        assert_eq!(config.roles.len(), 2);
        assert_eq!(config.sas_days, 14);
    }

    #[test]
    fn test_default_config() {
        let config = Config::new("abcd").unwrap();
        assert_eq!(config.config_dir, PathBuf::from("clients"));
        assert_eq!(config.workflow, "deploy.yml");
        assert_eq!(config.git_ref, "main");
        assert_eq!(config.sas_days, DEFAULT_SAS_DAYS);
        assert_eq!(config.roles, vec!["Contributor".to_string()]);
    }

    #[test]
    fn test_missing_client_rejected() {
        assert!(matches!(Config::new(""), Err(DashopsError::MissingClientId)));
    }

    #[test]
    fn test_sas_days_bounds() {
        let config = Config::new("abcd").unwrap();
        assert!(config.clone().with_sas_days(0).is_err());
        assert!(config.clone().with_sas_days(366).is_err());
        assert!(config.with_sas_days(365).is_ok());
    }

    #[test]
    fn test_store_type_parsing() {
        assert_eq!("keyvault".parse::<StoreType>().unwrap(), StoreType::KeyVault);
        assert_eq!("AZ".parse::<StoreType>().unwrap(), StoreType::KeyVault);
        assert_eq!(StoreType::KeyVaultSdk.to_string(), "keyvault-sdk");
        assert!("bitwarden".parse::<StoreType>().is_err());
    }

    #[test]
    fn test_write_only_store_cannot_hold_record() {
        assert!(matches!("github".parse::<StoreType>(), Err(DashopsError::NotSupported(_))));
        assert!(matches!("gh".parse::<StoreType>(), Err(DashopsError::NotSupported(_))));
    }
}
