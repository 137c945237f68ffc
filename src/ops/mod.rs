//! End-to-end operations, one per command.
//!
//! Every operation follows the same shape: resolve the keys it needs
//! (failing before any write if a hard-required key is missing), run its
//! steps in order, then persist what it learned to the remote record and the
//! local file. A failed step aborts the run; resources created by earlier
//! steps stay in place.

mod dispatch;
mod fedcred;
mod provision;
mod refresh;
mod sync;

pub use dispatch::dispatch;
pub use fedcred::fedcred;
pub use provision::provision;
pub use refresh::refresh_sas;
pub use sync::sync;

use crate::cli::CommandRunner;
use crate::local::LocalConfigFile;
use crate::resolver::{self, Resolution, Resolver};
use crate::steps::Outcome;
use crate::stores::github::GitHubStore;
use crate::{factory, keys, stores, ClientRecord, Config, DashopsError, Result, SecretStore, StoreType};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Everything an operation needs, passed explicitly.
pub struct Context {
    config: Config,
    runner: Arc<dyn CommandRunner>,
    remote: Box<dyn SecretStore>,
    now: Option<DateTime<Utc>>,
    /// Vault the remote store follows from `VAULT_NAME`; `None` when the
    /// vault was pinned or the store is not a Key Vault.
    record_vault: Option<String>,
}

impl Context {
    /// Builds a context with real processes and the configured store.
    ///
    /// # Errors
    ///
    /// Fails if the local file cannot be read or the store type is not
    /// compiled in.
    pub async fn new(config: Config) -> Result<Self> {
        Self::with_runner(config, factory::system_runner()).await
    }

    /// Builds a context around `runner` with the configured store.
    ///
    /// Unless `Config::vault` pins it, the Key Vault holding the remote record
    /// is the client's local `VAULT_NAME` (file or `--set`), falling back to
    /// `{client}-kv`. The remote tier cannot name its own vault.
    pub async fn with_runner(mut config: Config, runner: Arc<dyn CommandRunner>) -> Result<Self> {
        let pinned = config.vault.is_some();
        if !pinned {
            let local = resolver::load_local(&config).await?;
            if let Some(vault) = local.get(keys::VAULT_NAME) {
                debug!(vault, "remote record vault taken from local configuration");
                config.vault = Some(vault.to_string());
            }
        }

        let remote = factory::new_store(&config, runner.clone())?;
        let record_vault = if pinned { None } else { record_vault_for(&config) };
        Ok(Self {
            config,
            runner,
            remote,
            now: None,
            record_vault,
        })
    }

    /// Builds a context from explicit parts.
    pub fn from_parts(
        config: Config,
        runner: Arc<dyn CommandRunner>,
        remote: Box<dyn SecretStore>,
    ) -> Self {
        let record_vault = match config.vault {
            Some(_) => None,
            None => record_vault_for(&config),
        };
        Self {
            config,
            runner,
            remote,
            now: None,
            record_vault,
        }
    }

    /// Pins the clock used for expiry arithmetic.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    /// The run configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The store holding the remote record.
    pub fn remote(&self) -> &dyn SecretStore {
        self.remote.as_ref()
    }

    /// Current time, or the pinned time.
    pub fn now(&self) -> DateTime<Utc> {
        self.now.unwrap_or_else(Utc::now)
    }

    /// Initializes the remote store, logging instead of failing.
    ///
    /// Used by operations that only read the remote tier.
    async fn init_remote_lenient(&mut self) {
        if let Err(e) = self.remote.init().await {
            warn!(store = self.remote.name(), error = %e, "remote store unavailable");
        }
    }

    async fn resolve(&self, resolver: &Resolver) -> Result<Resolution> {
        resolver::resolve_for(&self.config, self.remote.as_ref(), resolver).await
    }

    /// Merges `updates` into the remote record and writes it back.
    ///
    /// The current blob is re-read first so keys written by other
    /// operations survive.
    async fn persist_remote(&mut self, updates: &ClientRecord) -> Result<()> {
        let mut record = resolver::fetch_remote(self.remote.as_ref(), &self.config.client).await;
        record.merge(updates);

        let name = keys::config_secret_name(&self.config.client);
        self.remote.set_secret(&name, &record.to_json()?).await?;
        info!(store = self.remote.name(), scope = %self.remote.scope(), secret = %name, keys = record.len(), "remote configuration written");
        Ok(())
    }

    /// Merges `updates` into the local env file.
    async fn persist_local(&self, updates: &ClientRecord) -> Result<ClientRecord> {
        let file = LocalConfigFile::new(&self.config.config_dir, &self.config.client);
        let record = file.update(updates).await?;
        info!(path = %file.path().display(), "local configuration written");
        Ok(record)
    }

    /// Fails unless `vault` is where the remote record is read and written.
    ///
    /// Only applies when the store follows `VAULT_NAME`. A pinned vault may
    /// differ from the client's own.
    fn check_record_vault(&self, vault: &str) -> Result<()> {
        match self.record_vault.as_deref() {
            Some(home) if home != vault => Err(DashopsError::step(
                "key-vault",
                vault,
                DashopsError::Other(anyhow::anyhow!(
                    "configuration record is kept in vault {} but VAULT_NAME resolves to {}; pass --vault to choose",
                    home,
                    vault
                )),
            )),
            _ => Ok(()),
        }
    }

    /// GitHub environment store for the resolved repository, if one resolved.
    fn github_store(&self, resolution: &Resolution) -> Option<GitHubStore> {
        let repo = resolution.get(keys::GITHUB_REPO)?;
        let environment = resolution
            .get(keys::ENVIRONMENT_NAME)
            .unwrap_or(self.config.client.as_str());
        Some(GitHubStore::new(
            self.runner.clone(),
            repo,
            Some(environment.to_string()),
        ))
    }
}

fn record_vault_for(config: &Config) -> Option<String> {
    match config.store {
        StoreType::KeyVault | StoreType::KeyVaultSdk => Some(stores::keyvault::vault_for(config)),
        StoreType::Mock => None,
    }
}

/// One step of an operation and what it did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    /// Step name
    pub step: &'static str,
    /// Resource the step acted on
    pub resource: String,
    /// Result of the step
    pub outcome: Outcome,
}

/// What an operation resolved and did.
#[derive(Debug, Clone)]
pub struct Report {
    /// Resolved configuration
    pub resolution: Resolution,
    /// Steps in execution order
    pub steps: Vec<StepRecord>,
    /// Values the operation learned and persisted
    pub written: ClientRecord,
}

impl Report {
    fn new(resolution: Resolution) -> Self {
        Self {
            resolution,
            steps: Vec::new(),
            written: ClientRecord::new(),
        }
    }

    fn record(&mut self, step: &'static str, resource: impl Into<String>, outcome: Outcome) {
        let resource = resource.into();
        info!(step, resource = %resource, outcome = %outcome, "step complete");
        self.steps.push(StepRecord {
            step,
            resource,
            outcome,
        });
    }

    /// Outcome of the first step named `step`.
    pub fn outcome(&self, step: &str) -> Option<Outcome> {
        self.steps.iter().find(|s| s.step == step).map(|s| s.outcome)
    }

    /// Human-readable step summary.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        for s in &self.steps {
            out.push_str(&format!("  {:<22} {:<40} {}\n", s.step, s.resource, s.outcome));
        }
        out
    }

    /// Full operator report: where every key came from, then the steps.
    pub fn render(&self, title: &str) -> String {
        let mut out = self.resolution.provenance_report();
        out.push_str(&format!("{} for client {}:\n", title, self.resolution.client()));
        out.push_str(&self.summary());
        out
    }
}

/// Resolves every known key without writing anything.
///
/// A store that cannot be initialized only costs the remote tier.
pub async fn resolve(ctx: &mut Context) -> Result<Resolution> {
    ctx.init_remote_lenient().await;
    ctx.resolve(&Resolver::new(keys::ALL.iter().copied())).await
}
