//! Dashops - provisioning and configuration for per-client Azure dashboards.
//!
//! Each client gets the same set of Azure resources (resource group, storage
//! account and container, Key Vault, Static Web App) and a GitHub deployment
//! environment that signs in to Azure through a federated credential. Dashops
//! creates those resources, keeps the client's configuration record in step
//! across Key Vault, a local env file and GitHub secrets, and refreshes the
//! SAS token the dashboard reads its data with.
//!
//! # Features
//!
//! - **Layered configuration**: every key resolves remote, then local, then
//!   a default derived from the client id, with provenance
//! - **Idempotent steps**: existing resources are detected and reused
//! - **Pluggable stores**: Key Vault through `az` or the Azure SDK, GitHub
//!   secrets through `gh`, and an in-memory store for tests
//! - **Explicit context**: operations take their configuration, command
//!   runner and stores as arguments
//!
//! # Quick Start
//!
//! ```no_run
//! use dashops::ops::{self, Context};
//! use dashops::Config;
//!
//! #[tokio::main]
//! async fn main() -> dashops::Result<()> {
//!     let config = Config::new("abcd")?.with_github_repo("acme/dashboards");
//!     let mut ctx = Context::new(config).await?;
//!
//!     let resolution = ops::resolve(&mut ctx).await?;
//!     print!("{}", resolution.provenance_report());
//!
//!     let report = ops::refresh_sas(&mut ctx, true).await?;
//!     print!("{}", report.summary());
//!     Ok(())
//! }
//! ```
//!
//! # Stores
//!
//! | Store | Feature Flag | CLI Required | Notes |
//! |-------|-------------|--------------|-------|
//! | Mock | `mock` (default) | None | In-memory, error injection |
//! | Key Vault | always | `az` | Default remote tier |
//! | Key Vault SDK | `azure-sdk` | None | `DefaultAzureCredential` |
//!
//! GitHub environment secrets (through `gh`) mirror the record for pipeline
//! runs. They are write-only, so they are not a remote tier and have no
//! factory entry.

pub mod cli;
pub mod config;
pub mod error;
pub mod factory;
pub mod keys;
pub mod local;
pub mod ops;
pub mod record;
pub mod resolver;
pub mod sas;
pub mod steps;
pub mod store;
pub mod stores;
pub mod validation;

pub use config::{Config, StoreType};
pub use error::{DashopsError, Result};
pub use record::ClientRecord;
pub use store::SecretStore;
pub use validation::ClientId;

use std::sync::Once;

static INIT: Once = Once::new();

/// Registers all compiled stores with the factory.
///
/// Called automatically by [`factory::new_store`]; calling it again is a
/// no-op.
pub fn init() {
    INIT.call_once(stores::register_all);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_initialization() {
        init();
        init();
    }

    #[test]
    fn test_unregistered_store_type() {
        init();

        let mut config = Config::new("abcd").unwrap();
        config.store = StoreType::KeyVaultSdk;

        let store = factory::new_store(&config, factory::system_runner());
        assert_eq!(store.is_ok(), cfg!(feature = "azure-sdk"));
    }
}
