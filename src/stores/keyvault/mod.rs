//! Azure Key Vault store.
//!
//! The canonical home of each client's configuration blob. Two
//! implementations share the registry:
//!
//! - `keyvault`: shells out to `az keyvault secret ...`, reusing whatever
//!   `az login` session the operator or pipeline already has
//! - `keyvault-sdk` (feature `azure-sdk`): talks to the vault through the Azure
//!   SDK with `DefaultAzureCredential`
//!
//! # Configuration
//!
//! The vault is `Config::vault` when set, otherwise the client's own
//! `{client}-kv`. [`Context::with_runner`](crate::ops::Context::with_runner)
//! fills `Config::vault` from the local `VAULT_NAME` before building the
//! store.
//!
//! ```
//! use dashops::{factory, Config, StoreType};
//!
//! let config = Config::new("abcd").unwrap().with_vault("shared-config-kv");
//! let store = factory::new_store(&config, factory::system_runner()).unwrap();
//! assert_eq!(store.scope(), "shared-config-kv");
//! ```

mod backend;
#[cfg(feature = "azure-sdk")]
mod sdk;

pub use backend::KeyVaultStore;
#[cfg(feature = "azure-sdk")]
pub use sdk::KeyVaultSdkStore;

use crate::{factory, keys, Config};

/// Vault holding the configuration blob for `config.client`.
pub fn vault_for(config: &Config) -> String {
    config.vault.clone().unwrap_or_else(|| {
        keys::default_for(keys::VAULT_NAME, &config.client)
            .unwrap_or_else(|| format!("{}-kv", config.client))
    })
}

/// Registers the Key Vault stores with the factory.
pub fn register() {
    factory::register_store("keyvault", |config, runner| {
        Ok(Box::new(KeyVaultStore::new(runner, vault_for(config))))
    });

    #[cfg(feature = "azure-sdk")]
    factory::register_store("keyvault-sdk", |config, _runner| {
        Ok(Box::new(KeyVaultSdkStore::new(vault_for(config))))
    });
}
