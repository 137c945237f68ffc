//! Store factory and registration system.

use crate::cli::{CommandRunner, SystemRunner};
use crate::{Config, DashopsError, Result, SecretStore};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

/// Factory function type for creating stores.
pub type StoreFactory = fn(&Config, Arc<dyn CommandRunner>) -> Result<Box<dyn SecretStore>>;

static STORE_REGISTRY: OnceLock<RwLock<HashMap<String, StoreFactory>>> = OnceLock::new();

fn registry() -> &'static RwLock<HashMap<String, StoreFactory>> {
    STORE_REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Registers a store factory function under `store_type`.
///
/// Store modules call this from their `register()` functions during
/// [`crate::init`].
pub fn register_store(store_type: &str, factory: StoreFactory) {
    if let Ok(mut reg) = registry().write() {
        reg.insert(store_type.to_string(), factory);
    }
}

/// Creates a store from configuration.
///
/// The factory is looked up by `config.store`. Compiled-in stores are
/// registered on first use.
///
/// # Errors
///
/// Returns an error if:
/// - The store type is not registered (missing feature flag)
/// - The store factory rejects the configuration
///
/// # Example
///
/// ```
/// use dashops::{factory, Config, StoreType};
///
/// let config = Config::new("abcd").unwrap().with_store(StoreType::Mock);
/// let store = factory::new_store(&config, factory::system_runner()).unwrap();
/// assert_eq!(store.name(), "mock");
/// ```
pub fn new_store(config: &Config, runner: Arc<dyn CommandRunner>) -> Result<Box<dyn SecretStore>> {
    crate::init();

    let store_name = config.store.to_string();
    let factory = {
        let reg = registry()
            .read()
            .map_err(|_| DashopsError::Other(anyhow::anyhow!("store registry poisoned")))?;
        *reg.get(&store_name).ok_or_else(|| {
            DashopsError::Other(anyhow::anyhow!(
                "unknown store: {} (did you enable the matching feature flag?)",
                store_name
            ))
        })?
    };

    factory(config, runner)
}

/// The runner used outside tests.
pub fn system_runner() -> Arc<dyn CommandRunner> {
    Arc::new(SystemRunner)
}
