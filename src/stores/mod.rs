//! Secret store implementations.

#[cfg(feature = "mock")]
pub mod mock;

pub mod github;
pub mod keyvault;

/// Registers all compiled stores that can hold the remote record.
pub fn register_all() {
    #[cfg(feature = "mock")]
    mock::register();

    keyvault::register();
}
