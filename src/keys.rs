//! Well-known configuration keys and their deterministic defaults.
//!
//! Resource names are derived from the client identifier by concatenation, so
//! a client with nothing stored anywhere still resolves to a complete set of
//! resource names.

use crate::ClientId;

pub const CLIENT: &str = "CLIENT";
pub const RESOURCE_GROUP: &str = "RESOURCE_GROUP";
pub const STORAGE_ACCOUNT: &str = "STORAGE_ACCOUNT";
pub const STORAGE_CONTAINER: &str = "STORAGE_CONTAINER";
pub const VAULT_NAME: &str = "VAULT_NAME";
pub const STATIC_WEB_APP: &str = "STATIC_WEB_APP";
pub const APP_REGISTRATION: &str = "APP_REGISTRATION";
pub const ENVIRONMENT_NAME: &str = "ENVIRONMENT_NAME";
pub const LOCATION: &str = "LOCATION";
pub const SWA_LOCATION: &str = "SWA_LOCATION";

pub const AZURE_SUBSCRIPTION_ID: &str = "AZURE_SUBSCRIPTION_ID";
pub const AZURE_TENANT_ID: &str = "AZURE_TENANT_ID";
pub const AZURE_CLIENT_ID: &str = "AZURE_CLIENT_ID";
pub const GITHUB_REPO: &str = "GITHUB_REPO";
pub const OWNER_EMAIL: &str = "OWNER_EMAIL";
pub const OWNER_NAME: &str = "OWNER_NAME";

pub const SAS_TOKEN: &str = "SAS_TOKEN";
pub const SAS_EXPIRY: &str = "SAS_EXPIRY";
pub const SAS_URL: &str = "SAS_URL";
pub const SWA_DEPLOYMENT_TOKEN: &str = "SWA_DEPLOYMENT_TOKEN";
pub const DASHBOARD_URL: &str = "DASHBOARD_URL";

/// Every key the record may carry, in the order reports list them.
pub const ALL: &[&str] = &[
    CLIENT,
    RESOURCE_GROUP,
    STORAGE_ACCOUNT,
    STORAGE_CONTAINER,
    VAULT_NAME,
    STATIC_WEB_APP,
    APP_REGISTRATION,
    ENVIRONMENT_NAME,
    LOCATION,
    SWA_LOCATION,
    AZURE_SUBSCRIPTION_ID,
    AZURE_TENANT_ID,
    AZURE_CLIENT_ID,
    GITHUB_REPO,
    OWNER_EMAIL,
    OWNER_NAME,
    SAS_TOKEN,
    SAS_EXPIRY,
    SAS_URL,
    SWA_DEPLOYMENT_TOKEN,
    DASHBOARD_URL,
];

/// Default Azure region for the resource group, storage and vault.
pub const DEFAULT_LOCATION: &str = "eastus";

/// Static Web Apps are only offered in a handful of regions.
pub const DEFAULT_SWA_LOCATION: &str = "eastus2";

/// Returns the default value for `key`, if one exists.
///
/// Defaults depend only on the client identifier, never on time or the
/// environment.
///
/// # Example
///
/// ```
/// use dashops::{keys, ClientId};
///
/// let client = ClientId::parse("abcd").unwrap();
/// assert_eq!(keys::default_for(keys::STORAGE_ACCOUNT, &client).as_deref(), Some("abcdstorage"));
/// assert_eq!(keys::default_for(keys::VAULT_NAME, &client).as_deref(), Some("abcd-kv"));
/// assert_eq!(keys::default_for(keys::AZURE_TENANT_ID, &client), None);
/// ```
pub fn default_for(key: &str, client: &ClientId) -> Option<String> {
    let c = client.as_str();
    let value = match key {
        CLIENT => c.to_string(),
        RESOURCE_GROUP => format!("{}-rg", c),
        STORAGE_ACCOUNT => format!("{}storage", c),
        STORAGE_CONTAINER => format!("{}-data", c),
        VAULT_NAME => format!("{}-kv", c),
        STATIC_WEB_APP => format!("{}-dashboard", c),
        APP_REGISTRATION => format!("{}-github-deploy", c),
        ENVIRONMENT_NAME => c.to_string(),
        LOCATION => DEFAULT_LOCATION.to_string(),
        SWA_LOCATION => DEFAULT_SWA_LOCATION.to_string(),
        _ => return None,
    };
    Some(value)
}

/// Name of the Key Vault secret holding the client's JSON configuration blob.
pub fn config_secret_name(client: &ClientId) -> String {
    format!("{}-config", client)
}
