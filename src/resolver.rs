//! Layered configuration resolution.
//!
//! Each key is looked up in three tiers, first hit wins:
//!
//! 1. the remote record (JSON blob in the secret store)
//! 2. the local record (`{client}.env` plus command-line options)
//! 3. the deterministic default from [`keys::default_for`]
//!
//! A key no tier can satisfy is `missing`. Missing keys only fail the
//! resolution when the caller marked them hard-required.

use crate::local::LocalConfigFile;
use crate::{keys, ClientId, ClientRecord, Config, DashopsError, Result, SecretStore};
use std::fmt;
use tracing::{debug, info, warn};

/// Where a resolved value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Remote secret store record
    Remote,
    /// Local env file or command-line option
    Local,
    /// Derived from the client identifier
    Default,
    /// No tier had a value
    Missing,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote => write!(f, "remote"),
            Self::Local => write!(f, "local"),
            Self::Default => write!(f, "default"),
            Self::Missing => write!(f, "missing"),
        }
    }
}

/// Outcome of a resolution: the merged record plus per-key provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    client: ClientId,
    record: ClientRecord,
    provenance: Vec<(String, Tier)>,
}

impl Resolution {
    /// The client this resolution belongs to.
    pub fn client(&self) -> &ClientId {
        &self.client
    }

    /// The merged values. Missing keys are absent.
    pub fn record(&self) -> &ClientRecord {
        &self.record
    }

    /// Consumes the resolution, returning the merged values.
    pub fn into_record(self) -> ClientRecord {
        self.record
    }

    /// Value for `key`, if resolved.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.record.get(key)
    }

    /// Value for a key the resolver guaranteed (hard-required or defaulted).
    ///
    /// # Errors
    ///
    /// Returns [`DashopsError::MissingConfig`] if the key did not resolve.
    pub fn require(&self, key: &str) -> Result<&str> {
        self.record.get(key).ok_or_else(|| DashopsError::MissingConfig {
            client: self.client.to_string(),
            keys: vec![key.to_string()],
        })
    }

    /// Tier that satisfied `key`, or `None` if the key was not requested.
    pub fn tier(&self, key: &str) -> Option<Tier> {
        self.provenance
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, tier)| *tier)
    }

    /// Keys and tiers in resolution order.
    pub fn provenance(&self) -> &[(String, Tier)] {
        &self.provenance
    }

    /// Keys no tier could satisfy.
    pub fn missing(&self) -> Vec<&str> {
        self.provenance
            .iter()
            .filter(|(_, tier)| *tier == Tier::Missing)
            .map(|(k, _)| k.as_str())
            .collect()
    }

    /// Human-readable provenance log, one `KEY <- tier` line per key.
    ///
    /// Values are never included; several keys carry secrets.
    pub fn provenance_report(&self) -> String {
        let width = self
            .provenance
            .iter()
            .map(|(k, _)| k.len())
            .max()
            .unwrap_or(0);

        let mut out = format!("configuration for client {}:\n", self.client);
        for (key, tier) in &self.provenance {
            out.push_str(&format!("  {:<width$} <- {}\n", key, tier, width = width));
        }
        out
    }
}

/// Resolves an ordered list of keys against the three tiers.
///
/// # Example
///
/// ```
/// use dashops::resolver::{Resolver, Tier};
/// use dashops::{keys, ClientId, ClientRecord};
///
/// let client = ClientId::parse("abcd").unwrap();
/// let remote = ClientRecord::new().with(keys::LOCATION, "EastUS");
/// let local = ClientRecord::new().with(keys::LOCATION, "WestUS");
///
/// let resolution = Resolver::new([keys::LOCATION, keys::STORAGE_ACCOUNT])
///     .resolve(&client, &remote, &local)
///     .unwrap();
///
/// assert_eq!(resolution.get(keys::LOCATION), Some("EastUS"));
/// assert_eq!(resolution.get(keys::STORAGE_ACCOUNT), Some("abcdstorage"));
/// assert_eq!(resolution.tier(keys::STORAGE_ACCOUNT), Some(Tier::Default));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    keys: Vec<String>,
    hard_required: Vec<String>,
}

impl Resolver {
    /// Creates a resolver for `keys`, resolved in the given order.
    ///
    /// Duplicate keys are resolved once, at their first position.
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ordered: Vec<String> = Vec::new();
        for key in keys {
            let key = key.into();
            if !ordered.contains(&key) {
                ordered.push(key);
            }
        }
        Self {
            keys: ordered,
            hard_required: Vec::new(),
        }
    }

    /// Marks keys whose absence fails the resolution.
    ///
    /// Hard-required keys are added to the key list if not already there.
    pub fn hard_required<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for key in keys {
            let key = key.into();
            if !self.keys.contains(&key) {
                self.keys.push(key.clone());
            }
            if !self.hard_required.contains(&key) {
                self.hard_required.push(key);
            }
        }
        self
    }

    /// Keys in resolution order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Resolves every key.
    ///
    /// This is a pure function of its inputs; calling it twice with the same
    /// records yields the same resolution.
    ///
    /// # Errors
    ///
    /// Returns [`DashopsError::MissingConfig`] naming every hard-required key
    /// that no tier could satisfy.
    pub fn resolve(
        &self,
        client: &ClientId,
        remote: &ClientRecord,
        local: &ClientRecord,
    ) -> Result<Resolution> {
        let mut record = ClientRecord::new();
        let mut provenance = Vec::with_capacity(self.keys.len());

        for key in &self.keys {
            let (value, tier) = if let Some(v) = remote.get(key) {
                (Some(v.to_string()), Tier::Remote)
            } else if let Some(v) = local.get(key) {
                (Some(v.to_string()), Tier::Local)
            } else if let Some(v) = keys::default_for(key, client) {
                (Some(v), Tier::Default)
            } else {
                (None, Tier::Missing)
            };

            if let Some(value) = value {
                record.insert(key.clone(), value);
            }
            debug!(client = %client, key = %key, tier = %tier, "resolved configuration key");
            provenance.push((key.clone(), tier));
        }

        let missing: Vec<String> = self
            .hard_required
            .iter()
            .filter(|k| !record.contains(k))
            .cloned()
            .collect();

        if !missing.is_empty() {
            return Err(DashopsError::MissingConfig {
                client: client.to_string(),
                keys: missing,
            });
        }

        Ok(Resolution {
            client: client.clone(),
            record,
            provenance,
        })
    }
}

/// Fetches the remote tier for `client` from `store`.
///
/// Failure never propagates: an unreachable store, a missing blob, or a blob
/// that is not a JSON object all degrade to an empty record so resolution
/// falls through to the local and default tiers.
pub async fn fetch_remote(store: &dyn SecretStore, client: &ClientId) -> ClientRecord {
    let name = keys::config_secret_name(client);

    match store.get_secret(&name).await {
        Ok(blob) => match ClientRecord::from_json(&blob) {
            Ok(record) => {
                debug!(store = store.name(), secret = %name, keys = record.len(), "loaded remote configuration");
                record
            }
            Err(e) => {
                warn!(store = store.name(), secret = %name, error = %e, "remote configuration is not a JSON object, ignoring");
                ClientRecord::new()
            }
        },
        Err(DashopsError::NotFound(_)) => {
            info!(store = store.name(), secret = %name, "no remote configuration yet");
            ClientRecord::new()
        }
        Err(e) => {
            warn!(store = store.name(), secret = %name, error = %e, "remote configuration unavailable, falling back to local tiers");
            ClientRecord::new()
        }
    }
}

/// Builds the local tier: the env file overlaid with values from `config`.
///
/// `Config::github_repo` and `Config::options` come from flags or the
/// environment of this invocation, so they override the file.
pub async fn load_local(config: &Config) -> Result<ClientRecord> {
    let mut record = LocalConfigFile::new(&config.config_dir, &config.client)
        .load()
        .await?;

    if let Some(repo) = &config.github_repo {
        record.insert(keys::GITHUB_REPO, repo);
    }
    for (key, value) in &config.options {
        if crate::validation::is_config_key(key) {
            record.insert(key.clone(), value);
        }
    }

    Ok(record)
}

/// Fetches both tiers and resolves `resolver`'s keys.
///
/// The provenance report is logged at info level.
pub async fn resolve_for(
    config: &Config,
    store: &dyn SecretStore,
    resolver: &Resolver,
) -> Result<Resolution> {
    let remote = fetch_remote(store, &config.client).await;
    let local = load_local(config).await?;
    let resolution = resolver.resolve(&config.client, &remote, &local)?;

    for (key, tier) in resolution.provenance() {
        info!(client = %config.client, key = %key, tier = %tier, "config");
    }

    Ok(resolution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn client() -> ClientId {
        ClientId::parse("abcd").unwrap()
    }

    #[test]
    fn test_defaults_when_tiers_empty() {
        let empty = ClientRecord::new();
        let resolution = Resolver::new([keys::STORAGE_ACCOUNT, keys::VAULT_NAME])
            .resolve(&client(), &empty, &empty)
            .unwrap();

        assert_eq!(resolution.get(keys::STORAGE_ACCOUNT), Some("abcdstorage"));
        assert_eq!(resolution.get(keys::VAULT_NAME), Some("abcd-kv"));
        assert_eq!(resolution.tier(keys::VAULT_NAME), Some(Tier::Default));
    }

    #[test]
    fn test_remote_beats_local() {
        let remote = ClientRecord::new().with(keys::LOCATION, "EastUS");
        let local = ClientRecord::new().with(keys::LOCATION, "WestUS");

        let resolution = Resolver::new([keys::LOCATION])
            .resolve(&client(), &remote, &local)
            .unwrap();

        assert_eq!(resolution.get(keys::LOCATION), Some("EastUS"));
        assert_eq!(resolution.tier(keys::LOCATION), Some(Tier::Remote));
    }

    #[test]
    fn test_local_beats_default() {
        let local = ClientRecord::new().with(keys::RESOURCE_GROUP, "legacy-rg");

        let resolution = Resolver::new([keys::RESOURCE_GROUP])
            .resolve(&client(), &ClientRecord::new(), &local)
            .unwrap();

        assert_eq!(resolution.get(keys::RESOURCE_GROUP), Some("legacy-rg"));
        assert_eq!(resolution.tier(keys::RESOURCE_GROUP), Some(Tier::Local));
    }

    #[test]
    fn test_missing_optional_key() {
        let resolution = Resolver::new([keys::OWNER_EMAIL])
            .resolve(&client(), &ClientRecord::new(), &ClientRecord::new())
            .unwrap();

        assert_eq!(resolution.get(keys::OWNER_EMAIL), None);
        assert_eq!(resolution.tier(keys::OWNER_EMAIL), Some(Tier::Missing));
        assert_eq!(resolution.missing(), vec![keys::OWNER_EMAIL]);
        assert!(resolution.require(keys::OWNER_EMAIL).is_err());
    }

    #[test]
    fn test_hard_required_missing_fails_with_all_names() {
        let err = Resolver::new([keys::LOCATION])
            .hard_required([keys::AZURE_SUBSCRIPTION_ID, keys::AZURE_TENANT_ID])
            .resolve(&client(), &ClientRecord::new(), &ClientRecord::new())
            .unwrap_err();

        match err {
            DashopsError::MissingConfig { client, keys: missing } => {
                assert_eq!(client, "abcd");
                assert_eq!(missing, vec![keys::AZURE_SUBSCRIPTION_ID, keys::AZURE_TENANT_ID]);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_hard_required_with_default_never_fails() {
        let resolution = Resolver::new(Vec::<String>::new())
            .hard_required([keys::RESOURCE_GROUP])
            .resolve(&client(), &ClientRecord::new(), &ClientRecord::new())
            .unwrap();
        assert_eq!(resolution.require(keys::RESOURCE_GROUP).unwrap(), "abcd-rg");
    }

    #[test]
    fn test_empty_remote_value_falls_through() {
        // ClientRecord drops empty values, so parse a blob that has one
        let remote = ClientRecord::from_json(r#"{"LOCATION":"  ","VAULT_NAME":""}"#).unwrap();
        let local = ClientRecord::new().with(keys::LOCATION, "'WestUS'");

        let resolution = Resolver::new([keys::LOCATION, keys::VAULT_NAME])
            .resolve(&client(), &remote, &local)
            .unwrap();

        assert_eq!(resolution.get(keys::LOCATION), Some("WestUS"));
        assert_eq!(resolution.tier(keys::VAULT_NAME), Some(Tier::Default));
    }

    #[test]
    fn test_order_and_duplicates() {
        let resolver = Resolver::new([keys::VAULT_NAME, keys::LOCATION, keys::VAULT_NAME])
            .hard_required([keys::LOCATION, keys::CLIENT]);
        assert_eq!(resolver.keys(), &[keys::VAULT_NAME, keys::LOCATION, keys::CLIENT]);
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let remote = ClientRecord::new().with(keys::LOCATION, "EastUS");
        let local = ClientRecord::new().with(keys::OWNER_NAME, "Jo");
        let resolver = Resolver::new(keys::ALL.iter().copied());

        let first = resolver.resolve(&client(), &remote, &local).unwrap();
        let second = resolver.resolve(&client(), &remote, &local).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_provenance_report_hides_values() {
        let remote = ClientRecord::new().with(keys::SAS_TOKEN, "sv=2022&sig=secret");
        let resolution = Resolver::new([keys::SAS_TOKEN, keys::RESOURCE_GROUP, keys::OWNER_EMAIL])
            .resolve(&client(), &remote, &ClientRecord::new())
            .unwrap();

        let report = resolution.provenance_report();
        assert_eq!(
            report,
            "configuration for client abcd:\n  \
             SAS_TOKEN      <- remote\n  \
             RESOURCE_GROUP <- default\n  \
             OWNER_EMAIL    <- missing\n"
        );
        assert!(!report.contains("secret"));
    }

    #[cfg(feature = "mock")]
    #[tokio::test]
    async fn test_fetch_remote_degrades_on_failure() {
        use crate::stores::mock::MockStore;

        let mut store = MockStore::new();
        store.set("abcd-config", r#"{"LOCATION":"EastUS"}"#).await;
        assert_eq!(fetch_remote(&store, &client()).await.get(keys::LOCATION), Some("EastUS"));

        store.get_error = Some(DashopsError::CommandFailed("vault unreachable".to_string()));
        assert!(fetch_remote(&store, &client()).await.is_empty());

        let missing = MockStore::new();
        assert!(fetch_remote(&missing, &client()).await.is_empty());

        let garbage = MockStore::new();
        garbage.set("abcd-config", "not json").await;
        assert!(fetch_remote(&garbage, &client()).await.is_empty());
    }
}
