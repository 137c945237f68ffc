//! Local per-client configuration file (the cache tier).
//!
//! Each client has one `KEY=value` file under the configuration directory.
//! The file is a mirror: it can always be regenerated from the remote record
//! or from defaults.

use crate::record::unescape_env_value;
use crate::validation::is_config_key;
use crate::{ClientId, ClientRecord, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Handle to `{dir}/{client}.env`.
///
/// # Security
///
/// The file may hold SAS tokens and deployment tokens:
/// - The directory is created with mode 0700 on Unix
/// - The file is written with mode 0600 on Unix
///
/// # Example
///
/// ```no_run
/// use dashops::{ClientId, ClientRecord, local::LocalConfigFile};
///
/// #[tokio::main]
/// async fn main() -> dashops::Result<()> {
///     let client = ClientId::parse("abcd")?;
///     let file = LocalConfigFile::new("clients", &client);
///
///     file.save(&ClientRecord::new().with("LOCATION", "eastus")).await?;
///     let record = file.load().await?;
///     assert_eq!(record.get("LOCATION"), Some("eastus"));
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct LocalConfigFile {
    path: PathBuf,
}

impl LocalConfigFile {
    /// Points at the env file for `client` inside `dir`.
    pub fn new(dir: impl AsRef<Path>, client: &ClientId) -> Self {
        Self {
            path: dir.as_ref().join(format!("{}.env", client)),
        }
    }

    /// Path of the env file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the file.
    ///
    /// A missing file is an empty record, not an error.
    ///
    /// # Errors
    ///
    /// Returns an error only for unexpected I/O failures.
    pub async fn load(&self) -> Result<ClientRecord> {
        match fs::read_to_string(&self.path).await {
            Ok(text) => Ok(parse_env(&text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no local configuration file");
                Ok(ClientRecord::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Writes `record`, replacing the file.
    pub async fn save(&self, record: &ClientRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;

                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    let mut perms = fs::metadata(parent).await?.permissions();
                    perms.set_mode(0o700);
                    fs::set_permissions(parent, perms).await?;
                }
            }
        }

        let mut file = fs::File::create(&self.path).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = file.metadata().await?.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(&self.path, perms).await?;
        }

        file.write_all(record.to_env_file().as_bytes()).await?;
        file.flush().await?;

        debug!(path = %self.path.display(), keys = record.len(), "wrote local configuration");
        Ok(())
    }

    /// Loads the file, merges `updates` over it and writes it back.
    pub async fn update(&self, updates: &ClientRecord) -> Result<ClientRecord> {
        let mut record = self.load().await?;
        record.merge(updates);
        self.save(&record).await?;
        Ok(record)
    }
}

/// Parses `KEY=value` lines.
///
/// Blank lines and `#` comments are skipped, a leading `export ` is allowed,
/// the first `=` separates key from value, and surrounding quotes are
/// stripped. Escapes inside double quotes (`\n`, `\r`, `\"`, `\\`) are
/// decoded. Lines whose key is not a plain identifier are ignored.
pub fn parse_env(text: &str) -> ClientRecord {
    let mut record = ClientRecord::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };

        let key = key.trim();
        if !is_config_key(key) {
            continue;
        }

        let value = value.trim();
        match value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
            Some(quoted) => record.insert(key, unescape_env_value(quoted)),
            None => record.insert(key, value),
        }
    }

    record
}
