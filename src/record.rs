//! The client configuration record.

use crate::validation::{is_config_key, strip_quotes};
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Flat key/value configuration for one client.
///
/// The remote secret store owns the durable copy (as a JSON object); the
/// local env file and CI secrets mirror it. Empty values are never stored, so
/// "present" always means "present and non-empty".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientRecord {
    values: BTreeMap<String, String>,
}

impl ClientRecord {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value for `key`, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Returns true if `key` has a value.
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Sets `key` to `value` after stripping quotes.
    ///
    /// An empty value removes the key instead, matching the rule that empty
    /// and absent are the same thing.
    pub fn insert(&mut self, key: impl Into<String>, value: impl AsRef<str>) {
        let key = key.into();
        let value = strip_quotes(value.as_ref());
        if value.is_empty() {
            self.values.remove(&key);
        } else {
            self.values.insert(key, value.to_string());
        }
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, value: impl AsRef<str>) -> Self {
        self.insert(key, value);
        self
    }

    /// Copies every entry of `other` into this record, overwriting.
    pub fn merge(&mut self, other: &ClientRecord) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    /// Number of keys with values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if no key has a value.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parses the remote JSON blob.
    ///
    /// Keys that are not plain identifiers are dropped, as are null, array
    /// and object values. Numbers and booleans are kept in their JSON text
    /// form.
    ///
    /// # Errors
    ///
    /// Returns [`DashopsError::Json`](crate::DashopsError::Json) if the blob is
    /// not a JSON object.
    ///
    /// # Example
    ///
    /// ```
    /// use dashops::ClientRecord;
    ///
    /// let record = ClientRecord::from_json(r#"{"LOCATION":"EastUS","bad key":"x","PORT":443}"#).unwrap();
    /// assert_eq!(record.get("LOCATION"), Some("EastUS"));
    /// assert_eq!(record.get("PORT"), Some("443"));
    /// assert_eq!(record.get("bad key"), None);
    /// ```
    pub fn from_json(blob: &str) -> Result<Self> {
        let parsed: serde_json::Map<String, Value> = serde_json::from_str(blob.trim())?;
        let mut record = Self::new();

        for (key, value) in parsed {
            if !is_config_key(&key) {
                debug!(key = %key, "skipping malformed key in remote configuration");
                continue;
            }
            let text = match value {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null | Value::Array(_) | Value::Object(_) => continue,
            };
            record.insert(key, text);
        }

        Ok(record)
    }

    /// Serializes the record as the remote JSON blob.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Renders the record as `KEY="value"` lines for the local env file.
    ///
    /// Backslashes, double quotes and line breaks inside a value are escaped,
    /// so every entry stays on its own line.
    pub fn to_env_file(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.values {
            out.push_str(key);
            out.push_str("=\"");
            out.push_str(&escape_env_value(value));
            out.push_str("\"\n");
        }
        out
    }
}

fn escape_env_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

/// Reverses the escaping [`ClientRecord::to_env_file`] applies inside a
/// double-quoted value. Unknown escapes are kept as written.
pub(crate) fn unescape_env_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

impl FromIterator<(String, String)> for ClientRecord {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut record = Self::new();
        for (key, value) in iter {
            record.insert(key, value);
        }
        record
    }
}
