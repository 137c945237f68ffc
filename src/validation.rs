//! Input validation for client identifiers, configuration keys and the names
//! handed to external CLIs.

use crate::{DashopsError, Result};
use std::fmt;

/// Characters that have no business in a resource or secret name.
const DANGEROUS_CHARS: &str = ";|&$`<>(){}[]!*?~#%^\\\"'";

/// Maximum allowed length for secret names (Key Vault caps at 127).
const MAX_NAME_LENGTH: usize = 127;

const MIN_CLIENT_LENGTH: usize = 2;

/// `{client}storage` must fit the 24 character storage account limit.
const MAX_CLIENT_LENGTH: usize = 12;

/// Short code naming a deployment tenant.
///
/// Every derived resource and secret name is seeded from it, so once parsed it
/// cannot be changed.
///
/// ```
/// use dashops::ClientId;
///
/// let client = ClientId::parse(" ABCD ").unwrap();
/// assert_eq!(client.as_str(), "abcd");
///
/// assert!(ClientId::parse("").is_err());
/// assert!(ClientId::parse("ab-cd").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(String);

impl ClientId {
    /// Parses and normalizes a client identifier.
    ///
    /// # Errors
    ///
    /// - [`DashopsError::MissingClientId`] for empty input
    /// - [`DashopsError::InvalidClientId`] when the code is too short, too
    ///   long, or contains anything but ASCII letters and digits
    pub fn parse(raw: &str) -> Result<Self> {
        let id = raw.trim().to_ascii_lowercase();
        if id.is_empty() {
            return Err(DashopsError::MissingClientId);
        }

        let invalid = |reason: String| DashopsError::InvalidClientId {
            id: id.clone(),
            reason,
        };

        if id.len() < MIN_CLIENT_LENGTH || id.len() > MAX_CLIENT_LENGTH {
            return Err(invalid(format!(
                "must be {}-{} characters",
                MIN_CLIENT_LENGTH, MAX_CLIENT_LENGTH
            )));
        }

        if !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(invalid("only letters and digits are allowed".to_string()));
        }

        if !id.starts_with(|c: char| c.is_ascii_alphabetic()) {
            return Err(invalid("must start with a letter".to_string()));
        }

        Ok(Self(id))
    }

    /// Returns the normalized identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ClientId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Returns true if `key` is a plain identifier: ASCII letters, digits and
/// underscores only.
pub fn is_config_key(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Validates a configuration key.
///
/// # Errors
///
/// Returns [`DashopsError::InvalidName`] if the key is not a plain identifier.
pub fn validate_config_key(key: &str) -> Result<()> {
    if is_config_key(key) {
        Ok(())
    } else {
        Err(DashopsError::InvalidName(format!(
            "configuration key '{}' may only contain letters, digits and underscores",
            key
        )))
    }
}

/// Validates a secret or resource name before it reaches a CLI argument list.
///
/// Rejects empty names, names over 127 characters, control characters and
/// shell metacharacters.
///
/// # Example
///
/// ```
/// use dashops::validation::validate_secret_name;
///
/// assert!(validate_secret_name("abcd-config").is_ok());
/// assert!(validate_secret_name("SAS_URL").is_ok());
///
/// assert!(validate_secret_name("").is_err());
/// assert!(validate_secret_name("name; rm -rf /").is_err());
/// ```
pub fn validate_secret_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(DashopsError::InvalidName("name cannot be empty".to_string()));
    }

    if name.len() > MAX_NAME_LENGTH {
        return Err(DashopsError::InvalidName(format!(
            "name exceeds maximum length of {} characters",
            MAX_NAME_LENGTH
        )));
    }

    if name.chars().any(|c| c.is_control()) {
        return Err(DashopsError::InvalidName(
            "name contains control characters".to_string(),
        ));
    }

    if name.chars().any(|c| DANGEROUS_CHARS.contains(c)) {
        return Err(DashopsError::InvalidName(format!(
            "name contains dangerous characters (not allowed: {})",
            DANGEROUS_CHARS
        )));
    }

    Ok(())
}

/// Strips one layer of matching single or double quotes and surrounding
/// whitespace.
pub fn strip_quotes(value: &str) -> &str {
    let value = value.trim();
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_id_normalized() {
        assert_eq!(ClientId::parse("AbCd").unwrap().as_str(), "abcd");
        assert_eq!(ClientId::parse("  x1y2\n").unwrap().to_string(), "x1y2");
    }

    #[test]
    fn test_client_id_missing() {
        assert!(matches!(
            ClientId::parse("   "),
            Err(DashopsError::MissingClientId)
        ));
    }

    #[test]
    fn test_client_id_rejections() {
        for raw in ["a", "abcdefghijklm", "ab_c", "ab-c", "1abc", "ab c"] {
            let result = ClientId::parse(raw);
            assert!(
                matches!(result, Err(DashopsError::InvalidClientId { .. })),
                "Expected '{}' to be rejected",
                raw
            );
        }
    }

    #[test]
    fn test_config_keys() {
        assert!(is_config_key("STORAGE_ACCOUNT"));
        assert!(is_config_key("key2"));
        assert!(!is_config_key(""));
        assert!(!is_config_key("BAD-KEY"));
        assert!(!is_config_key("BAD KEY"));
        assert!(!is_config_key("$(whoami)"));
        assert!(validate_config_key("a.b").is_err());
    }

    #[test]
    fn test_secret_name_rules() {
        assert!(validate_secret_name(&"a".repeat(127)).is_ok());
        assert!(validate_secret_name(&"a".repeat(128))
            .unwrap_err()
            .to_string()
            .contains("maximum length"));
        assert!(validate_secret_name("name\x01")
            .unwrap_err()
            .to_string()
            .contains("control"));

        for name in ["name|grep", "name&&id", "name`id`", "name'x'"] {
            assert!(
                validate_secret_name(name).is_err(),
                "Expected '{}' to fail validation",
                name
            );
        }
    }

    #[test]
    fn test_strip_quotes() {
        assert_eq!(strip_quotes("\"EastUS\""), "EastUS");
        assert_eq!(strip_quotes("'EastUS'"), "EastUS");
        assert_eq!(strip_quotes("  EastUS  "), "EastUS");
        assert_eq!(strip_quotes("\"mismatched'"), "\"mismatched'");
        assert_eq!(strip_quotes("\""), "\"");
        assert_eq!(strip_quotes("\"\""), "");
    }
}
