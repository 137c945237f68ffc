//! Error types for dashops operations.

use thiserror::Error;

/// Result type alias using [`DashopsError`].
pub type Result<T> = std::result::Result<T, DashopsError>;

/// Errors that can occur while resolving configuration or provisioning a client.
///
/// All errors implement `std::error::Error` and can be chained with `source()`.
#[derive(Debug, Error)]
pub enum DashopsError {
    /// No client identifier was supplied.
    #[error("client identifier is required")]
    MissingClientId,

    /// Client identifier failed validation.
    #[error("invalid client identifier '{id}': {reason}")]
    InvalidClientId {
        /// The rejected identifier
        id: String,
        /// Why it was rejected
        reason: String,
    },

    /// Hard-required configuration keys resolved to nothing.
    #[error("missing required configuration for client {client}: {}", .keys.join(", "))]
    MissingConfig {
        /// Client identifier
        client: String,
        /// Keys with no value in any tier
        keys: Vec<String>,
    },

    /// A configuration key or secret name failed validation.
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// Secret or resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Secret or resource already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Not logged in to the cloud or source-hosting CLI.
    #[error("not authenticated: {0}")]
    NotAuthenticated(String),

    /// Required CLI tool is not installed.
    #[error("CLI tool not installed: {0}")]
    ToolNotInstalled(String),

    /// Operation is not supported by this store.
    #[error("operation not supported by store: {0}")]
    NotSupported(String),

    /// The stored SAS token has expired or its expiry is unreadable.
    #[error("SAS token for client {client} is not usable: {reason}")]
    SasExpired {
        /// Client identifier
        client: String,
        /// Expiry detail
        reason: String,
    },

    /// A provisioning step failed with context.
    #[error("{step} {resource}: {source}")]
    StepFailed {
        /// Step name (resource-group, storage-account, ...)
        step: String,
        /// Resource name the step acted on
        resource: String,
        /// Underlying error
        #[source]
        source: Box<DashopsError>,
    },

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// External command exited with a non-zero status.
    #[error("command execution failed: {0}")]
    CommandFailed(String),

    /// Other error (catch-all).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DashopsError {
    /// Wraps an error with the provisioning step and resource it came from.
    ///
    /// # Example
    ///
    /// ```
    /// use dashops::DashopsError;
    ///
    /// let err = DashopsError::CommandFailed("az exited 1".to_string());
    /// let wrapped = DashopsError::step("storage-account", "abcdstorage", err);
    ///
    /// assert_eq!(
    ///     wrapped.to_string(),
    ///     "storage-account abcdstorage: command execution failed: az exited 1"
    /// );
    /// ```
    pub fn step(step: impl Into<String>, resource: impl Into<String>, err: DashopsError) -> Self {
        Self::StepFailed {
            step: step.into(),
            resource: resource.into(),
            source: Box::new(err),
        }
    }

    /// Returns true when the error reports a resource that already exists.
    ///
    /// Cloud CLIs do not share an error code for this, so command failures
    /// are matched on the messages `az` and `gh` print.
    pub fn is_already_exists(&self) -> bool {
        match self {
            Self::AlreadyExists(_) => true,
            Self::CommandFailed(msg) => {
                let msg = msg.to_ascii_lowercase();
                msg.contains("already exists") || msg.contains("roleassignmentexists")
            }
            Self::StepFailed { source, .. } => source.is_already_exists(),
            _ => false,
        }
    }

    /// Returns true when the error reports a missing resource.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::CommandFailed(msg) => {
                let msg = msg.to_ascii_lowercase();
                msg.contains("notfound")
                    || msg.contains("not found")
                    || msg.contains("was not found")
                    || msg.contains("could not be found")
            }
            Self::StepFailed { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_missing_config_names_every_key() {
        let err = DashopsError::MissingConfig {
            client: "abcd".to_string(),
            keys: vec!["AZURE_SUBSCRIPTION_ID".to_string(), "GITHUB_REPO".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "missing required configuration for client abcd: AZURE_SUBSCRIPTION_ID, GITHUB_REPO"
        );
    }

    #[test]
    fn test_step_error_source_chain() {
        let inner = DashopsError::NotFound("abcd-kv".to_string());
        let outer = DashopsError::step("key-vault", "abcd-kv", inner);

        assert!(outer.source().is_some());
        assert!(outer.is_not_found());
    }

    #[test]
    fn test_already_exists_detection() {
        let err = DashopsError::CommandFailed(
            "az failed with exit code 1: ERROR: (RoleAssignmentExists) The role assignment already exists."
                .to_string(),
        );
        assert!(err.is_already_exists());
        assert!(!DashopsError::MissingClientId.is_already_exists());
    }

    #[test]
    fn test_not_found_detection() {
        let err = DashopsError::CommandFailed(
            "az failed with exit code 3: ERROR: (ResourceNotFound) The Resource was not found".to_string(),
        );
        assert!(err.is_not_found());
        assert!(!DashopsError::CommandFailed("permission denied".to_string()).is_not_found());
    }
}
