//! Individual provisioning steps.
//!
//! Each step is one idempotent-by-convention action against the Azure or
//! GitHub CLI: probe for the resource, create it if absent, and treat an
//! "already exists" answer from the create as success.

pub mod azure;
pub mod github;
pub mod identity;

use crate::cli::CommandRunner;
use crate::{DashopsError, Result};
use std::fmt;

/// What a step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The resource was created
    Created,
    /// The resource was already there; nothing changed
    Existing,
    /// The resource existed and was overwritten
    Updated,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Existing => write!(f, "exists"),
            Self::Updated => write!(f, "updated"),
        }
    }
}

/// Runs a `show`-style probe.
///
/// Returns the trimmed output when the resource exists, `None` when the CLI
/// reports it missing or prints nothing. Any other failure is an error.
pub(crate) async fn probe(runner: &dyn CommandRunner, program: &str, args: &[&str]) -> Result<Option<String>> {
    match runner.run(program, args).await {
        Ok(out) => {
            let out = out.trim();
            Ok((!out.is_empty()).then(|| out.to_string()))
        }
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Runs a command whose output must not be empty.
pub(crate) async fn run_expecting_output(
    runner: &dyn CommandRunner,
    program: &str,
    args: &[&str],
) -> Result<String> {
    let out = runner.run(program, args).await?;
    let out = out.trim();
    if out.is_empty() {
        return Err(DashopsError::CommandFailed(format!(
            "{} {} returned no output",
            program,
            args.iter().take(3).copied().collect::<Vec<_>>().join(" ")
        )));
    }
    Ok(out.to_string())
}

/// Runs a create command, mapping "already exists" to [`Outcome::Existing`].
pub(crate) async fn create_tolerating_existing(
    runner: &dyn CommandRunner,
    program: &str,
    args: &[&str],
) -> Result<Outcome> {
    match runner.run(program, args).await {
        Ok(_) => Ok(Outcome::Created),
        Err(e) if e.is_already_exists() => {
            tracing::warn!(program, error = %e, "resource already exists, continuing");
            Ok(Outcome::Existing)
        }
        Err(e) => Err(e),
    }
}
