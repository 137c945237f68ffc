//! GitHub store implementation.

use crate::cli::CommandRunner;
use crate::validation::is_config_key;
use crate::{DashopsError, Result, SecretStore};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

/// GitHub repository or environment secrets.
pub struct GitHubStore {
    runner: Arc<dyn CommandRunner>,
    repo: String,
    environment: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SecretEntry {
    name: String,
}

impl GitHubStore {
    /// Creates a store for `repo` (`owner/name`), scoped to `environment`
    /// when given.
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        repo: impl Into<String>,
        environment: Option<String>,
    ) -> Self {
        Self {
            runner,
            repo: repo.into(),
            environment,
        }
    }

    /// Repository the secrets belong to.
    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// Environment the secrets are scoped to, if any.
    pub fn environment(&self) -> Option<&str> {
        self.environment.as_deref()
    }

    fn scope_args(&self) -> Vec<&str> {
        let mut args = vec!["--repo", self.repo.as_str()];
        if let Some(env) = &self.environment {
            args.push("--env");
            args.push(env);
        }
        args
    }
}

/// Validates a name against GitHub's secret naming rules.
///
/// Names are letters, digits and underscores, must not start with a digit,
/// and must not use the reserved `GITHUB_` prefix.
///
/// ```
/// use dashops::stores::github::validate_github_secret_name;
///
/// assert!(validate_github_secret_name("SAS_URL").is_ok());
/// assert!(validate_github_secret_name("GITHUB_REPO").is_err());
/// assert!(validate_github_secret_name("1KEY").is_err());
/// ```
pub fn validate_github_secret_name(name: &str) -> Result<()> {
    if !is_config_key(name) {
        return Err(DashopsError::InvalidName(format!(
            "GitHub secret '{}' may only contain letters, digits and underscores",
            name
        )));
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(DashopsError::InvalidName(format!(
            "GitHub secret '{}' must not start with a digit",
            name
        )));
    }
    if name.to_ascii_uppercase().starts_with("GITHUB_") {
        return Err(DashopsError::InvalidName(format!(
            "GitHub secret '{}' uses the reserved GITHUB_ prefix",
            name
        )));
    }
    Ok(())
}

#[async_trait]
impl SecretStore for GitHubStore {
    fn name(&self) -> &str {
        "github"
    }

    fn scope(&self) -> String {
        match &self.environment {
            Some(env) => format!("{} ({})", self.repo, env),
            None => self.repo.clone(),
        }
    }

    async fn init(&mut self) -> Result<()> {
        if !self.runner.exists("gh").await? {
            return Err(DashopsError::ToolNotInstalled(
                "gh command not found - install the GitHub CLI".to_string(),
            ));
        }

        self.runner
            .run("gh", &["auth", "status"])
            .await
            .map_err(|_| {
                DashopsError::NotAuthenticated(
                    "GitHub CLI is not logged in. Run: gh auth login".to_string(),
                )
            })?;

        Ok(())
    }

    async fn get_secret(&self, name: &str) -> Result<String> {
        Err(DashopsError::NotSupported(format!(
            "GitHub does not expose secret values ({})",
            name
        )))
    }

    async fn secret_exists(&self, name: &str) -> Result<bool> {
        Ok(self.list_secrets().await?.iter().any(|s| s == name))
    }

    async fn list_secrets(&self) -> Result<Vec<String>> {
        let mut args = vec!["secret", "list"];
        args.extend(self.scope_args());
        args.extend(["--json", "name"]);

        let output = self.runner.run("gh", &args).await?;
        if output.trim().is_empty() {
            return Ok(Vec::new());
        }

        let entries: Vec<SecretEntry> = serde_json::from_str(&output)?;
        Ok(entries.into_iter().map(|e| e.name).collect())
    }

    async fn set_secret(&mut self, name: &str, value: &str) -> Result<()> {
        validate_github_secret_name(name)?;

        let mut args = vec!["secret", "set", name];
        args.extend(self.scope_args());

        // gh reads the value from stdin when --body is absent
        self.runner
            .run_with_stdin("gh", &args, value)
            .await
            .map_err(|e| DashopsError::step("github-secret", name, e))?;

        Ok(())
    }
}
