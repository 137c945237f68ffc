//! Deployment identity: app registration, service principal, federated
//! credential and role assignments.
//!
//! The pipeline signs in to Azure with OIDC. GitHub presents a token whose
//! subject names the repository and environment; the federated credential
//! on the app registration trusts exactly that subject, so no client secret
//! is ever stored.

use super::{create_tolerating_existing, probe, run_expecting_output, Outcome};
use crate::cli::CommandRunner;
use crate::{DashopsError, Result};
use serde::Serialize;

/// Token issuer for GitHub Actions OIDC.
pub const GITHUB_ISSUER: &str = "https://token.actions.githubusercontent.com";

/// Audience Azure expects in federated tokens.
pub const AZURE_AUDIENCE: &str = "api://AzureADTokenExchange";

/// Federated identity credential parameters, in the shape
/// `az ad app federated-credential create --parameters` takes.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FederatedCredential {
    /// Credential name, unique per app registration
    pub name: String,
    /// Token issuer
    pub issuer: String,
    /// Token subject claim
    pub subject: String,
    /// Accepted audiences
    pub audiences: Vec<String>,
    /// Free-form description
    pub description: String,
}

impl FederatedCredential {
    /// Trust binding for workflow runs in `environment` of `repo`.
    ///
    /// ```
    /// use dashops::steps::identity::FederatedCredential;
    ///
    /// let cred = FederatedCredential::for_environment("acme/dashboards", "abcd");
    /// assert_eq!(cred.subject, "repo:acme/dashboards:environment:abcd");
    /// assert_eq!(cred.name, "acme-dashboards-abcd");
    /// ```
    pub fn for_environment(repo: &str, environment: &str) -> Self {
        let name: String = format!("{}-{}", repo, environment)
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
            .take(120)
            .collect();

        Self {
            name,
            issuer: GITHUB_ISSUER.to_string(),
            subject: format!("repo:{}:environment:{}", repo, environment),
            audiences: vec![AZURE_AUDIENCE.to_string()],
            description: format!("GitHub Actions deployments from {} ({})", repo, environment),
        }
    }
}

/// Finds the app registration by display name, creating it if absent.
///
/// Returns the application (client) id.
pub async fn ensure_app_registration(
    runner: &dyn CommandRunner,
    display_name: &str,
) -> Result<(String, Outcome)> {
    let step = |e| DashopsError::step("app-registration", display_name, e);

    let existing = probe(
        runner,
        "az",
        &[
            "ad", "app", "list",
            "--display-name", display_name,
            "--query", "[0].appId",
            "--output", "tsv",
        ],
    )
    .await
    .map_err(step)?;
    if let Some(app_id) = existing {
        return Ok((app_id, Outcome::Existing));
    }

    let app_id = run_expecting_output(
        runner,
        "az",
        &[
            "ad", "app", "create",
            "--display-name", display_name,
            "--query", "appId",
            "--output", "tsv",
        ],
    )
    .await
    .map_err(step)?;
    Ok((app_id, Outcome::Created))
}

/// Ensures the app registration has a service principal in the tenant.
pub async fn ensure_service_principal(runner: &dyn CommandRunner, app_id: &str) -> Result<Outcome> {
    let step = |e| DashopsError::step("service-principal", app_id, e);

    let found = probe(
        runner,
        "az",
        &["ad", "sp", "show", "--id", app_id, "--query", "id", "--output", "tsv"],
    )
    .await
    .map_err(step)?;
    if found.is_some() {
        return Ok(Outcome::Existing);
    }

    create_tolerating_existing(
        runner,
        "az",
        &["ad", "sp", "create", "--id", app_id, "--output", "none"],
    )
    .await
    .map_err(step)
}

/// Creates the federated credential, or updates it in place when one with
/// the same name exists.
pub async fn ensure_federated_credential(
    runner: &dyn CommandRunner,
    app_id: &str,
    credential: &FederatedCredential,
) -> Result<Outcome> {
    let step = |e| DashopsError::step("federated-credential", &credential.name, e);

    let listed = runner
        .run(
            "az",
            &[
                "ad", "app", "federated-credential", "list",
                "--id", app_id,
                "--query", "[].name",
                "--output", "json",
            ],
        )
        .await
        .map_err(step)?;
    let names: Vec<String> = if listed.trim().is_empty() {
        Vec::new()
    } else {
        serde_json::from_str(&listed)?
    };

    let parameters = serde_json::to_string(credential)?;

    if names.iter().any(|n| n == &credential.name) {
        runner
            .run(
                "az",
                &[
                    "ad", "app", "federated-credential", "update",
                    "--id", app_id,
                    "--federated-credential-id", &credential.name,
                    "--parameters", &parameters,
                ],
            )
            .await
            .map_err(step)?;
        return Ok(Outcome::Updated);
    }

    runner
        .run(
            "az",
            &[
                "ad", "app", "federated-credential", "create",
                "--id", app_id,
                "--parameters", &parameters,
            ],
        )
        .await
        .map_err(step)?;
    Ok(Outcome::Created)
}

/// Resource id of a resource group.
pub fn resource_group_scope(subscription: &str, resource_group: &str) -> String {
    format!("/subscriptions/{}/resourceGroups/{}", subscription, resource_group)
}

/// Grants `role` on `scope` to the app's service principal.
pub async fn assign_role(
    runner: &dyn CommandRunner,
    app_id: &str,
    role: &str,
    scope: &str,
) -> Result<Outcome> {
    create_tolerating_existing(
        runner,
        "az",
        &[
            "role", "assignment", "create",
            "--assignee", app_id,
            "--role", role,
            "--scope", scope,
            "--output", "none",
        ],
    )
    .await
    .map_err(|e| DashopsError::step("role-assignment", role, e))
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::cli::ScriptedRunner;

    #[test]
    fn test_credential_parameters() {
        let cred = FederatedCredential::for_environment("acme/dash.boards", "abcd");
        assert_eq!(cred.name, "acme-dash-boards-abcd");

        let json: serde_json::Value = serde_json::to_value(&cred).unwrap();
        assert_eq!(json["issuer"], GITHUB_ISSUER);
        assert_eq!(json["subject"], "repo:acme/dash.boards:environment:abcd");
        assert_eq!(json["audiences"][0], AZURE_AUDIENCE);
    }

    #[tokio::test]
    async fn test_existing_app_registration_reused() {
        let runner = ScriptedRunner::new().respond("az ad app list", "11111111-2222\n");
        let (app_id, outcome) = ensure_app_registration(&runner, "abcd-github-deploy").await.unwrap();

        assert_eq!(app_id, "11111111-2222");
        assert_eq!(outcome, Outcome::Existing);
        assert!(runner.commands_matching("az ad app create").is_empty());
    }

    #[tokio::test]
    async fn test_app_registration_created() {
        let runner = ScriptedRunner::new()
            .respond("az ad app list", "")
            .respond("az ad app create", "33333333-4444");
        let (app_id, outcome) = ensure_app_registration(&runner, "abcd-github-deploy").await.unwrap();

        assert_eq!(app_id, "33333333-4444");
        assert_eq!(outcome, Outcome::Created);
    }

    #[tokio::test]
    async fn test_federated_credential_updated_when_present() {
        let cred = FederatedCredential::for_environment("acme/dashboards", "abcd");
        let runner = ScriptedRunner::new()
            .respond("az ad app federated-credential list", r#"["acme-dashboards-abcd"]"#);

        let outcome = ensure_federated_credential(&runner, "app-1", &cred).await.unwrap();
        assert_eq!(outcome, Outcome::Updated);
        assert_eq!(runner.commands_matching("az ad app federated-credential update").len(), 1);
        assert!(runner.commands_matching("az ad app federated-credential create").is_empty());
    }

    #[tokio::test]
    async fn test_federated_credential_created_when_absent() {
        let cred = FederatedCredential::for_environment("acme/dashboards", "abcd");
        let runner = ScriptedRunner::new().respond("az ad app federated-credential list", "[]");

        let outcome = ensure_federated_credential(&runner, "app-1", &cred).await.unwrap();
        assert_eq!(outcome, Outcome::Created);

        let creates = runner.commands_matching("az ad app federated-credential create");
        assert_eq!(creates.len(), 1);
        assert!(creates[0].contains("\"subject\":\"repo:acme/dashboards:environment:abcd\""));
    }

    #[tokio::test]
    async fn test_existing_role_assignment_tolerated() {
        let runner = ScriptedRunner::new().fail(
            "az role assignment create",
            "ERROR: (RoleAssignmentExists) The role assignment already exists.",
        );
        let scope = resource_group_scope("sub-1", "abcd-rg");
        let outcome = assign_role(&runner, "app-1", "Contributor", &scope).await.unwrap();

        assert_eq!(outcome, Outcome::Existing);
        assert_eq!(scope, "/subscriptions/sub-1/resourceGroups/abcd-rg");
    }
}
