//! GitHub Actions secrets store.
//!
//! Repository or environment secrets, managed with the `gh` CLI. Pipeline
//! runs read the client configuration from here, so it is kept in step with
//! the Key Vault record by `dashops sync`.
//!
//! GitHub never returns secret values, so the store is write-only: reads
//! report [`DashopsError::NotSupported`](crate::DashopsError::NotSupported).
//! For the same reason it is never the remote tier; operations build a
//! [`GitHubStore`] for the resolved `GITHUB_REPO` and write mirrors to it.

mod backend;

pub use backend::{validate_github_secret_name, GitHubStore};
