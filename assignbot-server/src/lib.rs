pub mod config;
pub mod github;
pub mod webhook;

pub use github::GitHubClient;

/// Shared state for the axum handlers.
pub struct AppState {
    pub github_client: GitHubClient,
    pub webhook_secret: String,
    /// Repository-relative path of the policy file, e.g. `.github/auto_assign.yml`.
    pub policy_path: String,
}
