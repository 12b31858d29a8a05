use anyhow::{Context, Result};
use std::env;

/// Default repository-relative location of the policy file.
pub const DEFAULT_POLICY_PATH: &str = ".github/auto_assign.yml";

#[derive(Clone)]
pub struct Config {
    pub github_app_id: u64,
    pub github_private_key: String,
    pub github_webhook_secret: String,
    pub port: u16,
    /// Repository-relative path of the policy file.
    pub policy_path: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let github_app_id = env::var("GITHUB_APP_ID")
            .context("GITHUB_APP_ID environment variable is required")?
            .parse::<u64>()
            .context("GITHUB_APP_ID must be a valid number")?;

        let github_private_key = env::var("GITHUB_PRIVATE_KEY")
            .context("GITHUB_PRIVATE_KEY environment variable is required")?
            .replace("\\n", "\n");

        let github_webhook_secret = env::var("GITHUB_WEBHOOK_SECRET")
            .context("GITHUB_WEBHOOK_SECRET environment variable is required")?;

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .context("PORT must be a valid number")?;

        let policy_path = parse_policy_path(env::var("POLICY_PATH").ok());

        Ok(Config {
            github_app_id,
            github_private_key,
            github_webhook_secret,
            port,
            policy_path,
        })
    }
}

/// Resolve POLICY_PATH from an optional value, falling back to the default
/// when the variable is missing, empty, or whitespace-only.
pub fn parse_policy_path(value: Option<String>) -> String {
    value
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_POLICY_PATH.to_string())
}
