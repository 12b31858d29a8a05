use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;
use tracing::{error, info};

use assignbot_core::{Policy, SelectionResult};

/// GitHub App REST client: app JWT auth, per-installation token cache, and
/// the three calls the bot needs (policy file fetch, review request,
/// assignee addition).
#[derive(Clone)]
pub struct GitHubClient {
    client: Client,
    app_id: u64,
    private_key: String,
    token_cache: Arc<RwLock<HashMap<u64, (String, SystemTime)>>>,
}

#[derive(Debug, Serialize)]
struct GitHubAppClaims {
    iss: u64,
    iat: u64,
    exp: u64,
}

#[derive(Debug, Deserialize)]
struct InstallationTokenResponse {
    token: String,
    expires_at: String,
}

#[derive(Debug, Deserialize)]
struct FileContentsResponse {
    content: String,
}

#[derive(Debug, Serialize)]
struct RequestReviewersBody<'a> {
    reviewers: &'a [String],
    team_reviewers: &'a [String],
}

#[derive(Debug, Serialize)]
struct AddAssigneesBody<'a> {
    assignees: &'a [String],
}

/// Strip embedded newlines and decode the base64 blob the contents API
/// returns for file bodies.
fn decode_contents(content: &str) -> Result<String> {
    let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = general_purpose::STANDARD
        .decode(compact)
        .context("Failed to decode base64 file content")?;
    String::from_utf8(bytes).context("Policy file is not valid UTF-8")
}

impl GitHubClient {
    pub fn new(app_id: u64, private_key: String) -> Self {
        let client = Client::builder()
            .user_agent("assignbot")
            .build()
            .expect("Failed to construct HTTP client");

        Self {
            client,
            app_id,
            private_key,
            token_cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn generate_jwt(&self) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .context("Failed to get current time")?
            .as_secs();

        let claims = GitHubAppClaims {
            iss: self.app_id,
            iat: now - 60,  // Issued 60 seconds ago to account for clock skew
            exp: now + 600, // Expires in 10 minutes
        };

        let header = Header::new(Algorithm::RS256);
        let encoding_key = EncodingKey::from_rsa_pem(self.private_key.as_bytes())
            .context("Failed to parse private key")?;

        encode(&header, &claims, &encoding_key).context("Failed to encode JWT")
    }

    async fn get_installation_token(&self, installation_id: u64) -> Result<String> {
        // Reuse a cached token while it has more than 5 minutes left
        {
            let cache = self.token_cache.read().await;
            if let Some((token, expires_at)) = cache.get(&installation_id) {
                if expires_at
                    .duration_since(SystemTime::now())
                    .unwrap_or_default()
                    .as_secs()
                    > 300
                {
                    return Ok(token.clone());
                }
            }
        }

        let jwt = self.generate_jwt()?;
        let url = format!(
            "https://api.github.com/app/installations/{}/access_tokens",
            installation_id
        );

        info!("Requesting new installation access token");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", jwt))
            .header("Accept", "application/vnd.github.v3+json")
            .send()
            .await
            .context("Failed to send installation token request")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .context("Failed to read error response body")?;
            error!(
                "GitHub App token request failed: {} - {}",
                status, error_text
            );
            return Err(anyhow!(
                "GitHub App token request failed: {} - {}",
                status,
                error_text
            ));
        }

        let token_response: InstallationTokenResponse = response
            .json()
            .await
            .context("Failed to parse installation token response")?;

        let expires_at = chrono::DateTime::parse_from_rfc3339(&token_response.expires_at)
            .context("Failed to parse token expiration")?
            .with_timezone(&Utc);

        let expires_at_system =
            UNIX_EPOCH + std::time::Duration::from_secs(expires_at.timestamp() as u64);

        {
            let mut cache = self.token_cache.write().await;
            cache.insert(
                installation_id,
                (token_response.token.clone(), expires_at_system),
            );
        }

        Ok(token_response.token)
    }

    /// Fetch and parse the policy file from the repository's default branch.
    ///
    /// A missing or unreadable file is reported as "the configuration file
    /// failed to load"; the caller treats that as fatal for the event.
    pub async fn get_policy(
        &self,
        installation_id: u64,
        repo_owner: &str,
        repo_name: &str,
        policy_path: &str,
    ) -> Result<Policy> {
        let token = self.get_installation_token(installation_id).await?;
        let url = format!(
            "https://api.github.com/repos/{}/{}/contents/{}",
            repo_owner, repo_name, policy_path
        );

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", token))
            .header("Accept", "application/vnd.github.v3+json")
            .send()
            .await
            .context("Failed to send policy file request")?;

        if !response.status().is_success() {
            let status = response.status();
            error!(
                "Policy file request for {}/{}:{} failed: {}",
                repo_owner, repo_name, policy_path, status
            );
            return Err(anyhow!("the configuration file failed to load"));
        }

        let contents: FileContentsResponse = response
            .json()
            .await
            .context("Failed to parse contents response")?;

        let yaml = decode_contents(&contents.content)?;
        serde_yaml::from_str(&yaml).context("the configuration file failed to load")
    }

    /// Request reviews from the selected users and teams.
    pub async fn request_reviewers(
        &self,
        installation_id: u64,
        repo_owner: &str,
        repo_name: &str,
        pr_number: u64,
        selection: &SelectionResult,
    ) -> Result<()> {
        let token = self.get_installation_token(installation_id).await?;
        let url = format!(
            "https://api.github.com/repos/{}/{}/pulls/{}/requested_reviewers",
            repo_owner, repo_name, pr_number
        );

        let body = RequestReviewersBody {
            reviewers: &selection.reviewers,
            team_reviewers: &selection.team_reviewers,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", token))
            .header("Accept", "application/vnd.github.v3+json")
            .json(&body)
            .send()
            .await
            .context("Failed to send review request")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .context("Failed to read error response body")?;
            return Err(anyhow!(
                "Review request failed: {} - {}",
                status,
                error_text
            ));
        }

        info!(
            "Requested reviews on PR #{}: {} user(s), {} team(s)",
            pr_number,
            selection.reviewers.len(),
            selection.team_reviewers.len()
        );
        Ok(())
    }

    /// Add the selected assignees to the pull request.
    pub async fn add_assignees(
        &self,
        installation_id: u64,
        repo_owner: &str,
        repo_name: &str,
        pr_number: u64,
        assignees: &[String],
    ) -> Result<()> {
        let token = self.get_installation_token(installation_id).await?;
        let url = format!(
            "https://api.github.com/repos/{}/{}/issues/{}/assignees",
            repo_owner, repo_name, pr_number
        );

        let body = AddAssigneesBody { assignees };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", token))
            .header("Accept", "application/vnd.github.v3+json")
            .json(&body)
            .send()
            .await
            .context("Failed to send assignee request")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .context("Failed to read error response body")?;
            return Err(anyhow!(
                "Assignee request failed: {} - {}",
                status,
                error_text
            ));
        }

        info!(
            "Added {} assignee(s) to PR #{}",
            assignees.len(),
            pr_number
        );
        Ok(())
    }
}
