use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{Json, Response},
    routing::post,
    Router,
};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use tracing::{error, info, warn};

use assignbot_core::{
    choose_assignees, choose_reviewers, choose_version_reviewers, should_skip, Policy,
    SelectionResult, VersionLabelError, VersionTier,
};
use rand::Rng;

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct GitHubWebhookPayload {
    pub action: Option<String>,
    pub pull_request: Option<PullRequest>,
    pub repository: Option<Repository>,
    pub installation: Option<Installation>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub draft: bool,
    pub user: User,
    #[serde(default)]
    pub labels: Vec<Label>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Label {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Repository {
    pub name: String,
    pub full_name: String,
    pub owner: User,
}

#[derive(Debug, Deserialize, Clone)]
pub struct User {
    pub login: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Installation {
    pub id: u64,
}

#[derive(Serialize)]
pub struct WebhookResponse {
    pub message: String,
}

type HmacSha256 = Hmac<Sha256>;

fn verify_github_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    let Some(signature_hex) = signature.strip_prefix("sha256=") else {
        return false;
    };

    let signature_bytes = match hex::decode(signature_hex) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };

    mac.update(payload);

    // Constant-time comparison
    mac.verify_slice(&signature_bytes).is_ok()
}

async fn verify_webhook_signature(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    let signature = parts
        .headers
        .get("x-hub-signature-256")
        .and_then(|h| h.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if !verify_github_signature(&state.webhook_secret, &bytes, signature) {
        error!("Invalid webhook signature");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let new_request = Request::from_parts(parts, axum::body::Body::from(bytes));
    Ok(next.run(new_request).await)
}

/// The `pull_request` actions that trigger reviewer/assignee selection.
fn is_trigger_action(action: &str) -> bool {
    matches!(action, "opened" | "ready_for_review" | "reopened")
}

pub async fn github_webhook_handler(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<WebhookResponse>, StatusCode> {
    let (_parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    let payload: GitHubWebhookPayload =
        serde_json::from_slice(&bytes).map_err(|_| StatusCode::BAD_REQUEST)?;

    match payload.action.as_deref() {
        Some(action) if is_trigger_action(action) => {
            info!("Processing PR event: {}", action);

            let (Some(pr), Some(repo), Some(installation)) =
                (payload.pull_request, payload.repository, payload.installation)
            else {
                warn!("PR event missing pull request, repository, or installation data");
                return Ok(Json(WebhookResponse {
                    message: "Webhook received".to_string(),
                }));
            };

            info!(
                "PR #{} in {}, opened by {}",
                pr.number, repo.full_name, pr.user.login
            );

            let state_clone = state.clone();
            let installation_id = installation.id;

            tokio::spawn(async move {
                if let Err(e) =
                    process_pull_request(state_clone, installation_id, repo, pr).await
                {
                    error!("Failed to process pull request: {:#}", e);
                }
            });
        }
        _ => {
            info!("Ignoring webhook event: {:?}", payload.action);
        }
    }

    Ok(Json(WebhookResponse {
        message: "Webhook received".to_string(),
    }))
}

/// Everything the selection engine decided for one PR event.
///
/// Computed up front, before any API call, so the outcome of each feature
/// path is fixed independently of how the other paths fare. `None` means
/// the path is disabled by policy; the version path additionally records
/// a missing-label error for the orchestrator to log.
#[derive(Debug)]
struct SelectionPlan {
    reviewers: Option<SelectionResult>,
    assignees: Option<Vec<String>>,
    version_reviewers: Option<Result<SelectionResult, VersionLabelError>>,
}

fn plan_selections<R: Rng>(
    rng: &mut R,
    policy: &Policy,
    author: &str,
    labels: &[String],
) -> SelectionPlan {
    let reviewers = policy
        .add_reviewers
        .then(|| choose_reviewers(rng, author, policy));

    let assignees = policy
        .add_assignees
        .then(|| choose_assignees(rng, author, policy));

    let version_reviewers = policy.add_version_policy_reviewers.then(|| {
        VersionTier::from_labels(labels)
            .map(|tier| choose_version_reviewers(rng, author, tier, policy))
    });

    SelectionPlan {
        reviewers,
        assignees,
        version_reviewers,
    }
}

/// Select and submit reviewers, assignees, and version-tier reviewers for
/// one pull request event.
///
/// The three feature paths are independently guarded: a failure in one
/// (selection or API call) is logged and does not stop the others. Only
/// policy loading and group-configuration validation abort the whole event.
async fn process_pull_request(
    state: Arc<AppState>,
    installation_id: u64,
    repo: Repository,
    pr: PullRequest,
) -> anyhow::Result<()> {
    let repo_owner = &repo.owner.login;
    let repo_name = &repo.name;

    let policy = state
        .github_client
        .get_policy(installation_id, repo_owner, repo_name, &state.policy_path)
        .await?;

    if should_skip(&pr.title, &policy.skip_keywords) {
        info!("skips adding reviewers");
        return Ok(());
    }

    if pr.draft {
        info!("ignore draft PR");
        return Ok(());
    }

    policy.validate()?;

    let author = pr.user.login.as_str();
    let labels: Vec<String> = pr.labels.iter().map(|label| label.name.clone()).collect();

    // thread_rng is not Send, so all selection happens before any await
    let plan = {
        let mut rng = rand::thread_rng();
        plan_selections(&mut rng, &policy, author, &labels)
    };

    if let Some(selection) = &plan.reviewers {
        if !selection.is_empty() {
            if let Err(e) = state
                .github_client
                .request_reviewers(installation_id, repo_owner, repo_name, pr.number, selection)
                .await
            {
                error!("Failed to request reviewers for PR #{}: {:#}", pr.number, e);
            }
        }
    }

    if let Some(assignees) = &plan.assignees {
        if !assignees.is_empty() {
            if let Err(e) = state
                .github_client
                .add_assignees(installation_id, repo_owner, repo_name, pr.number, assignees)
                .await
            {
                error!("Failed to add assignees to PR #{}: {:#}", pr.number, e);
            }
        }
    }

    match &plan.version_reviewers {
        Some(Ok(selection)) => {
            if !selection.is_empty() {
                if let Err(e) = state
                    .github_client
                    .request_reviewers(installation_id, repo_owner, repo_name, pr.number, selection)
                    .await
                {
                    error!(
                        "Failed to request version reviewers for PR #{}: {:#}",
                        pr.number, e
                    );
                }
            }
        }
        Some(Err(e)) => {
            error!(
                "Version reviewer selection skipped for PR #{}: {}",
                pr.number, e
            );
        }
        None => {}
    }

    Ok(())
}

pub fn webhook_router(middleware_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/webhook", post(github_webhook_handler))
        .route_layer(middleware::from_fn_with_state(
            middleware_state,
            verify_webhook_signature,
        ))
}
