//! GitHub REST implementation of [`Tracker`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::retry::{with_retry, RetryPolicy};

use super::{NewReviewRequest, NewTicket, RepoRef, ReviewRequest, Ticket, Tracker};

/// Public GitHub API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Characters of an error response body kept in the error message.
const ERROR_BODY_LIMIT: usize = 200;

/// Tracker backed by the GitHub REST API.
///
/// Every call is retried according to the configured policy.
pub struct GitHubTracker {
    http: Client,
    api_url: String,
    token: String,
    policy: RetryPolicy,
    cancel: CancelToken,
}

impl GitHubTracker {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("issue-flow/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::config("failed to create HTTP client").with_source(e))?;

        Ok(Self {
            http,
            api_url: DEFAULT_API_URL.to_string(),
            token: token.into(),
            policy: RetryPolicy::default().with_max_attempts(3),
            cancel: CancelToken::never(),
        })
    }

    /// Targets a different API root (GitHub Enterprise, tests).
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Stops retry waits when `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.api_url, path))
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    /// Sends one request and decodes a JSON response.
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T> {
        let response = request.send().await.map_err(|e| transport_error(what, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(what, status, &body));
        }

        response
            .json()
            .await
            .map_err(|e| {
                Error::tracker(format!("failed to decode response to {}", what), None, None)
                    .with_source(e)
            })
    }

    async fn fetch_once(&self, repo: &RepoRef, number: u64) -> Result<Ticket> {
        let path = format!("/repos/{}/{}/issues/{}", repo.owner, repo.name, number);
        let issue: IssueResponse = self
            .send(self.request(Method::GET, &path), &format!("fetch issue #{}", number))
            .await?;
        Ok(issue.into())
    }

    async fn create_ticket_once(&self, repo: &RepoRef, ticket: &NewTicket) -> Result<Ticket> {
        let path = format!("/repos/{}/{}/issues", repo.owner, repo.name);
        let issue: IssueResponse = self
            .send(self.request(Method::POST, &path).json(ticket), "create issue")
            .await?;
        Ok(issue.into())
    }

    async fn create_pull_once(
        &self,
        repo: &RepoRef,
        request: &NewReviewRequest,
    ) -> Result<ReviewRequest> {
        let path = format!("/repos/{}/{}/pulls", repo.owner, repo.name);
        let pull: PullResponse = self
            .send(self.request(Method::POST, &path).json(request), "create pull request")
            .await?;
        Ok(ReviewRequest {
            number: pull.number,
            url: pull.html_url,
            title: pull.title,
        })
    }
}

#[async_trait]
impl Tracker for GitHubTracker {
    async fn fetch_ticket(&self, repo: &RepoRef, number: u64) -> Result<Ticket> {
        tracing::debug!(repo = %repo, number, "fetching issue");
        with_retry(
            || self.fetch_once(repo, number),
            &self.policy,
            &self.cancel,
        )
        .await
    }

    async fn create_ticket(&self, repo: &RepoRef, ticket: &NewTicket) -> Result<Ticket> {
        tracing::debug!(repo = %repo, title = %ticket.title, "creating issue");
        with_retry(
            || self.create_ticket_once(repo, ticket),
            &self.policy,
            &self.cancel,
        )
        .await
    }

    async fn create_review_request(
        &self,
        repo: &RepoRef,
        request: &NewReviewRequest,
    ) -> Result<ReviewRequest> {
        tracing::debug!(
            repo = %repo,
            head = %request.head,
            base = %request.base,
            "creating pull request"
        );
        with_retry(
            || self.create_pull_once(repo, request),
            &self.policy,
            &self.cancel,
        )
        .await
    }
}

/// Maps a non-2xx response to a tracker error.
///
/// 403/429 become rate limits; 502/503 are marked retryable.
fn status_error(what: &str, status: StatusCode, body: &str) -> Error {
    let excerpt: String = body.chars().take(ERROR_BODY_LIMIT).collect();
    let code = status.as_u16();
    let retryable = matches!(code, 502 | 503);
    Error::tracker(
        format!("failed to {}: GitHub API returned {}: {}", what, status, excerpt),
        Some(code),
        Some(retryable),
    )
}

fn transport_error(what: &str, e: reqwest::Error) -> Error {
    let transient = e.is_timeout() || e.is_connect();
    Error::tracker(
        format!("failed to {}: request error", what),
        e.status().map(|s| s.as_u16()),
        Some(transient),
    )
    .with_source(e)
}

#[derive(Debug, Deserialize)]
struct IssueResponse {
    number: u64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    html_url: String,
    #[serde(default)]
    labels: Vec<LabelResponse>,
    #[serde(default)]
    assignees: Vec<UserResponse>,
    #[serde(default)]
    milestone: Option<MilestoneResponse>,
    state: String,
}

/// Labels come back either as objects or, rarely, plain strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LabelResponse {
    Named { name: String },
    Plain(String),
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    login: String,
}

#[derive(Debug, Deserialize)]
struct MilestoneResponse {
    title: String,
}

#[derive(Debug, Deserialize, Serialize)]
struct PullResponse {
    number: u64,
    html_url: String,
    title: String,
}

impl From<IssueResponse> for Ticket {
    fn from(issue: IssueResponse) -> Self {
        Ticket {
            number: issue.number,
            title: issue.title,
            body: issue.body.unwrap_or_default(),
            url: issue.html_url,
            labels: issue
                .labels
                .into_iter()
                .map(|l| match l {
                    LabelResponse::Named { name } | LabelResponse::Plain(name) => name,
                })
                .collect(),
            assignees: issue.assignees.into_iter().map(|a| a.login).collect(),
            milestone: issue.milestone.map(|m| m.title),
            state: issue.state,
        }
    }
}

/// Picks a token from `GH_TOKEN` or `GITHUB_TOKEN`, ignoring blank values.
pub fn token_from_env<F>(lookup: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    ["GH_TOKEN", "GITHUB_TOKEN"]
        .iter()
        .filter_map(|key| lookup(key))
        .map(|token| token.trim().to_string())
        .find(|token| !token.is_empty())
}

/// Resolves a GitHub token from the environment, then `gh auth token`.
pub async fn resolve_token() -> Result<String> {
    if let Some(token) = token_from_env(|key| std::env::var(key).ok()) {
        return Ok(token);
    }

    let missing = || {
        Error::config_with_suggestion(
            "GitHub token not found",
            "Run `gh auth login` or set the GH_TOKEN environment variable",
        )
    };

    let output = Command::new("gh")
        .args(["auth", "token"])
        .stdin(std::process::Stdio::null())
        .output()
        .await
        .map_err(|e| missing().with_source(e))?;

    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if !output.status.success() || token.is_empty() {
        return Err(missing());
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn rate_limit_statuses_are_retryable() {
        for code in [403, 429] {
            let err = status_error(
                "create issue",
                StatusCode::from_u16(code).unwrap(),
                "slow down",
            );
            assert_eq!(err.kind(), ErrorKind::TrackerRateLimit);
            assert!(err.is_retryable());
            assert_eq!(err.status_code(), Some(code));
        }
    }

    #[test]
    fn gateway_errors_are_retryable_api_errors() {
        for code in [502, 503] {
            let err = status_error("fetch issue #1", StatusCode::from_u16(code).unwrap(), "");
            assert_eq!(err.kind(), ErrorKind::TrackerApi);
            assert!(err.is_retryable());
        }
    }

    #[test]
    fn other_statuses_are_fatal_and_quote_the_body() {
        let body = format!("{{\"message\":\"Not Found\"}}{}", "x".repeat(500));
        let err = status_error("fetch issue #9", StatusCode::NOT_FOUND, &body);

        assert_eq!(err.kind(), ErrorKind::TrackerApi);
        assert!(!err.is_retryable());
        let message = err.to_string();
        assert!(message.contains("Not Found"));
        assert!(!message.contains(&"x".repeat(ERROR_BODY_LIMIT)));
    }

    #[test]
    fn issue_response_maps_to_ticket() {
        let json = serde_json::json!({
            "number": 42,
            "title": "Add cache",
            "body": null,
            "html_url": "https://github.com/o/r/issues/42",
            "labels": [{ "name": "enhancement", "color": "fff" }, "plain"],
            "assignees": [{ "login": "octocat" }],
            "milestone": { "title": "v1", "number": 1 },
            "state": "open"
        });
        let ticket: Ticket = serde_json::from_value::<IssueResponse>(json).unwrap().into();

        assert_eq!(ticket.number, 42);
        assert_eq!(ticket.body, "");
        assert_eq!(ticket.labels, vec!["enhancement", "plain"]);
        assert_eq!(ticket.assignees, vec!["octocat"]);
        assert_eq!(ticket.milestone.as_deref(), Some("v1"));
    }

    #[test]
    fn env_token_prefers_gh_token_and_skips_blank() {
        let lookup = |key: &str| match key {
            "GH_TOKEN" => Some("  ".to_string()),
            "GITHUB_TOKEN" => Some("ghp_fallback".to_string()),
            _ => None,
        };
        assert_eq!(token_from_env(lookup).as_deref(), Some("ghp_fallback"));

        let both = |key: &str| Some(format!("{}-value", key));
        assert_eq!(token_from_env(both).as_deref(), Some("GH_TOKEN-value"));

        assert_eq!(token_from_env(|_| None), None);
    }

    #[tokio::test]
    async fn unreachable_api_is_a_transient_tracker_error() {
        let tracker = GitHubTracker::new("token")
            .unwrap()
            .with_api_url("http://127.0.0.1:9")
            .with_retry_policy(RetryPolicy::default().with_max_attempts(1));
        let repo = RepoRef {
            owner: "o".to_string(),
            name: "r".to_string(),
        };

        let err = tracker.fetch_ticket(&repo, 1).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::TrackerApi);
        assert!(err.is_retryable());
    }
}
