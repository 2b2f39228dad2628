//! Remote issue tracker seam.
//!
//! Workflows talk to the tracker only through [`Tracker`]; [`GitHubTracker`]
//! is the production implementation.

mod github;
mod refs;

pub use github::{resolve_token, token_from_env, GitHubTracker, DEFAULT_API_URL};
pub use refs::{parse_remote_url, parse_ticket_ref, repo_ref_from_remote, RepoRef};

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A tracked issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub url: String,
    pub labels: Vec<String>,
    pub assignees: Vec<String>,
    pub milestone: Option<String>,
    pub state: String,
}

impl Ticket {
    /// Renders the ticket as a YAML document, as snapshotted in `issue.yaml`.
    pub fn to_yaml(&self) -> Result<String> {
        #[derive(Serialize)]
        struct Doc<'a> {
            title: &'a str,
            number: u64,
            url: &'a str,
            state: &'a str,
            body: &'a str,
            labels: &'a [String],
            assignees: &'a [String],
            #[serde(skip_serializing_if = "Option::is_none")]
            milestone: Option<&'a str>,
        }

        serde_yaml::to_string(&Doc {
            title: &self.title,
            number: self.number,
            url: &self.url,
            state: &self.state,
            body: &self.body,
            labels: &self.labels,
            assignees: &self.assignees,
            milestone: self.milestone.as_deref(),
        })
        .map_err(|e| {
            Error::parse_with(
                format!("failed to render issue #{} as YAML", self.number),
                e,
            )
        })
    }
}

/// Fields for a new ticket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTicket {
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub assignees: Vec<String>,
    /// Milestone number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone: Option<u64>,
}

/// A created review request (pull request).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub number: u64,
    pub url: String,
    pub title: String,
}

/// Fields for a new review request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReviewRequest {
    pub title: String,
    pub body: String,
    /// Branch holding the changes.
    pub head: String,
    /// Branch the changes target.
    pub base: String,
    pub draft: bool,
}

/// Operations the workflows need from a tracker.
#[async_trait]
pub trait Tracker: Send + Sync {
    async fn fetch_ticket(&self, repo: &RepoRef, number: u64) -> Result<Ticket>;

    async fn create_ticket(&self, repo: &RepoRef, ticket: &NewTicket) -> Result<Ticket>;

    async fn create_review_request(
        &self,
        repo: &RepoRef,
        request: &NewReviewRequest,
    ) -> Result<ReviewRequest>;
}

#[async_trait]
impl<T: Tracker + ?Sized> Tracker for Arc<T> {
    async fn fetch_ticket(&self, repo: &RepoRef, number: u64) -> Result<Ticket> {
        (**self).fetch_ticket(repo, number).await
    }

    async fn create_ticket(&self, repo: &RepoRef, ticket: &NewTicket) -> Result<Ticket> {
        (**self).create_ticket(repo, ticket).await
    }

    async fn create_review_request(
        &self,
        repo: &RepoRef,
        request: &NewReviewRequest,
    ) -> Result<ReviewRequest> {
        (**self).create_review_request(repo, request).await
    }
}
