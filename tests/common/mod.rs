//! Shared fixtures for workflow tests: temp git repositories and in-memory
//! agent and tracker fakes.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::mpsc;

use issue_flow::{
    AgentMessage, AgentOutcome, AgentRequest, AgentRuntime, CancelToken, Config, NewReviewRequest,
    NewTicket, RepoRef, Result, RetryPolicyConfig, ReviewRequest, Ticket, Tracker,
};

/// Remote URL the tracker sees; pushes go to a local bare repository.
pub const REMOTE_URL: &str = "https://github.com/acme/widgets.git";

/// Source repository with an initial commit on `main` and an `origin`
/// whose fetch URL names GitHub and whose push URL is a local bare repo.
pub struct TestRepo {
    pub dir: TempDir,
    pub origin: TempDir,
}

impl TestRepo {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let origin = TempDir::new().expect("failed to create origin dir");

        git(origin.path(), &["init", "--bare"]);

        git(dir.path(), &["init"]);
        git(dir.path(), &["symbolic-ref", "HEAD", "refs/heads/main"]);
        git(dir.path(), &["config", "user.email", "test@test.com"]);
        git(dir.path(), &["config", "user.name", "Test User"]);
        git(dir.path(), &["config", "commit.gpgsign", "false"]);
        std::fs::write(dir.path().join("README.md"), "# Test\n").expect("failed to create readme");
        std::fs::write(dir.path().join(".gitignore"), "logs/\n")
            .expect("failed to create gitignore");
        git(dir.path(), &["add", "."]);
        git(dir.path(), &["commit", "-m", "initial"]);

        git(dir.path(), &["remote", "add", "origin", REMOTE_URL]);
        let push_url = origin.path().to_string_lossy().into_owned();
        git(dir.path(), &["config", "remote.origin.pushurl", &push_url]);
        git(dir.path(), &["push", "origin", "main"]);

        Self { dir, origin }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn logs_root(&self) -> PathBuf {
        self.path().join("logs")
    }

    /// Config writing logs and worktrees under the repository, with
    /// millisecond retry delays.
    pub fn config(&self) -> Config {
        Config {
            logs_root: self.logs_root(),
            retry: RetryPolicyConfig {
                max_attempts: 3,
                initial_delay_ms: 1,
                max_delay_ms: 5,
                backoff_multiplier: 2.0,
            },
            ..Config::default()
        }
    }

    /// Branches present on the bare origin.
    pub fn remote_branches(&self) -> Vec<String> {
        git(self.origin.path(), &["branch", "--format=%(refname:short)"])
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn local_branches(&self) -> Vec<String> {
        git(self.path(), &["branch", "--format=%(refname:short)"])
            .lines()
            .map(str::to_string)
            .collect()
    }
}

/// Runs git and returns stdout, panicking on failure.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

pub fn ticket(number: u64, title: &str) -> Ticket {
    Ticket {
        number,
        title: title.to_string(),
        body: "## Acceptance criteria\n- [ ] it works".to_string(),
        url: format!("https://github.com/acme/widgets/issues/{}", number),
        labels: vec!["enhancement".to_string()],
        assignees: vec![],
        milestone: None,
        state: "open".to_string(),
    }
}

/// Agent that writes fixed files into its working directory and answers
/// with a fixed final message.
pub struct FakeAgent {
    pub files: Vec<(String, String)>,
    pub final_text: String,
    pub success: bool,
    pub requests: Mutex<Vec<AgentRequest>>,
}

impl FakeAgent {
    pub fn new(final_text: impl Into<String>) -> Self {
        Self {
            files: Vec::new(),
            final_text: final_text.into(),
            success: true,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn writing(mut self, path: &str, content: &str) -> Self {
        self.files.push((path.to_string(), content.to_string()));
        self
    }

    pub fn failing(mut self) -> Self {
        self.success = false;
        self
    }

    pub fn last_request(&self) -> AgentRequest {
        self.requests
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("agent was never called")
    }
}

#[async_trait]
impl AgentRuntime for FakeAgent {
    async fn spawn(
        &self,
        request: AgentRequest,
        output_tx: mpsc::Sender<AgentMessage>,
        _cancel: CancelToken,
    ) -> Result<()> {
        for (path, content) in &self.files {
            let target = request.working_dir.join(path);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).expect("failed to create parent dir");
            }
            std::fs::write(target, content).expect("failed to write agent file");
        }
        self.requests.lock().unwrap().push(request);

        let _ = output_tx
            .send(AgentMessage::assistant_text(self.final_text.clone()))
            .await;
        let _ = output_tx
            .send(AgentMessage::result(AgentOutcome {
                success: self.success,
                result_text: if self.success { "done" } else { "error_max_turns" }.to_string(),
                num_turns: 7,
                cost_usd: 0.0421,
                duration_ms: 12_300,
            }))
            .await;
        Ok(())
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// Tracker that serves one ticket and records every write.
pub struct FakeTracker {
    pub ticket: Ticket,
    pub repos: Mutex<Vec<RepoRef>>,
    pub created_tickets: Mutex<Vec<NewTicket>>,
    pub review_requests: Mutex<Vec<NewReviewRequest>>,
    next_number: AtomicU64,
}

impl FakeTracker {
    pub fn new(ticket: Ticket) -> Self {
        Self {
            ticket,
            repos: Mutex::new(Vec::new()),
            created_tickets: Mutex::new(Vec::new()),
            review_requests: Mutex::new(Vec::new()),
            next_number: AtomicU64::new(100),
        }
    }

    pub fn created_tickets(&self) -> Vec<NewTicket> {
        self.created_tickets.lock().unwrap().clone()
    }

    pub fn review_requests(&self) -> Vec<NewReviewRequest> {
        self.review_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Tracker for FakeTracker {
    async fn fetch_ticket(&self, repo: &RepoRef, number: u64) -> Result<Ticket> {
        self.repos.lock().unwrap().push(repo.clone());
        let mut ticket = self.ticket.clone();
        ticket.number = number;
        Ok(ticket)
    }

    async fn create_ticket(&self, repo: &RepoRef, ticket: &NewTicket) -> Result<Ticket> {
        self.repos.lock().unwrap().push(repo.clone());
        self.created_tickets.lock().unwrap().push(ticket.clone());
        let number = self.next_number.fetch_add(1, Ordering::SeqCst);
        Ok(Ticket {
            number,
            title: ticket.title.clone(),
            body: ticket.body.clone(),
            url: format!("https://github.com/{}/issues/{}", repo, number),
            labels: ticket.labels.clone(),
            assignees: ticket.assignees.clone(),
            milestone: None,
            state: "open".to_string(),
        })
    }

    async fn create_review_request(
        &self,
        repo: &RepoRef,
        request: &NewReviewRequest,
    ) -> Result<ReviewRequest> {
        self.repos.lock().unwrap().push(repo.clone());
        self.review_requests.lock().unwrap().push(request.clone());
        let number = self.next_number.fetch_add(1, Ordering::SeqCst);
        Ok(ReviewRequest {
            number,
            url: format!("https://github.com/{}/pull/{}", repo, number),
            title: request.title.clone(),
        })
    }
}
