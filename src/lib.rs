//! issue-flow - agent-driven "plan, implement, review" loop over GitHub
//!
//! This library turns a natural-language request into tracker tickets and
//! implements a ticket in a disposable git worktree, opening a pull request
//! with the result. The agent and the tracker are unreliable collaborators:
//! calls into them are retried with capped backoff, their failures are
//! normalized into one error taxonomy, and their free-form output is mined
//! for structured records with deterministic fallbacks.

pub mod agent;
pub mod backoff;
pub mod cancel;
pub mod config;
pub mod error;
pub mod extract;
pub mod prompt;
pub mod retry;
pub mod run_id;
pub mod run_log;
pub mod tracker;
pub mod workflow;
pub mod workspace;

pub use error::{Error, ErrorKind, Result};

pub use agent::{
    run_agent, AgentMessage, AgentOutcome, AgentRequest, AgentRun, AgentRuntime, ClaudeCli,
    PermissionMode,
};
pub use cancel::CancelToken;
pub use config::{resolve_model, Config, Validate, ValidationResult};
pub use extract::{
    build_default_review_body, extract_plan, extract_review_info, extract_ticket_drafts,
    ExtractedPlan, ReviewInfo, TicketDraft,
};
pub use retry::{default_should_retry, with_retry, RetryPolicy, RetryPolicyConfig};
pub use run_id::RunId;
pub use run_log::RunLog;
pub use tracker::{
    GitHubTracker, NewReviewRequest, NewTicket, RepoRef, ReviewRequest, Ticket, Tracker,
};
pub use workflow::{
    ApplyOptions, ApplyOutcome, HookInput, Orchestrator, PlanOptions, PlanOutcome,
};
pub use workspace::{
    branch_name, CleanupOptions, CreateOptions, Git, SystemGit, Workspace, WorkspaceManager,
    WorktreeEntry,
};
