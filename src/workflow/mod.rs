//! End-to-end workflows.
//!
//! [`Orchestrator`] sequences the agent runtime, the tracker and the
//! workspace manager into the `plan`, `apply` and plan-hook runs. Steps
//! within a run are strictly ordered; each run owns its own [`RunLog`]
//! directory and, for `apply`, its own workspace.

mod apply;
mod hook;
mod plan;

pub use apply::{ApplyOptions, ApplyOutcome, APPLY_JOB};
pub use hook::{find_plan_in_transcript, HookInput, PLAN_HOOK_LABEL};
pub use plan::{PlanOptions, PlanOutcome, PLAN_JOB};

use std::path::Path;

use crate::agent::AgentRuntime;
use crate::cancel::CancelToken;
use crate::config::Config;
use crate::error::Result;
use crate::retry::RetryPolicy;
use crate::run_log::RunLog;
use crate::tracker::{repo_ref_from_remote, RepoRef, Tracker};
use crate::workspace::{Git, SystemGit, WorkspaceManager};

/// Runs workflows against one set of collaborators.
pub struct Orchestrator<R, T, G: Git = SystemGit> {
    runtime: R,
    tracker: T,
    git: G,
    workspaces: WorkspaceManager<G>,
    config: Config,
    cancel: CancelToken,
}

impl<R, T, G> Orchestrator<R, T, G>
where
    R: AgentRuntime,
    T: Tracker,
    G: Git + Clone,
{
    pub fn new(runtime: R, tracker: T, git: G, config: Config) -> Self {
        Self {
            runtime,
            tracker,
            workspaces: WorkspaceManager::new(git.clone()),
            git,
            config,
            cancel: CancelToken::never(),
        }
    }

    /// Stops agent runs and retry waits when `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    async fn repo_ref(&self, repo: &Path) -> Result<RepoRef> {
        repo_ref_from_remote(&self.git, repo).await
    }

    /// Policy for `git push`: only transient transport failures are retried.
    fn push_policy(&self) -> RetryPolicy {
        RetryPolicy::from_config(&self.config.retry)
            .with_should_retry(crate::retry::is_transient_failure)
    }
}

/// Logs `error` to the run log before handing it back.
fn log_failure(run_log: &RunLog, error: crate::error::Error) -> crate::error::Error {
    run_log.error(&format!("{} failed: {}", run_log.run_id(), error.user_message()));
    error
}
