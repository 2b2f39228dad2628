//! `apply`: implement a ticket in a fresh workspace and open a review request.

use std::path::PathBuf;

use serde::Serialize;

use crate::agent::{run_agent, AgentOutcome, AgentRequest, AgentRuntime, PermissionMode};
use crate::config::resolve_model;
use crate::error::{Error, Result};
use crate::extract::{build_default_review_body, extract_review_info};
use crate::prompt::{build_apply_prompt, load_skills};
use crate::retry::with_retry;
use crate::run_id::RunId;
use crate::run_log::{RunLog, EXECUTION_LOG};
use crate::tracker::{parse_ticket_ref, NewReviewRequest, ReviewRequest, Ticket, Tracker};
use crate::workspace::{CleanupOptions, CreateOptions, Git, Workspace};

use super::{log_failure, Orchestrator};

/// Job name of apply runs; also the branch prefix.
pub const APPLY_JOB: &str = "issue-apply";

const APPLY_TOOLS: &[&str] = &[
    "Read", "Write", "Edit", "Bash", "Glob", "Grep", "WebSearch", "WebFetch",
];

/// Inputs of an apply run.
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    pub repo: PathBuf,
    /// Ticket number, `#N` or ticket URL.
    pub issue: String,
    /// Model alias or id; defaults to the configured apply model.
    pub model: Option<String>,
    /// Overrides the configured draft setting.
    pub draft: Option<bool>,
    /// Defaults to the branch checked out in `repo`.
    pub base_branch: Option<String>,
    /// Stop after pushing the branch.
    pub skip_review_request: bool,
    /// Remove the workspace and local branch at the end.
    pub cleanup: bool,
    /// With `cleanup`, also delete the pushed branch.
    pub cleanup_remote: bool,
}

/// Result of an apply run.
#[derive(Debug, Clone, Serialize)]
pub struct ApplyOutcome {
    pub ticket: Ticket,
    pub workspace: Workspace,
    /// `None` when nothing changed or the review request was skipped.
    pub review_request: Option<ReviewRequest>,
    pub run_id: RunId,
    pub log_dir: PathBuf,
    pub changed_files: Vec<String>,
}

impl<R, T, G> Orchestrator<R, T, G>
where
    R: AgentRuntime,
    T: Tracker,
    G: Git + Clone,
{
    /// Runs the apply workflow.
    ///
    /// Steps run strictly in order: fetch ticket, create workspace, run
    /// agent, detect changes, commit, push, open review request, clean up.
    /// When the agent changed nothing the commit, push and review request
    /// steps are skipped. Only cleanup failures are tolerated.
    pub async fn apply(&self, options: ApplyOptions) -> Result<ApplyOutcome> {
        let number = parse_ticket_ref(&options.issue)?;

        let run_id = RunId::generate();
        let run_log = RunLog::create(&self.config.logs_root, APPLY_JOB, &run_id)?;
        run_log.info_with(
            "Starting apply",
            &serde_json::json!({
                "repo": options.repo,
                "issue": number,
                "model": options.model,
                "skip_review_request": options.skip_review_request,
                "cleanup": options.cleanup,
            }),
        );

        self.run_apply(&options, number, &run_log)
            .await
            .map_err(|e| log_failure(&run_log, e))
    }

    async fn run_apply(
        &self,
        options: &ApplyOptions,
        number: u64,
        run_log: &RunLog,
    ) -> Result<ApplyOutcome> {
        let repo_ref = self.repo_ref(&options.repo).await?;

        run_log.info("Fetching issue...");
        let ticket = self.tracker.fetch_ticket(&repo_ref, number).await?;
        run_log.save_json("issue.json", &ticket)?;
        run_log.save_text("issue.yaml", &ticket.to_yaml()?)?;
        run_log.info(&format!("Issue #{}: {}", ticket.number, ticket.title));

        run_log.info("Creating worktree...");
        let workspace = self
            .workspaces
            .create(CreateOptions {
                source_repo: options.repo.clone(),
                run_id: run_log.run_id().clone(),
                job_name: APPLY_JOB.to_string(),
                issue_number: Some(ticket.number),
                base_branch: options.base_branch.clone(),
                workspaces_root: self.config.logs_root.clone(),
            })
            .await?;
        run_log.save_json("worktree.json", &workspace)?;
        run_log.info(&format!("Worktree created at {}", workspace.path.display()));
        run_log.info(&format!("Branch: {}", workspace.branch));

        let skills = load_skills(
            self.config.skills_root.as_deref(),
            true,
            &self.config.optional_skills,
        );
        let prompt = build_apply_prompt(&ticket);
        run_log.save_text("prompt.txt", &prompt)?;
        run_log.save_text("system_prompt_append.txt", &skills)?;

        let model = options
            .model
            .as_deref()
            .map(resolve_model)
            .unwrap_or_else(|| self.config.apply_model_id());
        run_log.info(&format!("Using model: {}", model));

        let mut request = AgentRequest::new(prompt, &workspace.path);
        request.model = Some(model.clone());
        request.permission_mode = PermissionMode::BypassPermissions;
        request.allowed_tools = APPLY_TOOLS.iter().map(|t| t.to_string()).collect();
        request.max_turns = Some(self.config.max_turns);
        request.append_system_prompt = Some(skills).filter(|s| !s.is_empty());

        let run = run_agent(&self.runtime, request, run_log, &self.cancel).await?;
        run_log.info_with("Agent completed", &run.outcome);

        if !run.outcome.success {
            return Err(Error::agent(format!(
                "implementation agent for issue #{} did not succeed: {}",
                ticket.number,
                run.outcome.result_text.trim()
            )));
        }

        let changed_files = self.workspaces.detect_changes(&workspace).await?;
        run_log.info_with(
            &format!("Changed files: {}", changed_files.len()),
            &changed_files,
        );

        let mut review_request = None;
        let mut pushed = false;

        let message = format!(
            "issue-apply: implement #{}\n\n{}",
            ticket.number, ticket.title
        );
        if changed_files.is_empty() {
            run_log.warn("No changes made by agent");
        } else if !self.workspaces.commit(&workspace, &message).await? {
            run_log.warn("Nothing left to commit; skipping push and pull request");
        } else {
            run_log.info("Changes committed");

            with_retry(
                || self.workspaces.push(&workspace),
                &self.push_policy(),
                &self.cancel,
            )
            .await?;
            pushed = true;
            run_log.info(&format!("Pushed to origin/{}", workspace.branch));

            if options.skip_review_request {
                run_log.info("Skipping pull request creation");
            } else {
                let final_message = run.final_message();
                let info = extract_review_info(&final_message);

                let title = info
                    .as_ref()
                    .map(|i| i.title.clone())
                    .unwrap_or_else(|| format!("Implement #{}: {}", ticket.number, ticket.title));
                let base_body = info
                    .map(|i| i.body)
                    .filter(|body| !body.trim().is_empty())
                    .unwrap_or_else(|| build_default_review_body(ticket.number, &final_message));

                let body = compose_review_body(
                    &base_body,
                    &model,
                    &run.outcome,
                    &run_log.read_text("prompt.txt").unwrap_or_default(),
                    &run_log.read_text(EXECUTION_LOG).unwrap_or_default(),
                );

                run_log.info("Creating pull request...");
                let created = self
                    .tracker
                    .create_review_request(
                        &repo_ref,
                        &NewReviewRequest {
                            title,
                            body,
                            head: workspace.branch.clone(),
                            base: workspace.base_branch.clone(),
                            draft: options.draft.unwrap_or(self.config.draft),
                        },
                    )
                    .await?;
                run_log.save_json("pr.json", &created)?;
                run_log.info(&format!("Created PR #{}: {}", created.number, created.url));
                review_request = Some(created);
            }
        }

        if options.cleanup {
            run_log.info("Cleaning up worktree and branches...");
            let cleanup = self
                .workspaces
                .cleanup(CleanupOptions {
                    workspace: &workspace,
                    delete_remote: options.cleanup_remote && pushed,
                })
                .await;
            match cleanup {
                Ok(()) => run_log.info("Cleanup completed"),
                Err(e) => run_log.warn(&format!("Cleanup failed: {}", e)),
            }
        }

        let outcome = ApplyOutcome {
            ticket,
            workspace,
            review_request,
            run_id: run_log.run_id().clone(),
            log_dir: run_log.dir().to_path_buf(),
            changed_files,
        };
        run_log.save_json("result.json", &outcome)?;
        run_log.info_with(
            "apply completed",
            &serde_json::json!({
                "issue": outcome.ticket.number,
                "pr": outcome.review_request.as_ref().map(|pr| pr.number),
                "changed_files": outcome.changed_files.len(),
            }),
        );
        Ok(outcome)
    }
}

/// Appends the agent statistics table and collapsible prompt and execution
/// log sections to a review body.
pub(crate) fn compose_review_body(
    base: &str,
    model: &str,
    outcome: &AgentOutcome,
    prompt: &str,
    execution_log: &str,
) -> String {
    let mut body = String::from(base.trim_end());
    body.push('\n');

    body.push_str("\n---\n\n## Agent Statistics\n\n");
    body.push_str("| Item | Value |\n|------|-------|\n");
    body.push_str(&format!("| Model | {} |\n", model));
    body.push_str(&format!("| Turns | {} |\n", outcome.num_turns));
    body.push_str(&format!("| Cost | ${:.4} |\n", outcome.cost_usd));
    body.push_str(&format!(
        "| Duration | {:.1}s |\n",
        outcome.duration_ms as f64 / 1000.0
    ));

    body.push_str(&details("Prompt", prompt));
    body.push_str(&details("Execution Log", execution_log));
    body
}

fn details(summary: &str, content: &str) -> String {
    let fence = fence_for(content);
    format!(
        "\n<details>\n<summary>{}</summary>\n\n{}\n{}\n{}\n\n</details>\n",
        summary,
        fence,
        content.trim_end(),
        fence
    )
}

/// A backtick fence longer than any backtick run inside `content`.
fn fence_for(content: &str) -> String {
    let longest = content
        .split(|c| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0);
    "`".repeat(longest.max(2) + 1)
}
