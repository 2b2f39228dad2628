//! `plan`: turn a request into tracker tickets.

use std::path::PathBuf;

use serde::Serialize;

use crate::agent::{run_agent, AgentRequest, AgentRuntime, PermissionMode};
use crate::config::resolve_model;
use crate::error::{Error, Result};
use crate::extract::{extract_ticket_drafts, TicketDraft};
use crate::prompt::build_plan_prompt;
use crate::run_id::RunId;
use crate::run_log::RunLog;
use crate::tracker::{NewTicket, Ticket, Tracker};
use crate::workspace::Git;

use super::{log_failure, Orchestrator};

/// Job name of plan runs.
pub const PLAN_JOB: &str = "plan-issue";

/// Read-only tools: the plan agent investigates but never edits.
const PLAN_TOOLS: &[&str] = &["Read", "Glob", "Grep", "WebSearch", "WebFetch"];

/// Inputs of a plan run.
#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    pub repo: PathBuf,
    /// Request text. Ignored when `request_file` is set.
    pub request: Option<String>,
    pub request_file: Option<PathBuf>,
    /// Extra context appended to the prompt.
    pub context: Option<String>,
    /// Model alias or id; defaults to the configured plan model.
    pub model: Option<String>,
    /// Extract drafts without creating tickets.
    pub dry_run: bool,
}

impl PlanOptions {
    /// Resolves the request text from the file or the inline value.
    pub fn resolve_request(&self) -> Result<String> {
        let request = match (&self.request_file, &self.request) {
            (Some(path), _) => std::fs::read_to_string(path).map_err(|e| {
                Error::config_with_suggestion(
                    format!("failed to read request file {}", path.display()),
                    "Check the path passed to --request-file",
                )
                .with_source(e)
            })?,
            (None, Some(request)) => request.clone(),
            (None, None) => String::new(),
        };

        if request.trim().is_empty() {
            return Err(Error::config_with_suggestion(
                "no request text supplied",
                "Pass --request <text> or --request-file <path>",
            ));
        }
        Ok(request)
    }
}

/// Result of a plan run.
#[derive(Debug, Clone, Serialize)]
pub struct PlanOutcome {
    /// Created tickets in draft order; empty on a dry run.
    pub tickets: Vec<Ticket>,
    pub drafts: Vec<TicketDraft>,
    pub run_id: RunId,
    pub log_dir: PathBuf,
}

impl<R, T, G> Orchestrator<R, T, G>
where
    R: AgentRuntime,
    T: Tracker,
    G: Git + Clone,
{
    /// Runs the plan workflow.
    ///
    /// Fails with a configuration error when no request is supplied, an
    /// agent-execution error when the agent does not succeed and a parse
    /// error when its final message holds no ticket drafts. Tickets are
    /// created one at a time in draft order; the first failure stops the run.
    pub async fn plan(&self, options: PlanOptions) -> Result<PlanOutcome> {
        let request = options.resolve_request()?;

        let run_id = RunId::generate();
        let run_log = RunLog::create(&self.config.logs_root, PLAN_JOB, &run_id)?;
        run_log.info_with(
            "Starting plan",
            &serde_json::json!({
                "repo": options.repo,
                "model": options.model,
                "dry_run": options.dry_run,
            }),
        );

        self.run_plan(&options, &request, &run_log)
            .await
            .map_err(|e| log_failure(&run_log, e))
    }

    async fn run_plan(
        &self,
        options: &PlanOptions,
        request: &str,
        run_log: &RunLog,
    ) -> Result<PlanOutcome> {
        let repo_ref = if options.dry_run {
            None
        } else {
            Some(self.repo_ref(&options.repo).await?)
        };

        let prompt = build_plan_prompt(request, options.context.as_deref());
        run_log.save_text("prompt.txt", &prompt)?;

        let model = options
            .model
            .as_deref()
            .map(resolve_model)
            .unwrap_or_else(|| self.config.plan_model_id());
        run_log.info(&format!("Using model: {}", model));

        let mut agent_request = AgentRequest::new(prompt, &options.repo);
        agent_request.model = Some(model);
        agent_request.permission_mode = PermissionMode::Plan;
        agent_request.allowed_tools = PLAN_TOOLS.iter().map(|t| t.to_string()).collect();
        agent_request.max_turns = Some(self.config.max_turns);

        let run = run_agent(&self.runtime, agent_request, run_log, &self.cancel).await?;
        run_log.info_with("Agent completed", &run.outcome);

        if !run.outcome.success {
            return Err(Error::agent(format!(
                "plan agent did not succeed: {}",
                run.outcome.result_text.trim()
            )));
        }

        let final_message = run.final_message();
        run_log.save_text("final_message.txt", &final_message)?;

        let drafts = extract_ticket_drafts(&final_message);
        if drafts.is_empty() {
            return Err(Error::parse(
                "no ticket drafts found in the agent's final message",
            ));
        }
        run_log.save_json("drafts.json", &drafts)?;
        run_log.info(&format!("Found {} ticket draft(s)", drafts.len()));

        let mut tickets = Vec::new();
        if let Some(repo_ref) = repo_ref {
            for draft in &drafts {
                let ticket = self
                    .tracker
                    .create_ticket(
                        &repo_ref,
                        &NewTicket {
                            title: draft.title.clone(),
                            body: draft.body.clone(),
                            labels: draft.labels.clone(),
                            assignees: draft.assignees.clone(),
                            milestone: None,
                        },
                    )
                    .await?;
                run_log.info(&format!("Created issue #{}: {}", ticket.number, ticket.url));
                tickets.push(ticket);
            }
            run_log.save_json("issues.json", &tickets)?;
        } else {
            run_log.info("Dry run: skipping issue creation");
        }

        let outcome = PlanOutcome {
            tickets,
            drafts,
            run_id: run_log.run_id().clone(),
            log_dir: run_log.dir().to_path_buf(),
        };
        run_log.save_json("result.json", &outcome)?;
        run_log.info(&format!(
            "plan completed: {} issue(s) created",
            outcome.tickets.len()
        ));
        Ok(outcome)
    }
}
