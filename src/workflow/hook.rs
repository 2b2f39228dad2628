//! Plan hook: files the plan from an interactive agent session as a ticket.
//!
//! Invoked by the agent's plan-exit hook with a JSON payload naming the
//! session transcript. The transcript is scanned from the end for the most
//! recent assistant text carrying a plan title line.

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::agent::AgentRuntime;
use crate::error::{Error, Result};
use crate::extract::extract_plan;
use crate::tracker::{NewTicket, Ticket, Tracker};
use crate::workspace::Git;

use super::Orchestrator;

/// Label put on tickets filed by the hook.
pub const PLAN_HOOK_LABEL: &str = "plan";

static PLAN_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^#[ \t]*(?:計画|Plan)[ \t]*[:：][ \t]*\S.*$")
        .expect("valid plan line regex")
});

/// Hook payload. Unknown fields are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct HookInput {
    pub transcript_path: PathBuf,
    /// Directory of the session; its repository receives the ticket.
    pub cwd: PathBuf,
}

impl HookInput {
    pub fn from_json(json: &str) -> Result<Self> {
        if json.trim().is_empty() {
            return Err(Error::config("no hook input received on stdin"));
        }
        serde_json::from_str(json).map_err(|e| Error::parse_with("invalid hook input", e))
    }
}

/// Returns the last assistant text block in a JSONL transcript that contains
/// a plan title line. Lines that are not valid JSON are skipped.
pub fn find_plan_in_transcript(transcript: &str) -> Option<String> {
    transcript
        .lines()
        .rev()
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .filter(|entry| entry.get("type").and_then(Value::as_str) == Some("assistant"))
        .find_map(|entry| {
            entry
                .pointer("/message/content")
                .and_then(Value::as_array)?
                .iter()
                .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|block| block.get("text").and_then(Value::as_str))
                .find(|text| PLAN_LINE_RE.is_match(text))
                .map(str::to_string)
        })
}

impl<R, T, G> Orchestrator<R, T, G>
where
    R: AgentRuntime,
    T: Tracker,
    G: Git + Clone,
{
    /// Creates one ticket labelled [`PLAN_HOOK_LABEL`] from the plan found in
    /// the hook's transcript.
    pub async fn plan_hook(&self, input: &HookInput) -> Result<Ticket> {
        let transcript = std::fs::read_to_string(&input.transcript_path).map_err(|e| {
            Error::config(format!(
                "failed to read transcript {}",
                input.transcript_path.display()
            ))
            .with_source(e)
        })?;

        let text = find_plan_in_transcript(&transcript).ok_or_else(|| {
            Error::parse("no plan found in transcript (looking for '# 計画:' or '# Plan:')")
        })?;
        let plan = extract_plan(&text).ok_or_else(|| {
            Error::parse("could not parse plan; expected a '# Plan: <title>' line")
        })?;

        tracing::info!(title = %plan.title, "filing plan as issue");

        let repo_ref = self.repo_ref(&input.cwd).await?;
        let ticket = self
            .tracker
            .create_ticket(
                &repo_ref,
                &NewTicket {
                    title: plan.title,
                    body: plan.body,
                    labels: vec![PLAN_HOOK_LABEL.to_string()],
                    ..Default::default()
                },
            )
            .await?;

        tracing::info!(number = ticket.number, url = %ticket.url, "created plan issue");
        Ok(ticket)
    }
}
