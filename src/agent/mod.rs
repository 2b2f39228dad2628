//! Agent runtime seam.
//!
//! A runtime executes one request and streams [`AgentMessage`]s over a
//! channel; [`run_agent`] drains that stream into the run transcript and
//! insists on a terminal result message.

mod claude;
mod message;

pub use claude::ClaudeCli;
pub use message::{all_text, final_message, AgentMessage, AgentOutcome};

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::run_log::RunLog;

/// Tool permission policy handed to the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionMode {
    #[default]
    Default,
    AcceptEdits,
    BypassPermissions,
    Plan,
}

impl PermissionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionMode::Default => "default",
            PermissionMode::AcceptEdits => "acceptEdits",
            PermissionMode::BypassPermissions => "bypassPermissions",
            PermissionMode::Plan => "plan",
        }
    }
}

impl fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One agent invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRequest {
    pub prompt: String,
    pub working_dir: PathBuf,
    pub model: Option<String>,
    pub permission_mode: PermissionMode,
    pub allowed_tools: Vec<String>,
    pub max_turns: Option<u32>,
    pub append_system_prompt: Option<String>,
}

impl AgentRequest {
    pub fn new(prompt: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            prompt: prompt.into(),
            working_dir: working_dir.into(),
            model: None,
            permission_mode: PermissionMode::Default,
            allowed_tools: Vec::new(),
            max_turns: None,
            append_system_prompt: None,
        }
    }
}

/// Executes agent requests.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Runs `request`, sending every message to `output_tx` as it arrives.
    ///
    /// Returns once the agent has finished. Implementations stop early and
    /// return an error when `cancel` fires.
    async fn spawn(
        &self,
        request: AgentRequest,
        output_tx: mpsc::Sender<AgentMessage>,
        cancel: CancelToken,
    ) -> Result<()>;

    /// Returns the name of this runtime.
    fn name(&self) -> &str;
}

#[async_trait]
impl<T: AgentRuntime + ?Sized> AgentRuntime for Arc<T> {
    async fn spawn(
        &self,
        request: AgentRequest,
        output_tx: mpsc::Sender<AgentMessage>,
        cancel: CancelToken,
    ) -> Result<()> {
        (**self).spawn(request, output_tx, cancel).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Messages and terminal outcome of a finished agent run.
#[derive(Debug, Clone)]
pub struct AgentRun {
    pub outcome: AgentOutcome,
    pub messages: Vec<AgentMessage>,
}

impl AgentRun {
    pub fn final_message(&self) -> String {
        final_message(&self.messages)
    }

    pub fn all_text(&self) -> String {
        all_text(&self.messages)
    }
}

/// Runs `request` on `runtime`, recording every message in `run_log`.
///
/// Fails with an agent-execution error when the runtime fails before
/// producing any message, when the stream ends without a result message, or
/// when `cancel` fires. A non-successful result is returned as-is; callers
/// decide what it means.
pub async fn run_agent<R>(
    runtime: &R,
    request: AgentRequest,
    run_log: &RunLog,
    cancel: &CancelToken,
) -> Result<AgentRun>
where
    R: AgentRuntime + ?Sized,
{
    tracing::info!(
        runtime = runtime.name(),
        working_dir = ?request.working_dir,
        model = ?request.model,
        permission_mode = %request.permission_mode,
        "starting agent"
    );

    let (output_tx, mut output_rx) = mpsc::channel(64);
    let spawn = runtime.spawn(request, output_tx, cancel.clone());
    tokio::pin!(spawn);

    let mut messages = Vec::new();
    let mut outcome = None;
    let mut spawn_result = None;

    loop {
        tokio::select! {
            message = output_rx.recv() => {
                let Some(message) = message else { break };
                if let Err(e) = run_log.log_message(message.raw()) {
                    tracing::warn!(error = %e, "failed to record agent message");
                }
                if let Some(result) = message.outcome() {
                    outcome = Some(result.clone());
                }
                messages.push(message);
            }
            result = &mut spawn, if spawn_result.is_none() => {
                spawn_result = Some(result);
            }
        }
    }

    let spawn_result = match spawn_result {
        Some(result) => result,
        None => spawn.await,
    };

    if cancel.is_cancelled() {
        return Err(Error::agent("agent run was cancelled"));
    }

    match (spawn_result, outcome) {
        (Ok(()), Some(outcome)) => Ok(AgentRun { outcome, messages }),
        (Err(e), Some(outcome)) => {
            tracing::warn!(error = %e, "agent runtime reported an error after its result");
            Ok(AgentRun { outcome, messages })
        }
        (Err(e), None) if messages.is_empty() => Err(Error::agent_with(
            "agent runtime failed before producing any message",
            e,
        )),
        (Err(e), None) => Err(Error::agent_with(
            "agent stream ended without a result message",
            e,
        )),
        (Ok(()), None) => Err(Error::agent(
            "agent stream ended without a result message",
        )),
    }
}
