//! Claude Code CLI runtime.

use std::collections::VecDeque;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::cancel::CancelToken;
use crate::error::{Error, Result};

use super::{AgentMessage, AgentRequest, AgentRuntime};

/// Stderr lines kept for error messages.
const STDERR_TAIL: usize = 20;

/// Runs the `claude` CLI in stream-json mode.
#[derive(Debug, Clone)]
pub struct ClaudeCli {
    /// Path to the claude CLI binary.
    cli_path: String,
}

impl Default for ClaudeCli {
    fn default() -> Self {
        Self::new()
    }
}

impl ClaudeCli {
    /// Uses `claude` from `PATH`.
    pub fn new() -> Self {
        Self {
            cli_path: "claude".to_string(),
        }
    }

    pub fn with_cli_path(cli_path: impl Into<String>) -> Self {
        Self {
            cli_path: cli_path.into(),
        }
    }

    fn build_args(&self, request: &AgentRequest) -> Vec<String> {
        let mut args = vec![
            "--print".to_string(),
            "--output-format".to_string(),
            "stream-json".to_string(),
            // Required for stream-json
            "--verbose".to_string(),
            "--permission-mode".to_string(),
            request.permission_mode.as_str().to_string(),
        ];

        if let Some(model) = &request.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }

        if !request.allowed_tools.is_empty() {
            args.push("--allowedTools".to_string());
            args.push(request.allowed_tools.join(","));
        }

        if let Some(max_turns) = request.max_turns {
            args.push("--max-turns".to_string());
            args.push(max_turns.to_string());
        }

        if let Some(append) = &request.append_system_prompt {
            args.push("--append-system-prompt".to_string());
            args.push(append.clone());
        }

        args.push("-p".to_string());
        args.push(request.prompt.clone());

        args
    }
}

#[async_trait]
impl AgentRuntime for ClaudeCli {
    async fn spawn(
        &self,
        request: AgentRequest,
        output_tx: mpsc::Sender<AgentMessage>,
        cancel: CancelToken,
    ) -> Result<()> {
        let args = self.build_args(&request);

        tracing::info!(
            cli = %self.cli_path,
            working_dir = ?request.working_dir,
            "spawning Claude CLI"
        );

        let mut child = Command::new(&self.cli_path)
            .args(&args)
            .current_dir(&request.working_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::agent_with(format!("failed to spawn {}", self.cli_path), e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::agent("claude stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::agent("claude stderr was not captured"))?;

        let mut stdout_reader = BufReader::new(stdout).lines();
        let mut stderr_reader = BufReader::new(stderr).lines();
        let mut stderr_open = true;
        let mut stderr_tail = VecDeque::with_capacity(STDERR_TAIL);

        loop {
            tokio::select! {
                line = stdout_reader.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            tracing::debug!(line = %line, "claude stdout");
                            let Some(message) = AgentMessage::parse_line(&line) else {
                                continue;
                            };
                            if output_tx.send(message).await.is_err() {
                                tracing::warn!("agent message receiver dropped");
                                break;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            tracing::error!(error = %e, "error reading claude stdout");
                            break;
                        }
                    }
                }
                line = stderr_reader.next_line(), if stderr_open => {
                    match line {
                        Ok(Some(line)) => {
                            tracing::debug!(line = %line, "claude stderr");
                            if stderr_tail.len() == STDERR_TAIL {
                                stderr_tail.pop_front();
                            }
                            stderr_tail.push_back(line);
                        }
                        Ok(None) => stderr_open = false,
                        Err(e) => {
                            tracing::error!(error = %e, "error reading claude stderr");
                            stderr_open = false;
                        }
                    }
                }
                _ = cancel.cancelled() => {
                    tracing::warn!("cancelling Claude CLI");
                    if let Err(e) = child.kill().await {
                        tracing::warn!(error = %e, "failed to kill claude");
                    }
                    return Err(Error::agent("agent run was cancelled"));
                }
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| Error::agent_with("failed to wait for claude", e))?;

        if !status.success() {
            let tail: Vec<String> = stderr_tail.into_iter().collect();
            return Err(Error::agent(format!(
                "claude exited with {}: {}",
                status,
                tail.join("\n")
            )));
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "claude-code"
    }
}
