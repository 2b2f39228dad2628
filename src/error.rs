//! Error taxonomy shared by every component that talks to an external system.
//!
//! Failures from the tracker API, the `git` binary, the agent runtime and the
//! filesystem are normalized into one of the [`ErrorKind`]s before anything
//! inspects them, so retry decisions and operator messages are uniform.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Boxed underlying cause kept for diagnostics.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Closed set of error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// The agent stream ended without success, or failed before any message.
    AgentExecution,
    /// The tracker answered 403 or 429.
    TrackerRateLimit,
    /// Any other tracker failure.
    TrackerApi,
    /// Workspace creation, change detection, commit, push or cleanup failed.
    Workspace,
    /// Required input or credential missing.
    Configuration,
    /// A remote URL, reference or structured text could not be parsed.
    Parse,
}

impl ErrorKind {
    /// Stable machine code shown to operators.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::AgentExecution => "AGENT_EXECUTION_ERROR",
            ErrorKind::TrackerRateLimit => "GITHUB_RATE_LIMIT",
            ErrorKind::TrackerApi => "GITHUB_API_ERROR",
            ErrorKind::Workspace => "WORKTREE_ERROR",
            ErrorKind::Configuration => "CONFIGURATION_ERROR",
            ErrorKind::Parse => "PARSE_ERROR",
        }
    }

    /// Whether errors of this kind are retryable unless overridden.
    pub fn retryable_by_default(&self) -> bool {
        matches!(self, ErrorKind::TrackerRateLimit)
    }

    /// Default operator-facing suggestion.
    pub fn default_suggestion(&self) -> &'static str {
        match self {
            ErrorKind::AgentExecution => {
                "The agent run failed. Check the execution log and transcript for details."
            }
            ErrorKind::TrackerRateLimit => {
                "The GitHub API rate limit was reached. Wait a while and try again."
            }
            ErrorKind::TrackerApi => {
                "The GitHub API call failed. Check the token and its repository permissions."
            }
            ErrorKind::Workspace => {
                "A git worktree operation failed. Check the state of the repository."
            }
            ErrorKind::Configuration => "Check the command arguments and configuration.",
            ErrorKind::Parse => "Check the format of the input data.",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Top-level error type.
///
/// Records are created where a failure is first observed and are never
/// mutated afterwards.
#[derive(Error, Debug)]
pub enum Error {
    /// Agent runtime failure.
    #[error("{message}")]
    AgentExecution {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Tracker API failure. Rate limiting is a property of the status code.
    #[error("{message}")]
    Tracker {
        message: String,
        status: Option<u16>,
        retryable: bool,
        #[source]
        source: Option<BoxError>,
    },

    /// Workspace (git worktree) failure.
    #[error("{message}")]
    Workspace {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Missing input or credential.
    #[error("{message}")]
    Configuration {
        message: String,
        suggestion: Option<String>,
        #[source]
        source: Option<BoxError>,
    },

    /// Parse failure where a result was required.
    #[error("{message}")]
    Parse {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

impl Error {
    pub fn agent(message: impl Into<String>) -> Self {
        Error::AgentExecution {
            message: message.into(),
            source: None,
        }
    }

    pub fn agent_with(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Error::AgentExecution {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Creates a tracker error.
    ///
    /// A 403 or 429 status is always a retryable rate limit; `retryable`
    /// only changes the default for every other status.
    pub fn tracker(
        message: impl Into<String>,
        status: Option<u16>,
        retryable: Option<bool>,
    ) -> Self {
        let rate_limited = matches!(status, Some(403) | Some(429));
        Error::Tracker {
            message: message.into(),
            status,
            retryable: rate_limited || retryable.unwrap_or(false),
            source: None,
        }
    }

    /// Attaches an underlying cause.
    pub fn with_source(self, cause: impl Into<BoxError>) -> Self {
        let cause = Some(cause.into());
        match self {
            Error::AgentExecution { message, .. } => Error::AgentExecution {
                message,
                source: cause,
            },
            Error::Tracker {
                message,
                status,
                retryable,
                ..
            } => Error::Tracker {
                message,
                status,
                retryable,
                source: cause,
            },
            Error::Workspace { message, .. } => Error::Workspace {
                message,
                source: cause,
            },
            Error::Parse { message, .. } => Error::Parse {
                message,
                source: cause,
            },
            Error::Configuration {
                message,
                suggestion,
                ..
            } => Error::Configuration {
                message,
                suggestion,
                source: cause,
            },
        }
    }

    pub fn workspace(message: impl Into<String>) -> Self {
        Error::Workspace {
            message: message.into(),
            source: None,
        }
    }

    pub fn workspace_with(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Error::Workspace {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
            suggestion: None,
            source: None,
        }
    }

    pub fn config_with_suggestion(
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Error::Configuration {
            message: message.into(),
            suggestion: Some(suggestion.into()),
            source: None,
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Error::Parse {
            message: message.into(),
            source: None,
        }
    }

    pub fn parse_with(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Error::Parse {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Returns the taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::AgentExecution { .. } => ErrorKind::AgentExecution,
            Error::Tracker { status, .. } => {
                if matches!(status, Some(403) | Some(429)) {
                    ErrorKind::TrackerRateLimit
                } else {
                    ErrorKind::TrackerApi
                }
            }
            Error::Workspace { .. } => ErrorKind::Workspace,
            Error::Configuration { .. } => ErrorKind::Configuration,
            Error::Parse { .. } => ErrorKind::Parse,
        }
    }

    /// Whether re-attempting the failed operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Tracker { retryable, .. } => *retryable,
            other => other.kind().retryable_by_default(),
        }
    }

    /// HTTP status code, for tracker errors that have one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Tracker { status, .. } => *status,
            _ => None,
        }
    }

    /// Operator-facing suggestion text.
    pub fn suggestion(&self) -> &str {
        match self {
            Error::Configuration {
                suggestion: Some(s),
                ..
            } => s,
            other => other.kind().default_suggestion(),
        }
    }

    /// Renders `[CODE] message` followed by the suggestion on its own line.
    pub fn user_message(&self) -> String {
        let mut msg = format!("[{}] {}", self.kind().code(), self);
        if let Some(cause) = std::error::Error::source(self) {
            msg.push_str(&format!(" ({})", cause));
        }
        msg.push_str(&format!("\n  → {}", self.suggestion()));
        msg
    }
}

/// Result type alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
