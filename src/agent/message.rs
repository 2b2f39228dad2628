//! Typed view of the agent's stream-json messages.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Terminal summary of an agent run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AgentOutcome {
    pub success: bool,
    pub result_text: String,
    pub num_turns: u32,
    pub cost_usd: f64,
    pub duration_ms: u64,
}

/// One message of the agent stream.
///
/// Only assistant text and the terminal result are interpreted; everything
/// else is kept as raw JSON for the transcript.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentMessage {
    System { raw: Value },
    Assistant { texts: Vec<String>, raw: Value },
    User { raw: Value },
    Result { outcome: AgentOutcome, raw: Value },
}

impl AgentMessage {
    /// Interprets one stream-json object. Unknown message types yield `None`.
    pub fn from_json(raw: Value) -> Option<Self> {
        let kind = raw.get("type").and_then(Value::as_str)?.to_string();
        match kind.as_str() {
            "system" => Some(AgentMessage::System { raw }),
            "user" => Some(AgentMessage::User { raw }),
            "assistant" => {
                let texts = raw
                    .get("message")
                    .and_then(|m| m.get("content"))
                    .and_then(Value::as_array)
                    .map(|content| {
                        content
                            .iter()
                            .filter(|item| item.get("type").and_then(Value::as_str) == Some("text"))
                            .filter_map(|item| item.get("text").and_then(Value::as_str))
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                Some(AgentMessage::Assistant { texts, raw })
            }
            "result" => {
                let outcome = parse_outcome(&raw);
                Some(AgentMessage::Result { outcome, raw })
            }
            _ => None,
        }
    }

    /// Parses one stdout line; non-JSON lines and unknown types yield `None`.
    pub fn parse_line(line: &str) -> Option<Self> {
        let raw: Value = serde_json::from_str(line.trim()).ok()?;
        Self::from_json(raw)
    }

    /// An assistant message carrying a single text segment.
    pub fn assistant_text(text: impl Into<String>) -> Self {
        let text = text.into();
        let raw = json!({
            "type": "assistant",
            "message": { "role": "assistant", "content": [{ "type": "text", "text": text }] },
        });
        AgentMessage::Assistant {
            texts: vec![text],
            raw,
        }
    }

    /// A terminal result message for `outcome`.
    pub fn result(outcome: AgentOutcome) -> Self {
        let subtype = if outcome.success { "success" } else { "error" };
        let raw = json!({
            "type": "result",
            "subtype": subtype,
            "is_error": !outcome.success,
            "result": outcome.result_text,
            "num_turns": outcome.num_turns,
            "total_cost_usd": outcome.cost_usd,
            "duration_ms": outcome.duration_ms,
        });
        AgentMessage::Result { outcome, raw }
    }

    pub fn raw(&self) -> &Value {
        match self {
            AgentMessage::System { raw }
            | AgentMessage::Assistant { raw, .. }
            | AgentMessage::User { raw }
            | AgentMessage::Result { raw, .. } => raw,
        }
    }

    /// Assistant text joined by newlines; `None` for other messages.
    pub fn text(&self) -> Option<String> {
        match self {
            AgentMessage::Assistant { texts, .. } => Some(texts.join("\n")),
            _ => None,
        }
    }

    pub fn outcome(&self) -> Option<&AgentOutcome> {
        match self {
            AgentMessage::Result { outcome, .. } => Some(outcome),
            _ => None,
        }
    }
}

fn parse_outcome(raw: &Value) -> AgentOutcome {
    let is_error = raw.get("is_error").and_then(Value::as_bool).unwrap_or(false);
    let subtype = raw.get("subtype").and_then(Value::as_str).unwrap_or("success");

    AgentOutcome {
        success: !is_error && subtype == "success",
        result_text: raw
            .get("result")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        num_turns: raw
            .get("num_turns")
            .and_then(Value::as_u64)
            .map_or(0, |n| u32::try_from(n).unwrap_or(u32::MAX)),
        cost_usd: raw
            .get("total_cost_usd")
            .or_else(|| raw.get("cost_usd"))
            .and_then(Value::as_f64)
            .unwrap_or(0.0),
        duration_ms: raw.get("duration_ms").and_then(Value::as_u64).unwrap_or(0),
    }
}

/// Text of the last assistant message with non-blank text; empty if none.
pub fn final_message(messages: &[AgentMessage]) -> String {
    messages
        .iter()
        .rev()
        .filter_map(AgentMessage::text)
        .find(|text| !text.trim().is_empty())
        .unwrap_or_default()
}

/// All assistant text, one message per paragraph.
pub fn all_text(messages: &[AgentMessage]) -> String {
    messages
        .iter()
        .filter_map(AgentMessage::text)
        .filter(|text| !text.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}
