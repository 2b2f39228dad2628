//! Review request title/body recovery and the fallback body.

use serde::{Deserialize, Serialize};

use super::fence::fenced_blocks;
use super::fields::{find, parse_fields};

/// Hard cap on the excerpt embedded in a default review body, in characters.
pub const EXCERPT_LIMIT: usize = 1000;

/// Appended to an excerpt that was cut at [`EXCERPT_LIMIT`].
pub const TRUNCATION_MARKER: &str = "\n\n… (truncated)";

const REVIEW_TAGS: &[&str] = &["yaml", "yml"];
const TITLE_KEYS: &[&str] = &["pr_title", "title"];
const BODY_KEYS: &[&str] = &["pr_body", "body"];

/// Title and body for a review request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewInfo {
    pub title: String,
    /// May be empty when the block only carried a title.
    pub body: String,
}

/// Finds review info in the agent's final message.
///
/// Later blocks win: the search walks fenced YAML blocks from the last to
/// the first and returns the first one with a non-empty title.
pub fn extract_review_info(text: &str) -> Option<ReviewInfo> {
    fenced_blocks(text, REVIEW_TAGS)
        .into_iter()
        .rev()
        .find_map(|block| parse_review_block(block.content))
}

fn parse_review_block(block: &str) -> Option<ReviewInfo> {
    let fields = parse_fields(block);

    let title = TITLE_KEYS
        .iter()
        .find_map(|key| find(&fields, key))?
        .scalar();
    if title.is_empty() {
        return None;
    }

    let body = BODY_KEYS
        .iter()
        .find_map(|key| find(&fields, key))
        .map(|f| f.text())
        .unwrap_or_default();

    Some(ReviewInfo { title, body })
}

/// Builds a review body for ticket `ticket_number` from the agent's raw
/// output when no structured review info was produced.
///
/// Never returns an empty string.
pub fn build_default_review_body(ticket_number: u64, raw_text: &str) -> String {
    let raw = raw_text.trim();
    let summary = if raw.is_empty() {
        "(the agent produced no summary)".to_string()
    } else {
        excerpt(raw)
    };

    format!(
        "## Summary\n\nImplementation of issue #{number}.\n\n## Agent output\n\n{summary}\n\n## Related issue\n\nCloses #{number}\n",
        number = ticket_number,
        summary = summary,
    )
}

fn excerpt(text: &str) -> String {
    match text.char_indices().nth(EXCERPT_LIMIT) {
        Some((cut, _)) => format!("{}{}", &text[..cut], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}
