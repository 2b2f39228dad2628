use serde::{Deserialize, Serialize};

use super::fence::fenced_blocks;
use super::fields::{find, parse_fields};

const TICKET_TAGS: &[&str] = &["yaml", "yml"];

/// A ticket the agent proposed, ready to be created in the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TicketDraft {
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
    pub assignees: Vec<String>,
}

/// Extracts one draft per fenced YAML block that has a non-empty `title`,
/// in source order.
pub fn extract_ticket_drafts(text: &str) -> Vec<TicketDraft> {
    fenced_blocks(text, TICKET_TAGS)
        .into_iter()
        .filter_map(|block| parse_draft(block.content))
        .collect()
}

fn parse_draft(block: &str) -> Option<TicketDraft> {
    let fields = parse_fields(block);

    let title = find(&fields, "title")?.scalar();
    if title.is_empty() {
        return None;
    }

    Some(TicketDraft {
        title,
        body: find(&fields, "body").map(|f| f.text()).unwrap_or_default(),
        labels: find(&fields, "labels").map(|f| f.list()).unwrap_or_default(),
        assignees: find(&fields, "assignees")
            .map(|f| f.list())
            .unwrap_or_default(),
    })
}
