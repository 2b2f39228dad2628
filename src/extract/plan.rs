//! Plan extraction.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::fence::fenced_blocks;

/// Title used when a plan heading carries no text.
pub const DEFAULT_PLAN_TITLE: &str = "Implementation Plan";

const PLAN_TAGS: &[&str] = &["markdown", "md"];

static TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^#[ \t]*(?:計画|Plan)[ \t]*[:：][ \t]*(.*?)[ \t\r]*$")
        .expect("valid plan title regex")
});

/// A planning record recovered from generated text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedPlan {
    pub title: String,
    pub body: String,
}

/// Recovers a plan from generated text.
///
/// The first fenced markdown block whose first line is a plan heading wins.
/// Without one, the raw text is scanned for a plan heading and the span up to
/// the next plan heading is used. Returns `None` when neither exists.
pub fn extract_plan(text: &str) -> Option<ExtractedPlan> {
    let candidate = from_fenced_block(text).or_else(|| from_raw_text(text))?;
    Some(build_plan(&candidate))
}

fn from_fenced_block(text: &str) -> Option<String> {
    fenced_blocks(text, PLAN_TAGS)
        .into_iter()
        .map(|block| block.content.trim_start_matches(['\n', '\r']))
        .find(|content| {
            content
                .lines()
                .next()
                .is_some_and(|first| TITLE_RE.is_match(first))
        })
        .map(str::to_string)
}

fn from_raw_text(text: &str) -> Option<String> {
    let mut lines = text.lines().skip_while(|line| !TITLE_RE.is_match(line));
    let title_line = lines.next()?;

    let mut candidate = vec![title_line];
    candidate.extend(lines.take_while(|line| !TITLE_RE.is_match(line)));
    Some(candidate.join("\n"))
}

fn build_plan(candidate: &str) -> ExtractedPlan {
    let mut lines = candidate.lines();
    let title = lines
        .next()
        .and_then(|line| TITLE_RE.captures(line))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| DEFAULT_PLAN_TITLE.to_string());

    let body_lines = apply_separator_rule(lines.collect());
    ExtractedPlan {
        title,
        body: trim_blank_lines(&body_lines),
    }
}

/// Drops a `---` separator and everything after it, unless the next
/// non-blank line opens a new heading.
fn apply_separator_rule(lines: Vec<&str>) -> Vec<&str> {
    for (idx, line) in lines.iter().enumerate() {
        if line.trim() != "---" {
            continue;
        }
        let next = lines[idx + 1..].iter().find(|l| !l.trim().is_empty());
        if !next.is_some_and(|l| l.trim_start().starts_with('#')) {
            return lines[..idx].to_vec();
        }
    }
    lines
}

fn trim_blank_lines(lines: &[&str]) -> String {
    let start = lines.iter().position(|l| !l.trim().is_empty());
    let end = lines.iter().rposition(|l| !l.trim().is_empty());
    match (start, end) {
        (Some(start), Some(end)) => lines[start..=end]
            .iter()
            .map(|l| l.trim_end())
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}
