//! Line-oriented field parsing for the YAML-like blocks agents emit.
//!
//! Agents rarely produce YAML a strict parser accepts (unescaped colons in
//! titles, tabs, stray prose), so fields are recovered line by line instead.

use std::sync::LazyLock;

use regex::Regex;

/// Width of the indentation stripped from block-literal lines.
const BODY_INDENT: &str = "  ";

static FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*):(?:[ \t]+(.*?))?[ \t]*$").expect("valid field regex")
});

static BULLET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ \t]*-[ \t]+(.+?)[ \t]*$").expect("valid bullet regex"));

/// One top-level `key: value` field and the lines that belong to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Field<'a> {
    pub key: &'a str,
    /// Text after the colon on the key line (trimmed; may be empty).
    pub inline: &'a str,
    /// Following lines up to the next top-level field.
    pub lines: Vec<&'a str>,
}

impl<'a> Field<'a> {
    /// Scalar value with one pair of surrounding quotes removed.
    pub fn scalar(&self) -> String {
        unquote(self.inline).trim().to_string()
    }

    /// Block-literal (`|`, `|-`, `>`) or inline scalar text.
    ///
    /// Exactly one two-space prefix is stripped from each continuation line;
    /// deeper indentation is preserved. The result is trimmed.
    pub fn text(&self) -> String {
        if !is_block_indicator(self.inline) {
            return self.scalar();
        }
        let lines: Vec<&str> = self
            .lines
            .iter()
            .map(|line| {
                let line = line.trim_end_matches('\r');
                line.strip_prefix(BODY_INDENT).unwrap_or(line)
            })
            .collect();
        lines.join("\n").trim().to_string()
    }

    /// Bulleted list items, or a `[a, b]` flow sequence on the key line.
    pub fn list(&self) -> Vec<String> {
        let inline = self.inline.trim();
        if let Some(flow) = inline.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            return flow
                .split(',')
                .map(|item| unquote(item.trim()).trim().to_string())
                .filter(|item| !item.is_empty())
                .collect();
        }
        self.lines
            .iter()
            .filter_map(|line| BULLET_RE.captures(line))
            .filter_map(|caps| caps.get(1))
            .map(|m| unquote(m.as_str()).trim().to_string())
            .filter(|item| !item.is_empty())
            .collect()
    }
}

/// Splits a block into its top-level fields, in order.
///
/// A top-level field starts at column zero; anything before the first field
/// is ignored.
pub(crate) fn parse_fields(block: &str) -> Vec<Field<'_>> {
    let mut fields: Vec<Field<'_>> = Vec::new();
    for line in block.lines() {
        let bare = line.trim_end_matches('\r');
        if let Some(caps) = FIELD_RE.captures(bare) {
            let key = caps.get(1).map_or("", |m| m.as_str());
            let inline = caps.get(2).map_or("", |m| m.as_str());
            fields.push(Field {
                key,
                inline,
                lines: Vec::new(),
            });
        } else if let Some(current) = fields.last_mut() {
            current.lines.push(line);
        }
    }
    fields
}

/// Returns the first field named `key`.
pub(crate) fn find<'f, 'a>(fields: &'f [Field<'a>], key: &str) -> Option<&'f Field<'a>> {
    fields.iter().find(|f| f.key == key)
}

fn is_block_indicator(inline: &str) -> bool {
    matches!(inline.trim(), "|" | "|-" | "|+" | ">" | ">-" | ">+")
}

/// Strips one pair of matching single or double quotes.
pub(crate) fn unquote(value: &str) -> &str {
    let value = value.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}
