//! Fenced code block scanning.

/// A fenced block found in generated text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FencedBlock<'a> {
    /// Info string of the opening fence, as written.
    pub tag: &'a str,
    /// Lines between the fences, joined with `\n`.
    pub content: &'a str,
}

/// Returns every terminated fenced block whose tag is one of `tags`
/// (case-insensitive), in source order.
///
/// A block closes on a bare fence at least as long as its opening fence.
/// Fences nested inside a block (an opening fence with its own tag and a
/// matching bare closing fence) stay part of the outer block's content.
/// Blocks with other tags are skipped whole; a block with no closing fence
/// is ignored.
pub fn fenced_blocks<'a>(text: &'a str, tags: &[&str]) -> Vec<FencedBlock<'a>> {
    let mut blocks = Vec::new();
    let mut offset = 0;
    // (tag, fence length, content start); an empty tag marks a skipped block
    let mut open: Option<(&'a str, usize, usize)> = None;
    let mut depth = 0usize;

    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();

        let Some((fence_len, info)) = parse_fence(line) else {
            continue;
        };

        match open {
            None => {
                if tags.iter().any(|t| t.eq_ignore_ascii_case(info)) {
                    open = Some((info, fence_len, offset));
                } else if !info.is_empty() {
                    open = Some(("", fence_len, offset));
                }
                depth = 0;
            }
            Some((tag, open_len, content_start)) => {
                if !info.is_empty() {
                    depth += 1;
                } else if depth > 0 {
                    depth -= 1;
                } else if fence_len >= open_len {
                    if !tag.is_empty() {
                        let content = text[content_start..line_start].trim_end_matches('\n');
                        let content = content.strip_suffix('\r').unwrap_or(content);
                        blocks.push(FencedBlock { tag, content });
                    }
                    open = None;
                }
            }
        }
    }

    blocks
}

/// Splits a fence line into its backtick count and info string.
fn parse_fence(line: &str) -> Option<(usize, &str)> {
    let trimmed = line.trim();
    let fence_len = trimmed.chars().take_while(|c| *c == '`').count();
    if fence_len < 3 {
        return None;
    }
    let info = trimmed[fence_len..].trim();
    if info.contains('`') {
        return None;
    }
    Some((fence_len, info))
}
