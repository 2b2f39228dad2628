//! Parsers for git's machine-readable output.

use serde::{Deserialize, Serialize};

/// One record of `git worktree list --porcelain`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorktreeEntry {
    pub path: String,
    pub head: Option<String>,
    /// Short branch name; `None` for detached or bare worktrees.
    pub branch: Option<String>,
}

/// Extracts changed paths from `git status --porcelain`, in reported order.
///
/// Renames report the destination path; quoted paths are unquoted.
pub fn parse_status(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| line.len() > 3)
        .map(|line| {
            let path = &line[3..];
            let path = match path.split_once(" -> ") {
                Some((_, to)) => to,
                None => path,
            };
            unquote(path)
        })
        .collect()
}

/// Parses `git worktree list --porcelain` into entries.
pub fn parse_worktree_list(output: &str) -> Vec<WorktreeEntry> {
    output
        .split("\n\n")
        .filter(|record| !record.trim().is_empty())
        .filter_map(|record| {
            let mut path = None;
            let mut head = None;
            let mut branch = None;

            for line in record.lines() {
                let (key, value) = line.split_once(' ').unwrap_or((line, ""));
                match key {
                    "worktree" => path = Some(value.to_string()),
                    "HEAD" => head = Some(value.to_string()),
                    "branch" => {
                        branch = Some(
                            value
                                .strip_prefix("refs/heads/")
                                .unwrap_or(value)
                                .to_string(),
                        )
                    }
                    _ => {}
                }
            }

            path.map(|path| WorktreeEntry { path, head, branch })
        })
        .collect()
}

/// Undoes git's C-style quoting of unusual paths.
///
/// Non-ASCII bytes arrive as `\NNN` octal escapes under the default
/// `core.quotePath`; they are decoded back into UTF-8.
fn unquote(path: &str) -> String {
    let Some(inner) = path.strip_prefix('"').and_then(|p| p.strip_suffix('"')) else {
        return path.to_string();
    };

    let bytes = inner.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        i += 1;
        if b != b'\\' {
            out.push(b);
            continue;
        }
        match bytes.get(i) {
            Some(&d) if is_escape_octal(bytes, i) => {
                out.push((d - b'0') * 64 + (bytes[i + 1] - b'0') * 8 + (bytes[i + 2] - b'0'));
                i += 3;
            }
            Some(b'n') => {
                out.push(b'\n');
                i += 1;
            }
            Some(b't') => {
                out.push(b'\t');
                i += 1;
            }
            Some(&other) => {
                out.push(other);
                i += 1;
            }
            None => out.push(b'\\'),
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Whether `bytes[at..at + 3]` is a `\NNN` escape body no greater than `\377`.
fn is_escape_octal(bytes: &[u8], at: usize) -> bool {
    matches!(
        bytes.get(at..at + 3),
        Some([b'0'..=b'3', b'0'..=b'7', b'0'..=b'7'])
    )
}
