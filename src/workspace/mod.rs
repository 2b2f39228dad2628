//! Disposable per-run workspaces backed by git worktrees.
//!
//! Each run gets its own branch and checkout directory, both named after the
//! run's [`RunId`](crate::run_id::RunId) so concurrent runs never collide.
//! A workspace has a single writer: the run that created it.

mod git;
mod manager;
mod porcelain;

pub use git::{Git, SystemGit};
pub use manager::{CleanupOptions, CreateOptions, WorkspaceManager};
pub use porcelain::{parse_status, parse_worktree_list, WorktreeEntry};

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::run_id::RunId;

/// One disposable checkout owned by a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    /// Worktree directory.
    pub path: PathBuf,
    /// Branch created for the run.
    pub branch: String,
    /// Branch the run started from.
    pub base_branch: String,
    /// Repository the worktree is registered in.
    pub repo_path: PathBuf,
}

/// Derives the branch name for a run.
///
/// The job name is lowercased and every run of characters outside
/// `[a-z0-9._-]` becomes a single `-`. The issue number, when present, sits
/// between the job name and the run id.
pub fn branch_name(job_name: &str, issue_number: Option<u64>, run_id: &RunId) -> String {
    let safe_job = sanitize_job_name(job_name);
    match issue_number {
        Some(number) => format!("{}-{}-{}", safe_job, number, run_id),
        None => format!("{}-{}", safe_job, run_id),
    }
}

fn sanitize_job_name(job_name: &str) -> String {
    let mut out = String::with_capacity(job_name.len());
    let mut in_run = false;
    for c in job_name.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-') {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('-');
            in_run = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    fn run_id() -> RunId {
        RunId::parse("20250102-030405-00042").unwrap()
    }

    #[test]
    fn branch_without_issue_matches_pattern() {
        let pattern = Regex::new(&format!("^[a-z0-9._-]+-{}$", run_id())).unwrap();
        for job in ["issue-apply", "Plan Issue", "weird/job::name!", "ÄÖÜ job", "a.b_c"] {
            let name = branch_name(job, None, &run_id());
            assert!(pattern.is_match(&name), "{} -> {}", job, name);
            assert_eq!(name, branch_name(job, None, &run_id()));
        }
    }

    #[test]
    fn branch_with_issue_embeds_number() {
        let name = branch_name("issue-apply", Some(42), &run_id());
        assert_eq!(name, "issue-apply-42-20250102-030405-00042");
    }

    #[test]
    fn invalid_runs_collapse_to_single_dash() {
        assert_eq!(sanitize_job_name("My  Job//Name"), "my-job-name");
        assert_eq!(sanitize_job_name("ok.name_v2"), "ok.name_v2");
    }

    #[test]
    fn workspace_serializes_for_snapshots() {
        let ws = Workspace {
            path: PathBuf::from("/logs/issue-apply/run/worktree"),
            branch: "issue-apply-1-run".to_string(),
            base_branch: "main".to_string(),
            repo_path: PathBuf::from("/repo"),
        };
        let json = serde_json::to_value(&ws).unwrap();
        assert_eq!(json["branch"], "issue-apply-1-run");
        assert_eq!(json["base_branch"], "main");
    }
}
