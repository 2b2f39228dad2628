//! Workspace lifecycle: create, detect changes, commit, push, clean up.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::run_id::RunId;

use super::git::{Git, SystemGit};
use super::porcelain::{parse_status, parse_worktree_list, WorktreeEntry};
use super::{branch_name, Workspace};

/// Fallback base branch when the source repository has a detached HEAD.
const DEFAULT_BASE_BRANCH: &str = "main";

/// Options for [`WorkspaceManager::create`].
#[derive(Debug, Clone)]
pub struct CreateOptions {
    pub source_repo: PathBuf,
    pub run_id: RunId,
    pub job_name: String,
    pub issue_number: Option<u64>,
    /// Defaults to the source repository's checked-out branch.
    pub base_branch: Option<String>,
    /// Root under which `<job>/<run>/worktree` is created.
    pub workspaces_root: PathBuf,
}

/// Options for [`WorkspaceManager::cleanup`].
#[derive(Debug, Clone)]
pub struct CleanupOptions<'a> {
    pub workspace: &'a Workspace,
    /// Also delete the branch on `origin`.
    pub delete_remote: bool,
}

/// Manages git-worktree workspaces.
#[derive(Debug, Clone)]
pub struct WorkspaceManager<G: Git = SystemGit> {
    git: G,
}

impl Default for WorkspaceManager<SystemGit> {
    fn default() -> Self {
        Self::new(SystemGit::new())
    }
}

impl<G: Git> WorkspaceManager<G> {
    pub fn new(git: G) -> Self {
        Self { git }
    }

    /// Creates a fresh branch and worktree for a run.
    ///
    /// On failure the run must treat the workspace as nonexistent, even if
    /// the directory was already created on disk.
    pub async fn create(&self, options: CreateOptions) -> Result<Workspace> {
        self.try_create(&options)
            .await
            .map_err(|e| Error::workspace_with("failed to create worktree", e))
    }

    async fn try_create(&self, options: &CreateOptions) -> Result<Workspace> {
        let base_branch = match &options.base_branch {
            Some(branch) => branch.clone(),
            None => self.current_branch(&options.source_repo).await?,
        };

        let branch = branch_name(&options.job_name, options.issue_number, &options.run_id);

        let run_dir = options
            .workspaces_root
            .join(&options.job_name)
            .join(options.run_id.as_str());
        let path = run_dir.join("worktree");

        tokio::fs::create_dir_all(&run_dir).await.map_err(|e| {
            Error::workspace_with(format!("failed to create {}", run_dir.display()), e)
        })?;

        let path_arg = path.to_string_lossy();
        self.git
            .run(
                &options.source_repo,
                &["worktree", "add", "-b", &branch, &path_arg, &base_branch],
            )
            .await?;

        tracing::info!(
            path = ?path,
            branch = %branch,
            base = %base_branch,
            "created workspace"
        );

        Ok(Workspace {
            path,
            branch,
            base_branch,
            repo_path: options.source_repo.clone(),
        })
    }

    async fn current_branch(&self, repo: &Path) -> Result<String> {
        let out = self
            .git
            .run(repo, &["rev-parse", "--abbrev-ref", "HEAD"])
            .await?;
        let branch = out.trim();
        if branch.is_empty() || branch == "HEAD" {
            Ok(DEFAULT_BASE_BRANCH.to_string())
        } else {
            Ok(branch.to_string())
        }
    }

    /// Lists changed paths in the workspace, in the order git reports them.
    ///
    /// An empty list means the agent changed nothing.
    pub async fn detect_changes(&self, workspace: &Workspace) -> Result<Vec<String>> {
        let status = self.status(workspace).await?;
        Ok(parse_status(&status))
    }

    async fn status(&self, workspace: &Workspace) -> Result<String> {
        self.git
            .run(
                &workspace.path,
                &["status", "--porcelain", "--untracked-files=all"],
            )
            .await
    }

    /// Stages and commits every change. Returns `false` without touching the
    /// index when there is nothing to commit.
    pub async fn commit(&self, workspace: &Workspace, message: &str) -> Result<bool> {
        let changed = parse_status(&self.status(workspace).await?);
        if changed.is_empty() {
            tracing::info!(branch = %workspace.branch, "no changes to commit");
            return Ok(false);
        }

        self.git.run(&workspace.path, &["add", "-A"]).await?;
        self.git
            .run(&workspace.path, &["commit", "-m", message])
            .await?;

        tracing::info!(
            branch = %workspace.branch,
            files = changed.len(),
            "committed changes"
        );
        Ok(true)
    }

    /// Pushes the workspace branch to `origin` and sets it as upstream.
    ///
    /// Not retried here; callers decide whether a failure is worth retrying.
    pub async fn push(&self, workspace: &Workspace) -> Result<()> {
        self.git
            .run(
                &workspace.path,
                &["push", "-u", "origin", &workspace.branch],
            )
            .await?;
        tracing::info!(branch = %workspace.branch, "pushed branch");
        Ok(())
    }

    /// Staged diff followed by unstaged diff.
    pub async fn diff(&self, workspace: &Workspace) -> Result<String> {
        let staged = self
            .git
            .run(&workspace.path, &["diff", "--cached"])
            .await?;
        let unstaged = self.git.run(&workspace.path, &["diff"]).await?;

        Ok([staged, unstaged]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("\n"))
    }

    /// Forcibly removes the worktree directory, discarding uncommitted changes.
    pub async fn remove_workspace(&self, workspace: &Workspace) -> Result<()> {
        let path = workspace.path.to_string_lossy();
        self.git
            .run(
                &workspace.repo_path,
                &["worktree", "remove", &path, "--force"],
            )
            .await
            .map_err(|e| {
                Error::workspace_with(
                    format!("failed to remove worktree {}", workspace.path.display()),
                    e,
                )
            })?;
        Ok(())
    }

    /// Deletes the local branch (`-D` when forced, `-d` otherwise).
    pub async fn delete_branch(&self, workspace: &Workspace, force: bool) -> Result<()> {
        let flag = if force { "-D" } else { "-d" };
        self.git
            .run(&workspace.repo_path, &["branch", flag, &workspace.branch])
            .await?;
        Ok(())
    }

    /// Deletes `branch` on `origin`.
    pub async fn delete_remote_branch(&self, repo: &Path, branch: &str) -> Result<()> {
        self.git
            .run(repo, &["push", "origin", "--delete", branch])
            .await?;
        Ok(())
    }

    /// Removes the worktree, force-deletes the local branch and optionally
    /// the remote branch.
    ///
    /// Every step is attempted even if an earlier one failed; completed steps
    /// are never rolled back. Any failures are reported together.
    pub async fn cleanup(&self, options: CleanupOptions<'_>) -> Result<()> {
        let workspace = options.workspace;
        let mut failures = Vec::new();

        if let Err(e) = self.remove_workspace(workspace).await {
            tracing::warn!(error = %e, path = ?workspace.path, "failed to remove worktree");
            failures.push(e.to_string());
        }

        if let Err(e) = self.delete_branch(workspace, true).await {
            tracing::warn!(
                error = %e,
                branch = %workspace.branch,
                "failed to delete local branch"
            );
            failures.push(e.to_string());
        }

        if options.delete_remote {
            if let Err(e) = self
                .delete_remote_branch(&workspace.repo_path, &workspace.branch)
                .await
            {
                tracing::warn!(
                    error = %e,
                    branch = %workspace.branch,
                    "failed to delete remote branch"
                );
                failures.push(e.to_string());
            }
        }

        if failures.is_empty() {
            tracing::info!(branch = %workspace.branch, "cleaned up workspace");
            Ok(())
        } else {
            Err(Error::workspace(format!(
                "cleanup of {} incomplete: {}",
                workspace.path.display(),
                failures.join("; ")
            )))
        }
    }

    /// Worktrees registered in `repo`.
    pub async fn list_workspaces(&self, repo: &Path) -> Result<Vec<WorktreeEntry>> {
        let output = self
            .git
            .run(repo, &["worktree", "list", "--porcelain"])
            .await?;
        Ok(parse_worktree_list(&output))
    }

    /// Drops metadata of worktrees whose directories no longer exist.
    pub async fn prune_workspaces(&self, repo: &Path) -> Result<()> {
        self.git.run(repo, &["worktree", "prune"]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Records every git invocation and replays scripted results.
    #[derive(Default)]
    struct RecordingGit {
        calls: Mutex<Vec<Vec<String>>>,
        responses: Mutex<VecDeque<Result<String>>>,
    }

    impl RecordingGit {
        fn respond(self, response: Result<String>) -> Self {
            self.responses.lock().unwrap().push_back(response);
            self
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }

        fn count(&self, subcommand: &str) -> usize {
            self.calls()
                .iter()
                .filter(|c| c.first().map(String::as_str) == Some(subcommand))
                .count()
        }
    }

    #[async_trait]
    impl Git for RecordingGit {
        async fn run(&self, _dir: &Path, args: &[&str]) -> Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push(args.iter().map(|a| a.to_string()).collect());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(String::new()))
        }
    }

    fn workspace() -> Workspace {
        Workspace {
            path: PathBuf::from("/ws"),
            branch: "issue-apply-7-20250102-030405-00042".to_string(),
            base_branch: "main".to_string(),
            repo_path: PathBuf::from("/repo"),
        }
    }

    fn create_options(root: &Path, base: Option<&str>) -> CreateOptions {
        CreateOptions {
            source_repo: PathBuf::from("/repo"),
            run_id: RunId::parse("20250102-030405-00042").unwrap(),
            job_name: "issue-apply".to_string(),
            issue_number: Some(7),
            base_branch: base.map(str::to_string),
            workspaces_root: root.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn commit_without_changes_skips_staging() {
        let git = Arc::new(RecordingGit::default().respond(Ok(String::new())));
        let manager = WorkspaceManager::new(git.clone());

        let committed = manager.commit(&workspace(), "msg").await.unwrap();

        assert!(!committed);
        assert_eq!(git.count("add"), 0);
        assert_eq!(git.count("commit"), 0);
    }

    #[tokio::test]
    async fn commit_with_changes_stages_and_commits_once() {
        let git = Arc::new(
            RecordingGit::default().respond(Ok(" M src/lib.rs\n?? new.rs\n".to_string())),
        );
        let manager = WorkspaceManager::new(git.clone());

        let committed = manager
            .commit(&workspace(), "issue-apply: implement #7")
            .await
            .unwrap();

        assert!(committed);
        assert_eq!(git.count("status"), 1);
        assert_eq!(git.count("add"), 1);
        assert_eq!(git.count("commit"), 1);
        assert!(git.calls().contains(&vec![
            "commit".into(),
            "-m".into(),
            "issue-apply: implement #7".into()
        ]));
    }

    #[tokio::test]
    async fn create_resolves_base_branch_from_source_repo() {
        let root = TempDir::new().unwrap();
        let git = Arc::new(
            RecordingGit::default()
                .respond(Ok("develop\n".to_string()))
                .respond(Ok(String::new())),
        );
        let manager = WorkspaceManager::new(git.clone());

        let ws = manager.create(create_options(root.path(), None)).await.unwrap();

        assert_eq!(ws.base_branch, "develop");
        assert_eq!(ws.branch, "issue-apply-7-20250102-030405-00042");
        assert_eq!(
            ws.path,
            root.path()
                .join("issue-apply")
                .join("20250102-030405-00042")
                .join("worktree")
        );
        let calls = git.calls();
        assert_eq!(calls[1][..3], ["worktree", "add", "-b"]);
        assert_eq!(calls[1].last().map(String::as_str), Some("develop"));
        assert!(ws.path.parent().unwrap().is_dir());
    }

    #[tokio::test]
    async fn create_uses_explicit_base_without_querying() {
        let root = TempDir::new().unwrap();
        let git = Arc::new(RecordingGit::default());
        let manager = WorkspaceManager::new(git.clone());

        let ws = manager
            .create(create_options(root.path(), Some("release")))
            .await
            .unwrap();

        assert_eq!(ws.base_branch, "release");
        assert_eq!(git.count("rev-parse"), 0);
    }

    #[tokio::test]
    async fn detached_head_falls_back_to_main() {
        let root = TempDir::new().unwrap();
        let git = Arc::new(RecordingGit::default().respond(Ok("HEAD\n".to_string())));
        let manager = WorkspaceManager::new(git.clone());

        let ws = manager.create(create_options(root.path(), None)).await.unwrap();
        assert_eq!(ws.base_branch, "main");
    }

    #[tokio::test]
    async fn create_failure_is_workspace_error_with_cause() {
        let root = TempDir::new().unwrap();
        let git = Arc::new(
            RecordingGit::default()
                .respond(Err(Error::workspace("git worktree add failed: branch exists"))),
        );
        let manager = WorkspaceManager::new(git.clone());

        let err = manager
            .create(create_options(root.path(), Some("main")))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Workspace);
        let cause = std::error::Error::source(&err).expect("cause");
        assert!(cause.to_string().contains("branch exists"));
    }

    #[tokio::test]
    async fn push_sets_upstream_on_origin() {
        let git = Arc::new(RecordingGit::default());
        let manager = WorkspaceManager::new(git.clone());

        manager.push(&workspace()).await.unwrap();

        assert_eq!(
            git.calls(),
            vec![vec![
                "push".to_string(),
                "-u".to_string(),
                "origin".to_string(),
                workspace().branch
            ]]
        );
    }

    #[tokio::test]
    async fn cleanup_removes_worktree_and_force_deletes_branch() {
        let git = Arc::new(RecordingGit::default());
        let manager = WorkspaceManager::new(git.clone());
        let ws = workspace();

        manager
            .cleanup(CleanupOptions {
                workspace: &ws,
                delete_remote: false,
            })
            .await
            .unwrap();

        let calls = git.calls();
        assert_eq!(calls[0], ["worktree", "remove", "/ws", "--force"]);
        assert_eq!(calls[1], ["branch", "-D", ws.branch.as_str()]);
        assert_eq!(git.count("push"), 0);
    }

    #[tokio::test]
    async fn cleanup_deletes_remote_when_requested() {
        let git = Arc::new(RecordingGit::default());
        let manager = WorkspaceManager::new(git.clone());
        let ws = workspace();

        manager
            .cleanup(CleanupOptions {
                workspace: &ws,
                delete_remote: true,
            })
            .await
            .unwrap();

        assert!(git.calls().contains(&vec![
            "push".into(),
            "origin".into(),
            "--delete".into(),
            ws.branch.clone()
        ]));
    }

    #[tokio::test]
    async fn cleanup_continues_after_failed_step() {
        let git = Arc::new(
            RecordingGit::default()
                .respond(Err(Error::workspace("worktree missing")))
                .respond(Ok(String::new())),
        );
        let manager = WorkspaceManager::new(git.clone());
        let ws = workspace();

        let err = manager
            .cleanup(CleanupOptions {
                workspace: &ws,
                delete_remote: false,
            })
            .await
            .unwrap_err();

        assert_eq!(git.count("branch"), 1);
        assert!(err.to_string().contains("incomplete"));
    }

    #[tokio::test]
    async fn delete_branch_uses_safe_flag_unless_forced() {
        let git = Arc::new(RecordingGit::default());
        let manager = WorkspaceManager::new(git.clone());

        manager.delete_branch(&workspace(), false).await.unwrap();
        manager.delete_branch(&workspace(), true).await.unwrap();

        let calls = git.calls();
        assert_eq!(calls[0][1], "-d");
        assert_eq!(calls[1][1], "-D");
    }

    #[tokio::test]
    async fn diff_joins_staged_and_unstaged() {
        let git = Arc::new(
            RecordingGit::default()
                .respond(Ok("staged".to_string()))
                .respond(Ok(String::new())),
        );
        let manager = WorkspaceManager::new(git.clone());

        assert_eq!(manager.diff(&workspace()).await.unwrap(), "staged");
    }

    #[tokio::test]
    async fn list_and_prune_use_worktree_subcommands() {
        let git = Arc::new(
            RecordingGit::default()
                .respond(Ok("worktree /repo\nHEAD abc\nbranch refs/heads/main\n".to_string())),
        );
        let manager = WorkspaceManager::new(git.clone());

        let entries = manager.list_workspaces(Path::new("/repo")).await.unwrap();
        manager.prune_workspaces(Path::new("/repo")).await.unwrap();

        assert_eq!(entries[0].branch.as_deref(), Some("main"));
        assert_eq!(git.calls()[1], ["worktree", "prune"]);
    }
}
