//! issue-flow CLI
//!
//! Plans work into GitHub issues and implements issues as pull requests.

use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::{Path, PathBuf};

use issue_flow::tracker::resolve_token;
use issue_flow::{
    ApplyOptions, CancelToken, ClaudeCli, Config, Error, GitHubTracker, HookInput, Orchestrator,
    PlanOptions, Result, RetryPolicy, SystemGit, WorkspaceManager,
};

const USAGE: &str = "\
Usage:
  issue-flow plan (--request <text> | --request-file <path>) [--context <text>] [--repo <dir>] [--model <model>] [--dry-run]
  issue-flow apply --issue <number|#number|url> [--repo <dir>] [--model <model>] [--base <branch>]
                   [--no-draft] [--skip-pr] [--cleanup] [--cleanup-remote]
  issue-flow plan-hook            (reads the hook payload as JSON on stdin)
  issue-flow worktrees list|prune [--repo <dir>]

Models: haiku, sonnet, opus or a full model id.
Environment: GH_TOKEN / GITHUB_TOKEN, ISSUE_FLOW_LOGS_ROOT, ISSUE_FLOW_SKILLS_ROOT,
             ISSUE_FLOW_PLAN_MODEL, ISSUE_FLOW_APPLY_MODEL, ISSUE_FLOW_API_URL, RUST_LOG";

/// Flags that take a value.
const VALUE_FLAGS: &[&str] = &[
    "--request",
    "--request-file",
    "--context",
    "--repo",
    "--model",
    "--issue",
    "--base",
];

/// Flags that are plain switches.
const SWITCHES: &[&str] = &[
    "--dry-run",
    "--no-draft",
    "--skip-pr",
    "--cleanup",
    "--cleanup-remote",
];

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() || matches!(args[0].as_str(), "-h" | "--help" | "help") {
        eprintln!("{}", USAGE);
        std::process::exit(if args.is_empty() { 1 } else { 0 });
    }

    if let Err(e) = run(&args).await {
        eprintln!("{}", e.user_message());
        std::process::exit(1);
    }
}

async fn run(args: &[String]) -> Result<()> {
    let command = args[0].as_str();
    let flags = Flags::parse(&args[1..])?;

    match command {
        "plan" => plan(&flags).await,
        "apply" => apply(&flags).await,
        "plan-hook" => plan_hook().await,
        "worktrees" => worktrees(&flags).await,
        other => Err(usage_error(format!("unknown command '{}'", other))),
    }
}

async fn plan(flags: &Flags) -> Result<()> {
    let repo = flags.repo()?;
    let options = PlanOptions {
        repo: repo.clone(),
        request: flags.value("--request").map(str::to_string),
        request_file: flags.value("--request-file").map(PathBuf::from),
        context: flags.value("--context").map(str::to_string),
        model: flags.value("--model").map(str::to_string),
        dry_run: flags.switch("--dry-run"),
    };
    // Fail on a missing request before asking for credentials.
    options.resolve_request()?;

    let orchestrator = orchestrator(&repo, !options.dry_run).await?;
    let outcome = orchestrator.plan(options).await?;

    if outcome.tickets.is_empty() {
        for draft in &outcome.drafts {
            println!("\n--- Issue (dry run) ---");
            println!("Title: {}", draft.title);
            println!("Labels: {}", draft.labels.join(", "));
            println!("Body:\n{}", draft.body);
            println!("------------------------");
        }
    }
    for ticket in &outcome.tickets {
        println!("Created issue #{}: {}", ticket.number, ticket.url);
    }
    println!("Logs: {}", outcome.log_dir.display());
    Ok(())
}

async fn apply(flags: &Flags) -> Result<()> {
    let issue = flags
        .value("--issue")
        .ok_or_else(|| usage_error("apply requires --issue"))?;
    let repo = flags.repo()?;

    let options = ApplyOptions {
        repo: repo.clone(),
        issue: issue.to_string(),
        model: flags.value("--model").map(str::to_string),
        draft: flags.switch("--no-draft").then_some(false),
        base_branch: flags.value("--base").map(str::to_string),
        skip_review_request: flags.switch("--skip-pr"),
        cleanup: flags.switch("--cleanup"),
        cleanup_remote: flags.switch("--cleanup-remote"),
    };

    let orchestrator = orchestrator(&repo, true).await?;
    let outcome = orchestrator.apply(options).await?;

    println!("\n{}", "=".repeat(60));
    println!("Issue #{}: {}", outcome.ticket.number, outcome.ticket.title);
    println!("{}", "=".repeat(60));
    println!("Branch: {}", outcome.workspace.branch);
    println!("Worktree: {}", outcome.workspace.path.display());
    println!("Changed files: {}", outcome.changed_files.len());
    match &outcome.review_request {
        Some(pr) => println!("Pull request #{}: {}", pr.number, pr.url),
        None if outcome.changed_files.is_empty() => println!("No changes; no pull request created"),
        None => println!("Pull request skipped"),
    }
    println!("Logs: {}", outcome.log_dir.display());
    Ok(())
}

async fn plan_hook() -> Result<()> {
    let mut payload = String::new();
    std::io::stdin()
        .read_to_string(&mut payload)
        .map_err(|e| Error::config("failed to read hook input from stdin").with_source(e))?;
    let input = HookInput::from_json(&payload)?;

    let orchestrator = orchestrator(&input.cwd, true).await?;
    let ticket = orchestrator.plan_hook(&input).await?;

    println!("GitHub Issue created: #{} - {}", ticket.number, ticket.url);
    Ok(())
}

async fn worktrees(flags: &Flags) -> Result<()> {
    let repo = flags.repo()?;
    let manager = WorkspaceManager::default();

    match flags.positional.first().map(String::as_str) {
        Some("list") => {
            for entry in manager.list_workspaces(&repo).await? {
                println!(
                    "{}\t{}\t{}",
                    entry.path,
                    entry.head.as_deref().unwrap_or("-"),
                    entry.branch.as_deref().unwrap_or("(detached)")
                );
            }
            Ok(())
        }
        Some("prune") => {
            manager.prune_workspaces(&repo).await?;
            println!("Pruned stale worktree metadata in {}", repo.display());
            Ok(())
        }
        _ => Err(usage_error("worktrees requires 'list' or 'prune'")),
    }
}

/// Builds the production orchestrator for `repo`.
///
/// Without `require_token` a missing credential is tolerated; the tracker is
/// then never called.
async fn orchestrator(
    repo: &Path,
    require_token: bool,
) -> Result<Orchestrator<ClaudeCli, GitHubTracker, SystemGit>> {
    let config = Config::load(repo)?;

    let token = match resolve_token().await {
        Ok(token) => token,
        Err(e) if require_token => return Err(e),
        Err(_) => String::new(),
    };

    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling run");
            on_interrupt.cancel();
        }
    });

    let tracker = GitHubTracker::new(token)?
        .with_api_url(config.api_base_url.clone())
        .with_retry_policy(RetryPolicy::from_config(&config.retry))
        .with_cancel(cancel.clone());

    Ok(
        Orchestrator::new(ClaudeCli::new(), tracker, SystemGit::new(), config)
            .with_cancel(cancel),
    )
}

fn usage_error(message: impl Into<String>) -> Error {
    Error::config_with_suggestion(message, USAGE)
}

/// Parsed command-line flags.
#[derive(Debug, Default)]
struct Flags {
    values: HashMap<String, String>,
    switches: HashSet<String>,
    positional: Vec<String>,
}

impl Flags {
    fn parse(args: &[String]) -> Result<Self> {
        let mut flags = Flags::default();
        let mut iter = args.iter();

        while let Some(arg) = iter.next() {
            let (name, inline) = match arg.split_once('=') {
                Some((name, value)) if name.starts_with("--") => (name, Some(value.to_string())),
                _ => (arg.as_str(), None),
            };

            if VALUE_FLAGS.contains(&name) {
                let value = match inline {
                    Some(value) => value,
                    None => iter
                        .next()
                        .cloned()
                        .ok_or_else(|| usage_error(format!("{} requires a value", name)))?,
                };
                flags.values.insert(name.to_string(), value);
            } else if SWITCHES.contains(&name) {
                flags.switches.insert(name.to_string());
            } else if name.starts_with("--") {
                return Err(usage_error(format!("unknown option '{}'", name)));
            } else {
                flags.positional.push(arg.clone());
            }
        }

        Ok(flags)
    }

    fn value(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    fn switch(&self, name: &str) -> bool {
        self.switches.contains(name)
    }

    /// `--repo`, or the current directory.
    fn repo(&self) -> Result<PathBuf> {
        let repo = match self.value("--repo") {
            Some(repo) => PathBuf::from(repo),
            None => std::env::current_dir()
                .map_err(|e| Error::config("failed to get current directory").with_source(e))?,
        };
        std::path::absolute(&repo).map_err(|e| {
            Error::config(format!("invalid repository path {}", repo.display())).with_source(e)
        })
    }
}
