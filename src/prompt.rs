//! Prompt assembly for the plan and apply workflows.
//!
//! Skills are markdown files under a configured skills root:
//! `global/*.md` are always-on guidance, `optional/<name>.md` or
//! `optional/<name>/SKILL.md` are opt-in.

use std::fs;
use std::path::Path;

use crate::tracker::Ticket;

/// Loads skills from `skills_root` and joins them with blank lines.
///
/// Each skill is prefixed with `## skill: <path relative to the root>`.
/// Missing or unreadable files are logged and skipped; a `None` root yields
/// an empty string.
pub fn load_skills(skills_root: Option<&Path>, global: bool, optional: &[String]) -> String {
    let Some(root) = skills_root else {
        return String::new();
    };
    let mut parts = Vec::new();

    if global {
        let global_dir = root.join("global");
        match fs::read_dir(&global_dir) {
            Ok(entries) => {
                let mut names: Vec<String> = entries
                    .filter_map(|entry| entry.ok())
                    .map(|entry| entry.file_name().to_string_lossy().into_owned())
                    .filter(|name| name.ends_with(".md"))
                    .collect();
                names.sort();

                for name in names {
                    match fs::read_to_string(global_dir.join(&name)) {
                        Ok(content) => {
                            parts.push(skill_section(&format!("global/{}", name), &content))
                        }
                        Err(e) => {
                            tracing::warn!(skill = %name, error = %e, "failed to read global skill")
                        }
                    }
                }
            }
            Err(e) => tracing::warn!(dir = ?global_dir, error = %e, "failed to load global skills"),
        }
    }

    let optional_dir = root.join("optional");
    for name in optional {
        let candidates = [format!("{}.md", name), format!("{}/SKILL.md", name)];
        let loaded = candidates.iter().find_map(|relative| {
            fs::read_to_string(optional_dir.join(relative))
                .ok()
                .map(|content| (relative, content))
        });

        match loaded {
            Some((relative, content)) => {
                parts.push(skill_section(&format!("optional/{}", relative), &content))
            }
            None => tracing::warn!(skill = %name, "optional skill not found"),
        }
    }

    parts.join("\n\n")
}

fn skill_section(relative: &str, content: &str) -> String {
    format!("## skill: {}\n\n{}", relative, content)
}

/// Prompt asking the agent to research `request` and answer with one fenced
/// YAML ticket block per proposed issue.
pub fn build_plan_prompt(request: &str, context: Option<&str>) -> String {
    let mut prompt = String::new();

    prompt.push_str("# Task: plan the work and draft GitHub issues\n\n");
    prompt.push_str(
        "Turn the request below into an implementation plan and express it as GitHub issues.\n\n",
    );
    prompt.push_str("## Request\n\n```\n");
    prompt.push_str(request.trim());
    prompt.push_str("\n```\n\n");

    if let Some(context) = context.filter(|c| !c.trim().is_empty()) {
        prompt.push_str("## Additional context\n\n");
        prompt.push_str(context.trim());
        prompt.push_str("\n\n");
    }

    prompt.push_str(
        "## Steps\n\n\
         1. Clarify the goal, background and scope.\n\
         2. Investigate the codebase as needed (Glob, Grep, Read).\n\
         3. Break the work into concrete tasks in implementation order.\n\
         4. Write the issues in the format below.\n\n\
         The issues will be implemented by a small model, so name the files to change, \
         describe each change concretely and give acceptance criteria that can be checked mechanically.\n\n",
    );

    prompt.push_str(
        "## Output format\n\n\
         Emit each issue as its own fenced ```yaml block:\n\n\
         ```yaml\n\
         title: \"Short, specific title\"\n\
         body: |\n  \
           ## Background\n  \
           Why the change is needed\n\n  \
           ## Scope\n  \
           - path/to/file: what changes\n\n  \
           ## Acceptance criteria\n  \
           - [ ] A concrete, verifiable criterion\n\
         labels:\n  \
           - enhancement\n\
         assignees: []\n\
         ```\n\n\
         Split large requests into several blocks. Mark anything that needs confirmation as such.\n",
    );

    prompt
}

/// Prompt asking the agent to implement `ticket` and finish with a fenced
/// YAML block holding `pr_title` and `pr_body`.
///
/// Skills are not part of the prompt; they travel as the system prompt
/// append.
pub fn build_apply_prompt(ticket: &Ticket) -> String {
    let mut prompt = String::new();

    prompt.push_str("# Task: implement a GitHub issue\n\n");
    prompt.push_str("## Issue\n\n");
    prompt.push_str(&format!("- **Title**: {}\n", ticket.title));
    prompt.push_str(&format!("- **Number**: #{}\n", ticket.number));
    prompt.push_str(&format!("- **URL**: {}\n", ticket.url));
    let labels = if ticket.labels.is_empty() {
        "none".to_string()
    } else {
        ticket.labels.join(", ")
    };
    prompt.push_str(&format!("- **Labels**: {}\n\n", labels));

    prompt.push_str("## Issue body\n\n````markdown\n");
    prompt.push_str(ticket.body.trim());
    prompt.push_str("\n````\n\n");

    prompt.push_str(
        "## Rules\n\n\
         1. Satisfy every acceptance criterion of the issue.\n\
         2. Keep changes to what the issue asks for; follow existing patterns.\n\
         3. Do not break existing tests.\n\
         4. Do not touch the logs/ directory.\n\
         5. Call out anything you could not decide as needing confirmation.\n\n",
    );

    prompt.push_str(
        "## Final report\n\n\
         When done, summarize the change, list the changed files and the state of each \
         acceptance criterion. Then give the pull request details as a fenced YAML block:\n\n\
         ```yaml\n\
         pr_title: \"Concise pull request title\"\n\
         pr_body: |\n  \
           ## Summary\n  \
           What changed and why\n\n  \
           ## Changes\n  \
           - path/to/file: change\n\
         ```\n",
    );

    prompt
}
