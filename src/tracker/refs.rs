//! Repository and ticket references.

use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::workspace::Git;

static REMOTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:(?:https?|ssh|git)://(?:[^@/]+@)?[^/]+/|[^@\s/]+@[^:\s/]+:)([^/\s]+)/([^/\s]+?)(?:\.git)?/?$",
    )
    .expect("valid remote regex")
});

static ISSUE_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/issues/(\d+)(?:[/?#]|$)").expect("valid issue url regex"));

/// Owner and name of a hosted repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Parses an HTTPS or SSH remote URL into its owner and repository name.
pub fn parse_remote_url(url: &str) -> Result<RepoRef> {
    let url = url.trim();
    let caps = REMOTE_RE.captures(url).ok_or_else(|| {
        Error::config_with_suggestion(
            format!("cannot parse repository from remote URL: {}", url),
            "Make sure `origin` points at a GitHub repository (https://github.com/owner/repo or git@github.com:owner/repo)",
        )
    })?;

    Ok(RepoRef {
        owner: caps[1].to_string(),
        name: caps[2].to_string(),
    })
}

/// Reads `origin`'s URL from `repo` and parses it.
pub async fn repo_ref_from_remote<G: Git + ?Sized>(git: &G, repo: &Path) -> Result<RepoRef> {
    let url = git
        .run(repo, &["remote", "get-url", "origin"])
        .await
        .map_err(|e| {
            Error::config_with_suggestion(
                format!("cannot read remote `origin` of {}", repo.display()),
                "Add a GitHub remote named `origin`",
            )
            .with_source(e)
        })?;
    parse_remote_url(&url)
}

/// Parses a ticket reference: `42`, `#42`, or a URL containing `/issues/42`.
pub fn parse_ticket_ref(reference: &str) -> Result<u64> {
    let reference = reference.trim();
    let digits = reference.strip_prefix('#').unwrap_or(reference);
    if let Ok(number) = digits.parse::<u64>() {
        if number > 0 {
            return Ok(number);
        }
    }

    ISSUE_URL_RE
        .captures(reference)
        .and_then(|caps| caps[1].parse::<u64>().ok())
        .filter(|n| *n > 0)
        .ok_or_else(|| Error::parse(format!("cannot parse issue number from {:?}", reference)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn parses_https_and_ssh_remotes() {
        let cases = [
            ("https://github.com/octo/widgets.git", "octo", "widgets"),
            ("https://github.com/octo/widgets", "octo", "widgets"),
            ("https://token@github.com/octo/widgets.git\n", "octo", "widgets"),
            ("git@github.com:octo/widgets.git", "octo", "widgets"),
            ("git@github.com:octo/my.repo.git", "octo", "my.repo"),
            ("ssh://git@github.com/octo/widgets.git", "octo", "widgets"),
        ];
        for (url, owner, name) in cases {
            let repo = parse_remote_url(url).unwrap();
            assert_eq!((repo.owner.as_str(), repo.name.as_str()), (owner, name), "{}", url);
        }
    }

    #[test]
    fn unparseable_remote_is_configuration_error() {
        for url in ["", "/local/path/repo", "https://github.com/only-owner"] {
            let err = parse_remote_url(url).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Configuration, "{}", url);
        }
    }

    #[test]
    fn repo_ref_displays_as_slug() {
        let repo = parse_remote_url("git@github.com:octo/widgets.git").unwrap();
        assert_eq!(repo.to_string(), "octo/widgets");
    }

    #[test]
    fn parses_ticket_references() {
        assert_eq!(parse_ticket_ref("42").unwrap(), 42);
        assert_eq!(parse_ticket_ref("#7").unwrap(), 7);
        assert_eq!(
            parse_ticket_ref("https://github.com/octo/widgets/issues/123").unwrap(),
            123
        );
        assert_eq!(
            parse_ticket_ref("https://github.com/octo/widgets/issues/9#issuecomment-1").unwrap(),
            9
        );
    }

    #[test]
    fn rejects_bad_ticket_references() {
        for reference in ["", "abc", "#", "0", "https://github.com/octo/widgets/pull/3"] {
            let err = parse_ticket_ref(reference).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Parse, "{}", reference);
        }
    }
}
