//! Layered configuration.
//!
//! Resolved once at process start: built-in defaults, then an optional
//! `issue-flow.toml` at the repository root, then `ISSUE_FLOW_*`
//! environment overrides. Validated before any run starts.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::retry::RetryPolicyConfig;
use crate::tracker::DEFAULT_API_URL;

/// Name of the optional config file at the repository root.
pub const CONFIG_FILE: &str = "issue-flow.toml";

/// Short model names accepted in place of full model ids.
pub const MODEL_ALIASES: &[(&str, &str)] = &[
    ("haiku", "claude-3-5-haiku-20241022"),
    ("sonnet", "claude-sonnet-4-5-20250929"),
    ("opus", "claude-opus-4-5-20251101"),
];

/// Resolves a model alias to its full id; other values pass through.
pub fn resolve_model(model: &str) -> String {
    let model = model.trim();
    MODEL_ALIASES
        .iter()
        .find(|(alias, _)| alias.eq_ignore_ascii_case(model))
        .map_or_else(|| model.to_string(), |(_, id)| id.to_string())
}

/// Process-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Root of run artifacts and workspaces. Relative paths are resolved
    /// against the repository.
    #[serde(default = "default_logs_root")]
    pub logs_root: PathBuf,
    /// Root of the skills tree; no skills are loaded when unset.
    #[serde(default)]
    pub skills_root: Option<PathBuf>,
    /// Optional skills loaded for apply runs.
    #[serde(default = "default_optional_skills")]
    pub optional_skills: Vec<String>,
    #[serde(default = "default_plan_model")]
    pub plan_model: String,
    #[serde(default = "default_apply_model")]
    pub apply_model: String,
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    /// Open review requests as drafts.
    #[serde(default = "default_draft")]
    pub draft: bool,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default)]
    pub retry: RetryPolicyConfig,
}

fn default_logs_root() -> PathBuf {
    PathBuf::from("logs")
}

fn default_optional_skills() -> Vec<String> {
    vec!["pr-draft".to_string()]
}

fn default_plan_model() -> String {
    "opus".to_string()
}

fn default_apply_model() -> String {
    "sonnet".to_string()
}

fn default_max_turns() -> u32 {
    500
}

fn default_draft() -> bool {
    true
}

fn default_api_base_url() -> String {
    DEFAULT_API_URL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logs_root: default_logs_root(),
            skills_root: None,
            optional_skills: default_optional_skills(),
            plan_model: default_plan_model(),
            apply_model: default_apply_model(),
            max_turns: default_max_turns(),
            draft: default_draft(),
            api_base_url: default_api_base_url(),
            retry: RetryPolicyConfig::default(),
        }
    }
}

impl Config {
    /// Loads the configuration for `repo` from the file and the process
    /// environment.
    pub fn load(repo: &Path) -> Result<Self> {
        Self::load_with(repo, |key| std::env::var(key).ok())
    }

    /// Like [`Config::load`] with an explicit environment lookup.
    pub fn load_with<F>(repo: &Path, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = repo.join(CONFIG_FILE);
        let mut config = if path.is_file() {
            let text = std::fs::read_to_string(&path).map_err(|e| {
                Error::config(format!("failed to read {}", path.display())).with_source(e)
            })?;
            Self::from_toml(&text).map_err(|e| {
                Error::config_with_suggestion(
                    format!("invalid {}", path.display()),
                    format!("Fix the syntax of {}", CONFIG_FILE),
                )
                .with_source(e)
            })?
        } else {
            Self::default()
        };

        config.apply_env(env);
        config.resolve_paths(repo);

        let warnings = config.validate().into_result()?;
        for warning in warnings {
            tracing::warn!(warning = %warning, "configuration warning");
        }

        tracing::debug!(config = ?config, "loaded configuration");
        Ok(config)
    }

    pub fn from_toml(text: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Applies `ISSUE_FLOW_*` overrides; blank values are ignored.
    pub fn apply_env<F>(&mut self, env: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            env(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(v) = get("ISSUE_FLOW_LOGS_ROOT") {
            self.logs_root = PathBuf::from(v);
        }
        if let Some(v) = get("ISSUE_FLOW_SKILLS_ROOT") {
            self.skills_root = Some(PathBuf::from(v));
        }
        if let Some(v) = get("ISSUE_FLOW_PLAN_MODEL") {
            self.plan_model = v;
        }
        if let Some(v) = get("ISSUE_FLOW_APPLY_MODEL") {
            self.apply_model = v;
        }
        if let Some(v) = get("ISSUE_FLOW_API_URL") {
            self.api_base_url = v;
        }
    }

    fn resolve_paths(&mut self, repo: &Path) {
        if self.logs_root.is_relative() {
            self.logs_root = repo.join(&self.logs_root);
        }
        if let Some(root) = &self.skills_root {
            if root.is_relative() {
                self.skills_root = Some(repo.join(root));
            }
        }
    }

    /// Full model id for plan runs.
    pub fn plan_model_id(&self) -> String {
        resolve_model(&self.plan_model)
    }

    /// Full model id for apply runs.
    pub fn apply_model_id(&self) -> String {
        resolve_model(&self.apply_model)
    }
}

/// Validation result containing all found issues.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// Fatal problems.
    pub errors: Vec<String>,
    /// Non-fatal problems.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    /// Converts to a Result carrying the warnings, failing if there are errors.
    pub fn into_result(self) -> Result<Vec<String>> {
        if self.is_valid() {
            Ok(self.warnings)
        } else {
            Err(Error::config(format!(
                "invalid configuration: {}",
                self.errors.join("; ")
            )))
        }
    }
}

/// Types that can check their own settings.
pub trait Validate {
    fn validate(&self) -> ValidationResult;
}

impl Validate for RetryPolicyConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.max_attempts == 0 {
            result.add_error("retry.max_attempts must be at least 1");
        }
        if !(self.backoff_multiplier.is_finite() && self.backoff_multiplier >= 1.0) {
            result.add_error("retry.backoff_multiplier must be a finite number >= 1");
        }
        if self.initial_delay_ms > self.max_delay_ms {
            result.add_warning("retry.initial_delay_ms exceeds max_delay_ms; delays are capped");
        }
        if self.max_attempts > 10 {
            result.add_warning("retry.max_attempts > 10 may hammer the GitHub API");
        }

        result
    }
}

impl Validate for Config {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.max_turns == 0 {
            result.add_error("max_turns must be at least 1");
        }
        if self.plan_model.trim().is_empty() || self.apply_model.trim().is_empty() {
            result.add_error("plan_model and apply_model must not be empty");
        }
        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://")
        {
            result.add_error(format!(
                "api_base_url '{}' is not an http(s) URL",
                self.api_base_url
            ));
        }
        if let Some(root) = &self.skills_root {
            if !root.is_dir() {
                result.add_warning(format!("skills_root {} does not exist", root.display()));
            }
        }

        let mut retry = self.retry.validate();
        result.errors.append(&mut retry.errors);
        result.warnings.append(&mut retry.warnings);

        result
    }
}
