//! Run configuration for patchchain
//!
//! Read from `--config`, else `<root>/patchchain.toml`, else defaults.

use anyhow::{anyhow, Context, Result};
use patchchain_core::outcome::{BudgetPolicy, DEFAULT_BUDGET_CAP, DEFAULT_BUDGET_GROWTH};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "patchchain.toml";
pub const TOOL_ENV_VAR: &str = "PATCHCHAIN_TOOL";
const DEFAULT_TOOL: &str = "abc";

/// What to do when the tool exits unsuccessfully.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExitPolicy {
    /// Only the log text and produced files matter.
    #[default]
    Ignore,
    /// A non-zero exit or a timeout aborts the run.
    Require,
}

impl ExitPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitPolicy::Ignore => "ignore",
            ExitPolicy::Require => "require",
        }
    }
}

fn default_tool() -> String {
    DEFAULT_TOOL.to_string()
}

fn default_true() -> bool {
    true
}

fn default_budget_growth() -> f64 {
    DEFAULT_BUDGET_GROWTH
}

fn default_budget_cap() -> u32 {
    DEFAULT_BUDGET_CAP
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Rewriting tool executable.
    #[serde(default = "default_tool")]
    pub tool: String,
    #[serde(default)]
    pub exit_policy: ExitPolicy,
    /// Unset means wait for the tool indefinitely.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default = "default_budget_growth")]
    pub budget_growth: f64,
    #[serde(default = "default_budget_cap")]
    pub budget_cap: u32,
    /// Normalize `partSyn.aig` with a second tool pass after each attempt.
    #[serde(default = "default_true")]
    pub sweep: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tool: default_tool(),
            exit_policy: ExitPolicy::default(),
            timeout_secs: None,
            budget_growth: DEFAULT_BUDGET_GROWTH,
            budget_cap: DEFAULT_BUDGET_CAP,
            sweep: true,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config '{}'", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to load config '{}'", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Explicit path first, then the file next to the chain, then defaults.
    /// `PATCHCHAIN_TOOL` overrides the tool either way.
    pub fn resolve(root: &Path, explicit: Option<&Path>) -> Result<Self> {
        let candidate: Option<PathBuf> = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => Some(root.join(CONFIG_FILE_NAME)).filter(|p| p.is_file()),
        };
        let mut config = match candidate {
            Some(path) => Self::load(&path)?,
            None => Self::default(),
        };
        if let Ok(tool) = std::env::var(TOOL_ENV_VAR) {
            if !tool.trim().is_empty() {
                config.tool = tool;
            }
        }
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.tool.trim().is_empty() {
            return Err(anyhow!("tool must not be empty"));
        }
        if !self.budget_growth.is_finite() || self.budget_growth <= 1.0 {
            return Err(anyhow!(
                "budget_growth must be greater than 1.0 (got {})",
                self.budget_growth
            ));
        }
        if self.budget_cap == 0 {
            return Err(anyhow!("budget_cap must be positive"));
        }
        if self.timeout_secs == Some(0) {
            return Err(anyhow!("timeout_secs must be positive when set"));
        }
        Ok(())
    }

    pub fn budget_policy(&self) -> BudgetPolicy {
        BudgetPolicy {
            growth: self.budget_growth,
            cap: self.budget_cap,
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}
