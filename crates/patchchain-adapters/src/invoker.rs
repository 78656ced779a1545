//! Command lines for the rewriting tool.
//!
//! Every call is an explicit program + argument vector run inside a step
//! directory, with combined output captured to a log file there. The
//! [`Invoker`] trait is the seam tests replace.

use crate::config::{Config, ExitPolicy};
use crate::util::run_command_with_timeout;
use anyhow::{anyhow, Context, Result};
use patchchain_core::info::InfoRecord;
use patchchain_core::store::{COEF_FILE, INPUT_ARTIFACT, RESULT_LOG};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const SWEEP_LOG: &str = "sweep.log";
pub const PARTIAL_ARTIFACT: &str = "partSyn.aig";
pub const PARTIAL_STAT: &str = "partSyn.stat";
const SWEEP_ARTIFACT: &str = "syn.aig";
const SWEEP_STAT: &str = "syn.stat";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub name: String,
    pub cwd: PathBuf,
    pub program: String,
    pub args: Vec<String>,
    /// File under `cwd` receiving stdout followed by stderr.
    pub log_name: String,
}

impl Invocation {
    pub fn new(name: impl Into<String>, cwd: impl AsRef<Path>, program: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cwd: cwd.as_ref().to_path_buf(),
            program: program.into(),
            args: Vec::new(),
            log_name: RESULT_LOG.to_string(),
        }
    }

    pub fn args(mut self, args: &[&str]) -> Self {
        self.args = args.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn log_name(mut self, name: &str) -> Self {
        self.log_name = name.to_string();
        self
    }

    pub fn log_path(&self) -> PathBuf {
        self.cwd.join(&self.log_name)
    }

    pub fn label(&self) -> String {
        format!("{} {}", self.program, self.args.join(" "))
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationReport {
    pub log_path: PathBuf,
    pub exit_code: Option<i32>,
    pub success: bool,
    pub timed_out: bool,
    pub duration_ms: u64,
}

pub trait Invoker {
    fn invoke(&self, invocation: &Invocation) -> Result<InvocationReport>;
}

impl<T: Invoker + ?Sized> Invoker for &T {
    fn invoke(&self, invocation: &Invocation) -> Result<InvocationReport> {
        (**self).invoke(invocation)
    }
}

/// Spawns the real process and blocks until it exits (or the optional
/// timeout fires).
#[derive(Debug, Clone, Default)]
pub struct ProcessInvoker {
    timeout: Option<Duration>,
}

impl ProcessInvoker {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

impl Invoker for ProcessInvoker {
    fn invoke(&self, invocation: &Invocation) -> Result<InvocationReport> {
        let mut command = Command::new(&invocation.program);
        command.current_dir(&invocation.cwd).args(&invocation.args);

        debug!(cwd = %invocation.cwd.display(), "running {}", invocation.label());
        let result = run_command_with_timeout(&mut command, self.timeout)
            .with_context(|| format!("Failed to run '{}'", invocation.label()))?;

        let log_path = invocation.log_path();
        let mut log = fs::File::create(&log_path)
            .with_context(|| format!("Failed to create '{}'", log_path.display()))?;
        log.write_all(&result.stdout)
            .and_then(|_| log.write_all(&result.stderr))
            .with_context(|| format!("Failed to write '{}'", log_path.display()))?;

        Ok(InvocationReport {
            log_path,
            exit_code: result.exit_code(),
            success: result.success(),
            timed_out: result.timed_out,
            duration_ms: result.duration.as_millis() as u64,
        })
    }
}

/// Builds and runs the tool's commands for one attempt.
#[derive(Debug, Clone)]
pub struct ToolRunner<I> {
    invoker: I,
    tool: String,
    exit_policy: ExitPolicy,
    sweep: bool,
}

impl ToolRunner<ProcessInvoker> {
    pub fn from_config(config: &Config) -> Self {
        Self::new(ProcessInvoker::new(config.timeout()), config)
    }
}

impl<I: Invoker> ToolRunner<I> {
    pub fn new(invoker: I, config: &Config) -> Self {
        Self {
            invoker,
            tool: config.tool.clone(),
            exit_policy: config.exit_policy,
            sweep: config.sweep,
        }
    }

    /// `&read _init.aig; &fdrw <basicCmd> -F _coef.log -C <budget>`
    pub fn attempt_invocation(&self, dir: &Path, record: &InfoRecord) -> Invocation {
        let mut script = format!("&read {}; &fdrw", INPUT_ARTIFACT);
        if !record.base_command.trim().is_empty() {
            script.push(' ');
            script.push_str(record.base_command.trim());
        }
        script.push_str(&format!(" -F {} -C {}", COEF_FILE, record.budget));
        Invocation::new("attempt", dir, &self.tool).args(&["-c", script.as_str()])
    }

    pub fn sweep_invocation(&self, dir: &Path) -> Invocation {
        let script = format!("&read {}; &fdrw -S {} -N -2", PARTIAL_ARTIFACT, PARTIAL_STAT);
        Invocation::new("sweep", dir, &self.tool)
            .args(&["-c", script.as_str()])
            .log_name(SWEEP_LOG)
    }

    /// Run one attempt in `dir` and return the path of its result log. A
    /// partial-synthesis artifact left behind is normalized by the sweep pass.
    pub fn run_attempt(&self, dir: &Path, record: &InfoRecord) -> Result<PathBuf> {
        let invocation = self.attempt_invocation(dir, record);
        info!(budget = record.budget, "{}", invocation.label());
        let report = self.invoker.invoke(&invocation)?;
        debug!(
            duration_ms = report.duration_ms,
            exit_code = ?report.exit_code,
            "attempt finished"
        );
        self.enforce_exit_policy(&invocation, &report)?;

        if self.sweep && dir.join(PARTIAL_ARTIFACT).is_file() {
            self.run_sweep(dir)?;
        }
        Ok(report.log_path)
    }

    pub fn run_sweep(&self, dir: &Path) -> Result<()> {
        let invocation = self.sweep_invocation(dir);
        debug!("sweeping {}", dir.join(PARTIAL_ARTIFACT).display());
        let report = self.invoker.invoke(&invocation)?;
        self.enforce_exit_policy(&invocation, &report)?;

        for (from, to) in [(SWEEP_ARTIFACT, PARTIAL_ARTIFACT), (SWEEP_STAT, PARTIAL_STAT)] {
            let source = dir.join(from);
            if !source.is_file() {
                warn!("sweep left no '{}' in {}", from, dir.display());
                continue;
            }
            fs::rename(&source, dir.join(to)).with_context(|| {
                format!("Failed to move '{}' onto '{}'", source.display(), to)
            })?;
        }
        Ok(())
    }

    fn enforce_exit_policy(&self, invocation: &Invocation, report: &InvocationReport) -> Result<()> {
        if report.success {
            return Ok(());
        }
        match self.exit_policy {
            ExitPolicy::Ignore => {
                debug!(
                    exit_code = ?report.exit_code,
                    timed_out = report.timed_out,
                    "ignoring unsuccessful {} run",
                    invocation.name
                );
                Ok(())
            }
            ExitPolicy::Require if report.timed_out => Err(anyhow!(
                "'{}' timed out in {}",
                invocation.label(),
                invocation.cwd.display()
            )),
            ExitPolicy::Require => Err(anyhow!(
                "'{}' failed with exit code {:?} in {} (see {})",
                invocation.label(),
                report.exit_code,
                invocation.cwd.display(),
                report.log_path.display()
            )),
        }
    }
}
