//! Privilege-elevation boundary.
//!
//! Privileged mutations (whitelist add, policy apply/clear) run in the
//! out-of-process elevated helper. The unprivileged side only ever sends a
//! typed request and observes a typed outcome: the call blocks until the
//! helper exits or the configured bound elapses, and every failure below
//! the boundary is folded into an [`ExitOutcome`] -- the call itself is
//! infallible at the type level.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

/// Exit status the launcher reports when the helper could not be spawned
/// at all (distinct from any real helper exit code).
const SPAWN_FAILURE_STATUS: i32 = -1;

/// A privileged operation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrivilegedOp {
    /// Compile and apply policy from the current whitelist.
    Apply,
    /// Deactivate enforcement flags.
    Clear,
    /// Composite: enroll the id, re-apply policy, refresh and re-probe.
    Add(String),
}

impl PrivilegedOp {
    /// Helper CLI arguments for this operation.
    pub fn args(&self) -> Vec<String> {
        match self {
            PrivilegedOp::Apply => vec!["apply".to_string()],
            PrivilegedOp::Clear => vec!["clear".to_string()],
            PrivilegedOp::Add(id) => vec!["add".to_string(), id.clone()],
        }
    }

    /// Operation name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            PrivilegedOp::Apply => "apply",
            PrivilegedOp::Clear => "clear",
            PrivilegedOp::Add(_) => "add",
        }
    }
}

/// Outcome of one privileged invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
    /// The helper exited with a success status.
    Success,
    /// The elevation request itself was rejected or cancelled by the
    /// user/administrator. Distinct from a failed operation.
    Denied,
    /// The helper did not exit within the bound. The in-flight process is
    /// left alone; cancellation is user-initiated only.
    Timeout,
    /// The helper ran but reported a non-success exit status.
    Failure(i32),
}

impl std::fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitOutcome::Success => write!(f, "success"),
            ExitOutcome::Denied => write!(f, "elevation denied"),
            ExitOutcome::Timeout => write!(f, "timed out"),
            ExitOutcome::Failure(code) => write!(f, "failed with status {code}"),
        }
    }
}

/// Boundary through which the unprivileged side requests privileged
/// operations.
#[async_trait]
pub trait PrivilegeBoundary: Send + Sync {
    /// Run one privileged operation to completion, bounded in time.
    async fn run(&self, op: PrivilegedOp) -> ExitOutcome;
}

/// Launcher that requests elevation from the OS and runs the helper.
#[derive(Debug, Clone)]
pub struct ElevationLauncher {
    elevate_command: Vec<String>,
    helper_path: PathBuf,
    config_path: Option<PathBuf>,
    timeout: Duration,
    denied_exit_codes: Vec<i32>,
}

impl ElevationLauncher {
    pub fn new(
        elevate_command: Vec<String>,
        helper_path: PathBuf,
        config_path: Option<PathBuf>,
        timeout: Duration,
        denied_exit_codes: Vec<i32>,
    ) -> Self {
        Self { elevate_command, helper_path, config_path, timeout, denied_exit_codes }
    }

    /// Full argv for one invocation: elevation prefix, helper path,
    /// optional config forwarding, then the operation arguments.
    fn argv(&self, op: &PrivilegedOp) -> Vec<String> {
        let mut argv = self.elevate_command.clone();
        argv.push(self.helper_path.display().to_string());
        if let Some(config) = &self.config_path {
            argv.push("--config".to_string());
            argv.push(config.display().to_string());
        }
        argv.extend(op.args());
        argv
    }
}

#[async_trait]
impl PrivilegeBoundary for ElevationLauncher {
    async fn run(&self, op: PrivilegedOp) -> ExitOutcome {
        let argv = self.argv(&op);
        let Some((program, args)) = argv.split_first() else {
            warn!(op = op.name(), "no elevation command configured");
            return ExitOutcome::Failure(SPAWN_FAILURE_STATUS);
        };
        debug!(op = op.name(), program = %program, "requesting elevated helper");

        let mut child = match tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                warn!(op = op.name(), program = %program, error = %e, "failed to launch elevated helper");
                return ExitOutcome::Failure(SPAWN_FAILURE_STATUS);
            }
        };

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                warn!(op = op.name(), error = %e, "failed waiting for elevated helper");
                return ExitOutcome::Failure(SPAWN_FAILURE_STATUS);
            }
            Err(_) => {
                // Logged distinctly from denial for diagnosis; the helper
                // process is not killed from this side.
                warn!(op = op.name(), timeout_secs = self.timeout.as_secs(), "elevated helper did not exit within bound");
                return ExitOutcome::Timeout;
            }
        };

        match status.code() {
            Some(0) => ExitOutcome::Success,
            Some(code) if self.denied_exit_codes.contains(&code) => {
                debug!(op = op.name(), code, "elevation request denied");
                ExitOutcome::Denied
            }
            Some(code) => ExitOutcome::Failure(code),
            // Terminated by signal.
            None => ExitOutcome::Failure(SPAWN_FAILURE_STATUS),
        }
    }
}
