//! Best-effort host policy refresh and device re-probe.
//!
//! After a policy write, the host is asked to re-evaluate policy
//! immediately (group-policy-style refresh) and to re-probe one specific
//! device instance so a just-whitelisted device becomes usable without a
//! reboot. Both are side-effecting external commands; failure is logged
//! and never surfaced to the caller, since the core policy write has
//! already succeeded by the time these run.

use std::process::Command;

use tracing::{debug, warn};

/// Placeholder replaced with the device-instance id in the re-probe
/// command; if absent, the id is appended as the final argument.
const INSTANCE_ID_PLACEHOLDER: &str = "{instance_id}";

/// Runner for the configured refresh and re-probe commands.
#[derive(Debug, Clone)]
pub struct HostRefresher {
    refresh_command: Vec<String>,
    reprobe_command: Vec<String>,
}

impl HostRefresher {
    pub fn new(refresh_command: Vec<String>, reprobe_command: Vec<String>) -> Self {
        Self { refresh_command, reprobe_command }
    }

    /// Ask the host to re-evaluate policy now. Best-effort.
    pub fn refresh_policy(&self) {
        run_best_effort("policy refresh", &self.refresh_command);
    }

    /// Ask the host to re-probe one device instance so it becomes usable
    /// without a reboot. Best-effort.
    pub fn reprobe_device(&self, instance_id: &str) {
        let argv = substitute_instance_id(&self.reprobe_command, instance_id);
        run_best_effort("device re-probe", &argv);
    }
}

fn substitute_instance_id(command: &[String], instance_id: &str) -> Vec<String> {
    if command.is_empty() {
        return Vec::new();
    }
    let mut substituted = false;
    let mut argv: Vec<String> = command
        .iter()
        .map(|arg| {
            if arg.contains(INSTANCE_ID_PLACEHOLDER) {
                substituted = true;
                arg.replace(INSTANCE_ID_PLACEHOLDER, instance_id)
            } else {
                arg.clone()
            }
        })
        .collect();
    if !substituted {
        argv.push(instance_id.to_string());
    }
    argv
}

fn run_best_effort(what: &str, argv: &[String]) {
    let Some((program, args)) = argv.split_first() else {
        debug!(what, "no command configured, skipping");
        return;
    };
    match Command::new(program).args(args).status() {
        Ok(status) if status.success() => debug!(what, "completed"),
        Ok(status) => warn!(what, %status, "command reported failure"),
        Err(e) => warn!(what, program = %program, error = %e, "command failed to start"),
    }
}
