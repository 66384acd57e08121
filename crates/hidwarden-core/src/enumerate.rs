//! Device-enumeration provider interface.
//!
//! Enumeration of currently present devices is an external collaborator:
//! the monitor only needs a synchronous, idempotent query producing a
//! finite sequence of descriptors, re-issued each tick. The default
//! implementation shells out to a configured provider command whose
//! stdout is a JSON array of `{instance_id, display_name}` objects.

use std::collections::BTreeMap;
use std::process::Command;

use anyhow::{bail, Context, Result};

use crate::classify::{is_input_like, DeviceDescriptor};

/// Synchronous, idempotent query for all currently present devices.
pub trait DeviceEnumerator: Send + Sync {
    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>>;
}

/// Enumerator backed by an external provider command.
#[derive(Debug, Clone)]
pub struct CommandEnumerator {
    command: Vec<String>,
}

impl CommandEnumerator {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl DeviceEnumerator for CommandEnumerator {
    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>> {
        let Some((program, args)) = self.command.split_first() else {
            bail!("no device enumeration command configured (set enumerate_command)");
        };
        let output = Command::new(program)
            .args(args)
            .output()
            .with_context(|| format!("running device enumeration command '{program}'"))?;
        if !output.status.success() {
            bail!("device enumeration command '{program}' exited with {}", output.status);
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_devices(&stdout)
    }
}

/// Parse the provider's JSON output into descriptors.
pub fn parse_devices(json: &str) -> Result<Vec<DeviceDescriptor>> {
    serde_json::from_str(json).context("parsing device enumeration output")
}

/// Reduce a full enumeration to the candidate map of input-like devices,
/// keyed by instance id with the display name as value. Recomputed each
/// poll tick; no identity beyond the tick.
pub fn candidate_map(devices: &[DeviceDescriptor]) -> BTreeMap<String, String> {
    devices
        .iter()
        .filter(|d| is_input_like(d))
        .map(|d| (d.instance_id.clone(), d.display_name.clone()))
        .collect()
}
