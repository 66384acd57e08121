//! Application settings and TOML configuration parsing.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Top-level hidwarden configuration, loaded from a TOML file.
///
/// Every field has a default so a missing config file yields a usable
/// (if inert) configuration; the enumerate command and the enrollment
/// secret digest must be set before the monitor is useful.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WardenConfig {
    /// Path to the whitelist JSON document.
    #[serde(default = "default_whitelist_path")]
    pub whitelist_path: PathBuf,

    /// Path to the persisted policy store document.
    #[serde(default = "default_policy_store_path")]
    pub policy_store_path: PathBuf,

    /// Base path for the JSON-lines audit log. The monitor and the
    /// elevated helper each append to their own file derived from it.
    #[serde(default = "default_audit_log_path")]
    pub audit_log_path: PathBuf,

    /// Path to the monitor's single-instance lock file. Fixed name by
    /// default; a second monitor on the same host must see the same path.
    #[serde(default = "default_instance_lock_path")]
    pub instance_lock_path: PathBuf,

    /// Poll interval for the monitor loop, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// External device-enumeration provider command. Its stdout must be a
    /// JSON array of `{instance_id, display_name}` objects.
    #[serde(default)]
    pub enumerate_command: Vec<String>,

    /// Command prefix that requests OS privilege elevation for the helper
    /// (e.g. `["pkexec"]`).
    #[serde(default = "default_elevate_command")]
    pub elevate_command: Vec<String>,

    /// Path to the privileged helper binary.
    #[serde(default = "default_helper_path")]
    pub helper_path: PathBuf,

    /// Bound on one privileged invocation, in seconds.
    #[serde(default = "default_elevation_timeout_secs")]
    pub elevation_timeout_secs: u64,

    /// Helper exit codes that mean the elevation request itself was
    /// rejected or cancelled, as opposed to the operation failing.
    /// Defaults match pkexec (126 dismissed, 127 not authorized).
    #[serde(default = "default_denied_exit_codes")]
    pub denied_exit_codes: Vec<i32>,

    /// Best-effort host policy refresh command, run after policy writes.
    #[serde(default)]
    pub refresh_command: Vec<String>,

    /// Best-effort device re-probe command. `{instance_id}` in an argument
    /// is substituted; otherwise the id is appended.
    #[serde(default)]
    pub reprobe_command: Vec<String>,

    /// SHA-256 hex digest of the enrollment secret. Empty rejects all
    /// enrollment attempts.
    #[serde(default)]
    pub secret_sha256: String,

    /// Log level when `HIDWARDEN_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl WardenConfig {
    /// Load configuration from `path`; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: WardenConfig = toml::from_str(&contents)?;
        Ok(config)
    }
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            whitelist_path: default_whitelist_path(),
            policy_store_path: default_policy_store_path(),
            audit_log_path: default_audit_log_path(),
            instance_lock_path: default_instance_lock_path(),
            poll_interval_ms: default_poll_interval_ms(),
            enumerate_command: Vec::new(),
            elevate_command: default_elevate_command(),
            helper_path: default_helper_path(),
            elevation_timeout_secs: default_elevation_timeout_secs(),
            denied_exit_codes: default_denied_exit_codes(),
            refresh_command: Vec::new(),
            reprobe_command: Vec::new(),
            secret_sha256: String::new(),
            log_level: default_log_level(),
        }
    }
}

fn data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("HIDWARDEN_DATA_DIR") {
        return PathBuf::from(dir);
    }
    PathBuf::from("/var/lib/hidwarden")
}

fn default_whitelist_path() -> PathBuf {
    data_dir().join("whitelist_instance_ids.json")
}

fn default_policy_store_path() -> PathBuf {
    data_dir().join("policy_store.json")
}

fn default_audit_log_path() -> PathBuf {
    data_dir().join("audit.jsonl")
}

fn default_instance_lock_path() -> PathBuf {
    data_dir().join("monitor.lock")
}

fn default_poll_interval_ms() -> u64 {
    1200
}

fn default_elevate_command() -> Vec<String> {
    vec!["pkexec".to_string()]
}

fn default_helper_path() -> PathBuf {
    PathBuf::from("hidwarden-helper")
}

fn default_elevation_timeout_secs() -> u64 {
    30
}

fn default_denied_exit_codes() -> Vec<i32> {
    vec![126, 127]
}

fn default_log_level() -> String {
    "info".to_string()
}
