//! Audit trail of detections, enrollments, and policy writes.
//!
//! Records are appended as JSON lines. Each role writes its own file
//! derived from the configured base path: the helper runs elevated, and a
//! root-owned log would make every later unprivileged append fail. The
//! audit log is diagnostic, never load-bearing: a failed append is logged
//! and dropped so enforcement is never blocked on bookkeeping.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    /// A new unwhitelisted input-like device appeared.
    DeviceDetected,
    /// The operator dismissed the enrollment prompt.
    PromptDismissed,
    /// A device was enrolled and policy re-applied.
    Enrolled,
    /// Enrollment was attempted but the privileged operation did not
    /// succeed (elevation denied, timed out, or failed).
    EnrollmentFailed,
    /// The privileged actor applied the policy.
    PolicyApplied,
    /// The privileged actor cleared the policy.
    PolicyCleared,
}

/// A single audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: AuditKind,
    /// Device-instance id the entry refers to; empty for policy-wide ops.
    #[serde(default)]
    pub instance_id: String,
    /// Free-text detail (outcome, display name, error).
    #[serde(default)]
    pub detail: String,
}

impl AuditRecord {
    pub fn new(kind: AuditKind, instance_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            kind,
            instance_id: instance_id.into(),
            detail: detail.into(),
        }
    }
}

/// Which process is writing. The monitor runs unprivileged and the helper
/// runs elevated; they must not share one append-only file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditRole {
    Monitor,
    Helper,
}

impl AuditRole {
    fn suffix(self) -> &'static str {
        match self {
            AuditRole::Monitor => "monitor",
            AuditRole::Helper => "helper",
        }
    }
}

/// Append-only JSON-lines audit log.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Log for one role, writing `<stem>-<role>.<ext>` next to the
    /// configured base path.
    pub fn for_role(base: impl Into<PathBuf>, role: AuditRole) -> Self {
        let base = base.into();
        let stem = base.file_stem().and_then(|s| s.to_str()).unwrap_or("audit");
        let ext = base.extension().and_then(|s| s.to_str()).unwrap_or("jsonl");
        let path = base.with_file_name(format!("{stem}-{}.{ext}", role.suffix()));
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record, creating the file and its directory on first use.
    pub fn append(&self, record: &AuditRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating audit log directory {}", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening audit log {}", self.path.display()))?;
        let json = serde_json::to_string(record)?;
        writeln!(file, "{json}").context("appending audit record")?;
        Ok(())
    }

    /// Append, logging and swallowing any failure.
    pub fn record(&self, kind: AuditKind, instance_id: &str, detail: &str) {
        let record = AuditRecord::new(kind, instance_id, detail);
        if let Err(e) = self.append(&record) {
            warn!(error = %e, "failed to write audit record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn appends_json_lines() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::new(dir.path().join("audit").join("hidwarden.jsonl"));
        log.append(&AuditRecord::new(AuditKind::DeviceDetected, "HID\\A", "USB Keyboard"))
            .unwrap();
        log.append(&AuditRecord::new(AuditKind::Enrolled, "HID\\A", "")).unwrap();

        let content = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: AuditRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.kind, AuditKind::DeviceDetected);
        assert_eq!(first.instance_id, "HID\\A");
    }

    #[test]
    fn roles_write_to_separate_files() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("audit.jsonl");
        let monitor = AuditLog::for_role(&base, AuditRole::Monitor);
        let helper = AuditLog::for_role(&base, AuditRole::Helper);
        assert_ne!(monitor.path(), helper.path());
        assert_eq!(monitor.path(), dir.path().join("audit-monitor.jsonl"));
        assert_eq!(helper.path(), dir.path().join("audit-helper.jsonl"));

        helper.record(AuditKind::Enrolled, "HID\\A", "");
        monitor.record(AuditKind::DeviceDetected, "HID\\A", "USB Keyboard");
        assert!(monitor.path().exists());
        assert!(helper.path().exists());
        // Neither role touches the other's file.
        assert!(!base.exists());
    }

    #[test]
    fn record_never_panics_on_unwritable_path() {
        let log = AuditLog::new("/proc/definitely-not-writable/audit.jsonl");
        log.record(AuditKind::PolicyApplied, "", "");
    }
}
