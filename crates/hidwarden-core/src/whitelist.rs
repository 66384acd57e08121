//! Durable store of enrolled device-instance identifiers.
//!
//! The whitelist is a single JSON document holding an array of unique,
//! non-empty instance-id strings. Absence or a malformed document reads as
//! "nothing enrolled yet" -- never as a fatal error -- so a fresh host and a
//! corrupted store both degrade to the safe default of prompting for every
//! device. Writes go through a temp file in the same directory plus an
//! atomic rename, so no reader can observe a torn document.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

/// File-backed whitelist of enrolled device-instance ids.
#[derive(Debug, Clone)]
pub struct WhitelistStore {
    path: PathBuf,
}

impl WhitelistStore {
    /// Create a store over the document at `path`. The file is not touched
    /// until the first [`save`](Self::save) or [`add`](Self::add).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the underlying document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the enrolled set. Never fails: a missing, unreadable, or
    /// malformed document yields an empty set (logged at warn for the
    /// malformed case). Non-string and empty entries are dropped.
    pub fn load(&self) -> BTreeSet<String> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "whitelist document absent, treating as empty");
                return BTreeSet::new();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read whitelist, treating as empty");
                return BTreeSet::new();
            }
        };

        match serde_json::from_str::<serde_json::Value>(&content) {
            Ok(serde_json::Value::Array(items)) => items
                .into_iter()
                .filter_map(|v| match v {
                    serde_json::Value::String(s) if !s.is_empty() => Some(s),
                    _ => None,
                })
                .collect(),
            Ok(_) => {
                warn!(path = %self.path.display(), "whitelist document is not an array, treating as empty");
                BTreeSet::new()
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "malformed whitelist document, treating as empty");
                BTreeSet::new()
            }
        }
    }

    /// Persist the full set, deduplicated, in sorted order. The write is
    /// atomic from a reader's perspective: temp file in the target
    /// directory, then rename over the destination.
    pub fn save(&self, entries: &BTreeSet<String>) -> Result<()> {
        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating whitelist directory {}", parent.display()))?;

        // BTreeSet iteration gives the stable sorted order.
        let items: Vec<&String> = entries.iter().collect();
        let json = serde_json::to_string_pretty(&items)?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .with_context(|| format!("creating temp file in {}", parent.display()))?;
        tmp.write_all(json.as_bytes())
            .context("writing whitelist temp file")?;
        tmp.flush().context("flushing whitelist temp file")?;
        tmp.persist(&self.path)
            .with_context(|| format!("renaming whitelist into place at {}", self.path.display()))?;

        debug!(path = %self.path.display(), count = entries.len(), "whitelist saved");
        Ok(())
    }

    /// Enroll one instance id. Idempotent: an empty id or an id that is
    /// already present is a no-op. Returns `true` if the set changed.
    pub fn add(&self, instance_id: &str) -> Result<bool> {
        if instance_id.is_empty() {
            return Ok(false);
        }
        let mut entries = self.load();
        if !entries.insert(instance_id.to_string()) {
            debug!(instance_id, "already whitelisted, nothing to do");
            return Ok(false);
        }
        self.save(&entries)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> WhitelistStore {
        WhitelistStore::new(dir.path().join("whitelist_instance_ids.json"))
    }

    #[test]
    fn missing_document_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        assert!(store_in(&dir).load().is_empty());
    }

    #[test]
    fn round_trip_preserves_set() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let entries: BTreeSet<String> = ["HID\\VID_1&PID_2", "ACPI\\PNP0303\\0"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        store.save(&entries).unwrap();
        assert_eq!(store.load(), entries);
    }

    #[test]
    fn add_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        assert!(store.add("HID\\VID_1&PID_2").unwrap());
        assert!(!store.add("HID\\VID_1&PID_2").unwrap());
        let entries = store.load();
        assert_eq!(entries.len(), 1);
        assert!(entries.contains("HID\\VID_1&PID_2"));
    }

    #[test]
    fn empty_id_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        assert!(!store.add("").unwrap());
        assert!(store.load().is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn malformed_document_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "{ not json").unwrap();
        assert!(store.load().is_empty());

        std::fs::write(store.path(), "{\"unexpected\": \"shape\"}").unwrap();
        assert!(store.load().is_empty());
    }

    #[test]
    fn non_string_and_empty_entries_are_dropped() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "[\"HID\\\\A\", 42, \"\", null]").unwrap();
        let entries = store.load();
        assert_eq!(entries.len(), 1);
        assert!(entries.contains("HID\\A"));
    }

    #[test]
    fn save_writes_sorted_unique_document() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let entries: BTreeSet<String> =
            ["b", "a", "c"].iter().map(|s| s.to_string()).collect();
        store.save(&entries).unwrap();
        let raw = std::fs::read_to_string(store.path()).unwrap();
        let parsed: Vec<String> = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, vec!["a", "b", "c"]);
    }
}
