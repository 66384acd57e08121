//! Persistent policy store abstraction.
//!
//! The host's native policy store is a key-value structure under a fixed
//! policy path: boolean flags plus child lists whose entries are keyed
//! `"1","2","3",...` in insertion order and fully replaced on every write.
//! [`PolicyStore`] carries exactly that interface so the compiler/applier
//! never touches the native representation directly. [`FilePolicyStore`]
//! persists it as a JSON document with every mutation individually
//! durable (mirroring per-value store write semantics);
//! [`MemoryPolicyStore`] is the in-memory fake for tests.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

/// A boolean flag in the policy store, with its native value name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PolicyFlag {
    /// Layered order of evaluation for allow/deny lists.
    LayeredEvaluation,
    /// Deny installation of devices not covered by any list.
    DenyUnspecified,
    /// Allow installation of devices matching the instance-id list.
    AllowByInstanceId,
    /// Deny installation of devices in the listed setup classes.
    DenyByClass,
    /// Retroactively remove already-installed devices in denied classes.
    /// Always written `false` by this system.
    RetroactiveDenyByClass,
}

impl PolicyFlag {
    /// Native value name under the policy path.
    pub fn key(self) -> &'static str {
        match self {
            PolicyFlag::LayeredEvaluation => "AllowDenyLayered",
            PolicyFlag::DenyUnspecified => "DenyUnspecified",
            PolicyFlag::AllowByInstanceId => "AllowDeviceInstanceIDs",
            PolicyFlag::DenyByClass => "DenyDeviceClasses",
            PolicyFlag::RetroactiveDenyByClass => "DenyDeviceClassesRetroactive",
        }
    }
}

/// A child list under the policy path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PolicyList {
    /// Allowed device-instance ids (the materialized whitelist).
    AllowInstanceIds,
    /// Denied device setup classes.
    DenyClasses,
}

impl PolicyList {
    /// Native subkey name under the policy path.
    pub fn key(self) -> &'static str {
        match self {
            PolicyList::AllowInstanceIds => "AllowDeviceInstanceIDs",
            PolicyList::DenyClasses => "DenyDeviceClasses",
        }
    }
}

/// Errors from the policy store backend.
#[derive(Debug, thiserror::Error)]
pub enum PolicyStoreError {
    #[error("failed to {action} policy store at {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode policy store document: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Write/read interface over the enforced policy state. Exclusively
/// written by the privileged actor; the unprivileged monitor never holds
/// a mutable reference to one.
pub trait PolicyStore {
    /// Set a boolean flag. Each call is individually durable.
    fn set_flag(&mut self, flag: PolicyFlag, enabled: bool) -> Result<(), PolicyStoreError>;

    /// Replace a child list wholesale: existing entries are cleared and
    /// `entries` are written keyed `"1","2",...` in the given order.
    fn replace_list(&mut self, list: PolicyList, entries: &[String]) -> Result<(), PolicyStoreError>;

    /// Read a flag; `None` if it has never been written.
    fn flag(&self, flag: PolicyFlag) -> Result<Option<bool>, PolicyStoreError>;

    /// Read a child list as `(key, value)` pairs in stored order.
    fn entries(&self, list: PolicyList) -> Result<Vec<(String, String)>, PolicyStoreError>;
}

/// On-disk shape of the file-backed store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct PolicyDocument {
    #[serde(default)]
    values: BTreeMap<String, bool>,
    #[serde(default)]
    lists: BTreeMap<String, Vec<String>>,
}

/// Policy store persisted as a single JSON document at a fixed path.
#[derive(Debug)]
pub struct FilePolicyStore {
    path: PathBuf,
    document: PolicyDocument,
}

impl FilePolicyStore {
    /// Open the store at `path`, reading the current document if present.
    /// A malformed document is logged and replaced on the next write.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let document = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(doc) => doc,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "malformed policy store document, starting fresh");
                    PolicyDocument::default()
                }
            },
            Err(_) => PolicyDocument::default(),
        };
        Self { path, document }
    }

    fn persist(&self) -> Result<(), PolicyStoreError> {
        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent).map_err(|source| PolicyStoreError::Io {
            action: "create directory for",
            path: parent.to_path_buf(),
            source,
        })?;

        let json = serde_json::to_string_pretty(&self.document)?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|source| PolicyStoreError::Io {
            action: "create temp file for",
            path: parent.to_path_buf(),
            source,
        })?;
        tmp.write_all(json.as_bytes()).map_err(|source| PolicyStoreError::Io {
            action: "write",
            path: self.path.clone(),
            source,
        })?;
        tmp.persist(&self.path).map_err(|e| PolicyStoreError::Io {
            action: "rename into place",
            path: self.path.clone(),
            source: e.error,
        })?;
        Ok(())
    }
}

impl PolicyStore for FilePolicyStore {
    fn set_flag(&mut self, flag: PolicyFlag, enabled: bool) -> Result<(), PolicyStoreError> {
        self.document.values.insert(flag.key().to_string(), enabled);
        self.persist()
    }

    fn replace_list(&mut self, list: PolicyList, entries: &[String]) -> Result<(), PolicyStoreError> {
        self.document.lists.insert(list.key().to_string(), entries.to_vec());
        self.persist()
    }

    fn flag(&self, flag: PolicyFlag) -> Result<Option<bool>, PolicyStoreError> {
        Ok(self.document.values.get(flag.key()).copied())
    }

    fn entries(&self, list: PolicyList) -> Result<Vec<(String, String)>, PolicyStoreError> {
        Ok(keyed_entries(self.document.lists.get(list.key())))
    }
}

/// In-memory policy store for tests and dry runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryPolicyStore {
    document: PolicyDocument,
}

impl PolicyStore for MemoryPolicyStore {
    fn set_flag(&mut self, flag: PolicyFlag, enabled: bool) -> Result<(), PolicyStoreError> {
        self.document.values.insert(flag.key().to_string(), enabled);
        Ok(())
    }

    fn replace_list(&mut self, list: PolicyList, entries: &[String]) -> Result<(), PolicyStoreError> {
        self.document.lists.insert(list.key().to_string(), entries.to_vec());
        Ok(())
    }

    fn flag(&self, flag: PolicyFlag) -> Result<Option<bool>, PolicyStoreError> {
        Ok(self.document.values.get(flag.key()).copied())
    }

    fn entries(&self, list: PolicyList) -> Result<Vec<(String, String)>, PolicyStoreError> {
        Ok(keyed_entries(self.document.lists.get(list.key())))
    }
}

/// Number the stored values `"1","2",...` in insertion order, matching the
/// native child-list keying.
fn keyed_entries(values: Option<&Vec<String>>) -> Vec<(String, String)> {
    values
        .map(|v| {
            v.iter()
                .enumerate()
                .map(|(i, value)| ((i + 1).to_string(), value.clone()))
                .collect()
        })
        .unwrap_or_default()
}
