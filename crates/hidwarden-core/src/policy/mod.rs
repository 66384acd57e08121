//! Device-installation policy compiler/applier.
//!
//! The enforced policy has exactly one safe Active shape: layered
//! evaluation on, deny-unspecified on, allow-by-instance-id on with the
//! whitelist materialized, deny-by-class on with the fixed input-device
//! class list materialized, and retroactive deny explicitly off.
//!
//! [`apply`] refuses to write that shape for an empty whitelist -- the one
//! hard safety invariant of the whole system, since an Active policy with
//! no allowed instance ids would deny every input device including the
//! ones used to manage the host.

pub mod refresh;
pub mod store;

use std::collections::BTreeSet;

use tracing::info;

pub use store::{FilePolicyStore, MemoryPolicyStore, PolicyFlag, PolicyList, PolicyStore, PolicyStoreError};

/// Setup class id for keyboards.
pub const KEYBOARD_CLASS_ID: &str = "{4D36E96B-E325-11CE-BFC1-08002BE10318}";
/// Setup class id for mice and pointing devices.
pub const MOUSE_CLASS_ID: &str = "{4D36E96F-E325-11CE-BFC1-08002BE10318}";
/// Setup class id for the HID class (USB and non-USB HID devices).
pub const HID_CLASS_ID: &str = "{745A17A0-74D3-11D0-B6FE-00A0C90F57DA}";

/// The fixed deny-class list: keyboard, mouse, HID. Immutable for the
/// lifetime of the system, not user-editable.
pub const DENY_CLASS_IDS: [&str; 3] = [KEYBOARD_CLASS_ID, MOUSE_CLASS_ID, HID_CLASS_ID];

/// Errors from compiling or applying policy.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// Refusing to activate policy with nothing whitelisted: that would
    /// deny all input devices. The caller must enroll at least one device
    /// before retrying.
    #[error("whitelist is empty; refusing to apply a policy that would lock out all input devices")]
    EmptyWhitelist,

    /// The underlying policy store rejected a write.
    #[error(transparent)]
    Store(#[from] PolicyStoreError),
}

/// Compile the whitelist into the enforced Active policy state and write
/// it to `store`.
///
/// Fails with [`PolicyError::EmptyWhitelist`] before touching the store if
/// `whitelist` is empty. The write sequence is not atomic as a whole; the
/// retroactive-deny-off write runs last as the final guard against
/// surprising a live session. Re-running against the current whitelist
/// always converges, which is the recovery path for an interrupted
/// enrollment composite.
pub fn apply(store: &mut dyn PolicyStore, whitelist: &BTreeSet<String>) -> Result<(), PolicyError> {
    if whitelist.is_empty() {
        return Err(PolicyError::EmptyWhitelist);
    }

    let entries: Vec<String> = whitelist.iter().cloned().collect();
    let classes: Vec<String> = DENY_CLASS_IDS.iter().map(|s| s.to_string()).collect();

    store.set_flag(PolicyFlag::LayeredEvaluation, true)?;
    store.set_flag(PolicyFlag::DenyUnspecified, true)?;
    store.set_flag(PolicyFlag::AllowByInstanceId, true)?;
    store.replace_list(PolicyList::AllowInstanceIds, &entries)?;
    store.set_flag(PolicyFlag::DenyByClass, true)?;
    store.replace_list(PolicyList::DenyClasses, &classes)?;
    store.set_flag(PolicyFlag::RetroactiveDenyByClass, false)?;

    info!(whitelisted = entries.len(), "policy applied");
    Ok(())
}

/// Deactivate enforcement. Only the enabling flags are lowered; list
/// contents and the layered-evaluation flag stay in place so a later
/// [`apply`] is cheap and needs no re-derivation. The persisted whitelist
/// is never touched.
pub fn clear(store: &mut dyn PolicyStore) -> Result<(), PolicyError> {
    store.set_flag(PolicyFlag::DenyUnspecified, false)?;
    store.set_flag(PolicyFlag::DenyByClass, false)?;
    store.set_flag(PolicyFlag::AllowByInstanceId, false)?;

    info!("policy cleared");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn whitelist(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn apply_empty_whitelist_fails_and_leaves_store_untouched() {
        let mut store = MemoryPolicyStore::default();
        let err = apply(&mut store, &whitelist(&[])).unwrap_err();
        assert!(matches!(err, PolicyError::EmptyWhitelist));

        // Nothing was written.
        assert_eq!(store.flag(PolicyFlag::DenyUnspecified).unwrap(), None);
        assert_eq!(store.flag(PolicyFlag::LayeredEvaluation).unwrap(), None);
        assert!(store.entries(PolicyList::AllowInstanceIds).unwrap().is_empty());
    }

    #[test]
    fn apply_refuses_to_overwrite_active_state_on_empty_whitelist() {
        let mut store = MemoryPolicyStore::default();
        apply(&mut store, &whitelist(&["HID\\VID_1&PID_2"])).unwrap();

        let err = apply(&mut store, &whitelist(&[])).unwrap_err();
        assert!(matches!(err, PolicyError::EmptyWhitelist));

        // The previously enforced state is unchanged.
        assert_eq!(store.flag(PolicyFlag::DenyUnspecified).unwrap(), Some(true));
        assert_eq!(
            store.entries(PolicyList::AllowInstanceIds).unwrap(),
            vec![("1".to_string(), "HID\\VID_1&PID_2".to_string())]
        );
    }

    #[test]
    fn apply_materializes_full_active_state() {
        let mut store = MemoryPolicyStore::default();
        apply(&mut store, &whitelist(&["HID\\VID_1&PID_2"])).unwrap();

        assert_eq!(store.flag(PolicyFlag::LayeredEvaluation).unwrap(), Some(true));
        assert_eq!(store.flag(PolicyFlag::DenyUnspecified).unwrap(), Some(true));
        assert_eq!(store.flag(PolicyFlag::AllowByInstanceId).unwrap(), Some(true));
        assert_eq!(store.flag(PolicyFlag::DenyByClass).unwrap(), Some(true));
        assert_eq!(store.flag(PolicyFlag::RetroactiveDenyByClass).unwrap(), Some(false));

        assert_eq!(
            store.entries(PolicyList::AllowInstanceIds).unwrap(),
            vec![("1".to_string(), "HID\\VID_1&PID_2".to_string())]
        );
        let classes = store.entries(PolicyList::DenyClasses).unwrap();
        assert_eq!(
            classes,
            vec![
                ("1".to_string(), KEYBOARD_CLASS_ID.to_string()),
                ("2".to_string(), MOUSE_CLASS_ID.to_string()),
                ("3".to_string(), HID_CLASS_ID.to_string()),
            ]
        );
    }

    #[test]
    fn apply_fully_replaces_previous_list_entries() {
        let mut store = MemoryPolicyStore::default();
        apply(&mut store, &whitelist(&["HID\\A", "HID\\B"])).unwrap();
        apply(&mut store, &whitelist(&["HID\\C"])).unwrap();

        assert_eq!(
            store.entries(PolicyList::AllowInstanceIds).unwrap(),
            vec![("1".to_string(), "HID\\C".to_string())]
        );
    }

    #[test]
    fn apply_is_idempotent() {
        let mut store = MemoryPolicyStore::default();
        let wl = whitelist(&["HID\\A", "HID\\B"]);
        apply(&mut store, &wl).unwrap();
        let first = store.clone();
        apply(&mut store, &wl).unwrap();
        assert_eq!(store, first);
    }

    #[test]
    fn clear_lowers_flags_but_keeps_lists() {
        let mut store = MemoryPolicyStore::default();
        apply(&mut store, &whitelist(&["HID\\A"])).unwrap();
        clear(&mut store).unwrap();

        assert_eq!(store.flag(PolicyFlag::DenyUnspecified).unwrap(), Some(false));
        assert_eq!(store.flag(PolicyFlag::DenyByClass).unwrap(), Some(false));
        assert_eq!(store.flag(PolicyFlag::AllowByInstanceId).unwrap(), Some(false));
        // Layered evaluation and list contents survive a clear.
        assert_eq!(store.flag(PolicyFlag::LayeredEvaluation).unwrap(), Some(true));
        assert_eq!(store.entries(PolicyList::AllowInstanceIds).unwrap().len(), 1);
        assert_eq!(store.entries(PolicyList::DenyClasses).unwrap().len(), 3);
    }
}
