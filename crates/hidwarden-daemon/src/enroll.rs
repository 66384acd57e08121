//! Bulk-enrollment bootstrap.
//!
//! Before the monitor is relied upon, every currently present input-like
//! device must be enrolled or activating the policy would block the
//! operator's own keyboard and mouse. This discovers the present candidate
//! set, enrolls each id through the privilege boundary, and finishes with
//! one final `apply`. Per-device failures are logged and skipped; the
//! final apply is what matters.

use anyhow::{bail, Result};
use tracing::{info, warn};

use hidwarden_core::enumerate::{candidate_map, DeviceEnumerator};

use crate::elevation::{ExitOutcome, PrivilegeBoundary, PrivilegedOp};

/// Discover and enroll all present input-like devices, then apply policy.
/// Fails only when nothing is detected (activating with nothing enrolled
/// is exactly the lockout this system exists to prevent) or when the
/// final apply does not succeed.
pub async fn bootstrap(
    enumerator: &dyn DeviceEnumerator,
    boundary: &dyn PrivilegeBoundary,
) -> Result<()> {
    let devices = enumerator.enumerate()?;
    let candidates = candidate_map(&devices);
    if candidates.is_empty() {
        bail!("no input-like devices detected; refusing to proceed");
    }

    info!(count = candidates.len(), "enrolling currently present input-like devices");
    for (instance_id, display_name) in &candidates {
        match boundary.run(PrivilegedOp::Add(instance_id.clone())).await {
            ExitOutcome::Success => info!(instance_id = %instance_id, display_name = %display_name, "enrolled"),
            outcome => warn!(instance_id = %instance_id, %outcome, "enrollment failed, continuing"),
        }
    }

    match boundary.run(PrivilegedOp::Apply).await {
        ExitOutcome::Success => {
            info!("lockdown policy applied");
            Ok(())
        }
        outcome => bail!("final policy apply did not succeed: {outcome}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use hidwarden_core::classify::DeviceDescriptor;

    struct FixedEnumerator(Vec<DeviceDescriptor>);

    impl DeviceEnumerator for FixedEnumerator {
        fn enumerate(&self) -> Result<Vec<DeviceDescriptor>> {
            Ok(self.0.clone())
        }
    }

    struct RecordingBoundary {
        calls: Arc<Mutex<Vec<PrivilegedOp>>>,
        add_outcome: ExitOutcome,
    }

    #[async_trait]
    impl PrivilegeBoundary for RecordingBoundary {
        async fn run(&self, op: PrivilegedOp) -> ExitOutcome {
            self.calls.lock().unwrap().push(op.clone());
            match op {
                PrivilegedOp::Add(_) => self.add_outcome.clone(),
                _ => ExitOutcome::Success,
            }
        }
    }

    fn device(id: &str, name: &str) -> DeviceDescriptor {
        DeviceDescriptor { instance_id: id.to_string(), display_name: name.to_string() }
    }

    #[tokio::test]
    async fn enrolls_each_candidate_then_applies_once() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let boundary = RecordingBoundary {
            calls: Arc::clone(&calls),
            add_outcome: ExitOutcome::Success,
        };
        let enumerator = FixedEnumerator(vec![
            device("HID\\B", "mouse"),
            device("HID\\A", "kbd"),
            device("PCI\\VEN_8086\\0", "bridge"),
        ]);

        bootstrap(&enumerator, &boundary).await.unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(
            calls.as_slice(),
            [
                PrivilegedOp::Add("HID\\A".to_string()),
                PrivilegedOp::Add("HID\\B".to_string()),
                PrivilegedOp::Apply,
            ]
        );
    }

    #[tokio::test]
    async fn no_candidates_is_an_error() {
        let boundary = RecordingBoundary {
            calls: Arc::new(Mutex::new(Vec::new())),
            add_outcome: ExitOutcome::Success,
        };
        let enumerator = FixedEnumerator(vec![device("PCI\\VEN_8086\\0", "bridge")]);
        assert!(bootstrap(&enumerator, &boundary).await.is_err());
    }

    #[tokio::test]
    async fn per_device_failures_do_not_stop_the_final_apply() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let boundary = RecordingBoundary {
            calls: Arc::clone(&calls),
            add_outcome: ExitOutcome::Denied,
        };
        let enumerator = FixedEnumerator(vec![device("HID\\A", "kbd"), device("HID\\B", "mouse")]);

        bootstrap(&enumerator, &boundary).await.unwrap();
        assert_eq!(calls.lock().unwrap().len(), 3);
    }
}
