//! Monitor/reconciler loop.
//!
//! A cooperative polling loop with no overlapping ticks: each tick
//! enumerates present devices, classifies them into the candidate set,
//! diffs against the *previous tick's* snapshot (not the whitelist -- a
//! device that disappears and reappears is newly added again), and walks
//! the added ids one at a time. An unknown device gets exactly one
//! serialized prompt; an approved prompt drives the privilege boundary's
//! composite `add`. A tick fully completes, including any blocking prompt
//! and privileged call, before the next snapshot is taken. [`Monitor::tick`]
//! is drivable without real time so tests can run the schedule
//! deterministically.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, warn};

use hidwarden_core::audit::{AuditKind, AuditLog};
use hidwarden_core::enumerate::{candidate_map, DeviceEnumerator};
use hidwarden_core::whitelist::WhitelistStore;

use crate::elevation::{ExitOutcome, PrivilegeBoundary, PrivilegedOp};
use crate::prompt::{EnrollmentEvent, EnrollmentPrompt, PromptDecision};

/// How one added device was resolved within a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Already in the whitelist store; just replugged. Skipped silently.
    AlreadyEnrolled,
    /// Prompt approved and the privileged `add` succeeded.
    Enrolled,
    /// The operator dismissed the prompt; blocked until replug.
    Dismissed,
    /// Prompt approved but the privileged `add` did not succeed; blocked
    /// until replug, no automatic retry within the tick.
    Blocked(ExitOutcome),
}

/// What one tick observed and did, for logging and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Ids newly present relative to the previous tick, in the order they
    /// were handled.
    pub added: Vec<String>,
    pub resolutions: Vec<(String, Resolution)>,
}

/// The reconciler. Owns candidate-set computation and enrollment-event
/// creation; reads the whitelist but never writes it.
pub struct Monitor {
    enumerator: Box<dyn DeviceEnumerator>,
    prompt: Box<dyn EnrollmentPrompt>,
    boundary: Box<dyn PrivilegeBoundary>,
    whitelist: WhitelistStore,
    audit: AuditLog,
    poll_interval: Duration,
    previous: BTreeSet<String>,
}

impl Monitor {
    pub fn new(
        enumerator: Box<dyn DeviceEnumerator>,
        prompt: Box<dyn EnrollmentPrompt>,
        boundary: Box<dyn PrivilegeBoundary>,
        whitelist: WhitelistStore,
        audit: AuditLog,
        poll_interval: Duration,
    ) -> Self {
        Self {
            enumerator,
            prompt,
            boundary,
            whitelist,
            audit,
            poll_interval,
            previous: BTreeSet::new(),
        }
    }

    /// Take the startup snapshot. Devices present now are not prompted;
    /// only devices arriving after this call are.
    pub fn prime(&mut self) -> Result<()> {
        let current = self.snapshot()?;
        info!(devices = current.len(), "initial candidate snapshot");
        self.previous = current.into_keys().collect();
        Ok(())
    }

    /// Run one reconciliation tick. Enumeration failure leaves the
    /// previous snapshot untouched so no arrival is missed or doubled.
    pub async fn tick(&mut self) -> Result<TickSummary> {
        let current = self.snapshot()?;
        let current_ids: BTreeSet<String> = current.keys().cloned().collect();

        // Sorted set difference gives a deterministic prompt order when
        // several devices arrive in the same tick.
        let added: Vec<String> = current_ids.difference(&self.previous).cloned().collect();
        if !added.is_empty() {
            info!(count = added.len(), "new candidate devices detected");
        }

        let mut summary = TickSummary { added: added.clone(), ..TickSummary::default() };
        let enrolled = self.whitelist.load();
        for id in added {
            let display_name = current.get(&id).cloned().unwrap_or_default();
            let resolution = self.handle_added(&id, &display_name, &enrolled).await;
            summary.resolutions.push((id, resolution));
        }

        self.previous = current_ids;
        Ok(summary)
    }

    /// Run the idle loop forever. Each tick fully completes before the
    /// interval sleep; a failed tick is isolated and logged.
    pub async fn run(&mut self) -> Result<()> {
        self.prime()?;
        loop {
            tokio::time::sleep(self.poll_interval).await;
            if let Err(e) = self.tick().await {
                warn!(error = %e, "tick failed, keeping previous snapshot");
            }
        }
    }

    fn snapshot(&self) -> Result<BTreeMap<String, String>> {
        let devices = self.enumerator.enumerate()?;
        Ok(candidate_map(&devices))
    }

    async fn handle_added(
        &self,
        instance_id: &str,
        display_name: &str,
        enrolled: &BTreeSet<String>,
    ) -> Resolution {
        if enrolled.contains(instance_id) {
            debug!(instance_id, "already whitelisted, replug ignored");
            return Resolution::AlreadyEnrolled;
        }

        self.audit.record(AuditKind::DeviceDetected, instance_id, display_name);
        let event = EnrollmentEvent {
            instance_id: instance_id.to_string(),
            display_name: display_name.to_string(),
        };

        match self.prompt.request(&event).await {
            PromptDecision::Dismissed => {
                info!(instance_id, "enrollment dismissed, device stays blocked");
                self.audit.record(AuditKind::PromptDismissed, instance_id, "");
                Resolution::Dismissed
            }
            PromptDecision::Approved => {
                match self.boundary.run(PrivilegedOp::Add(instance_id.to_string())).await {
                    ExitOutcome::Success => {
                        info!(instance_id, "device enrolled");
                        self.audit.record(AuditKind::Enrolled, instance_id, display_name);
                        Resolution::Enrolled
                    }
                    outcome => {
                        // Re-prompted only after replug; retrying here
                        // would stack elevation prompts.
                        warn!(instance_id, %outcome, "privileged add did not succeed, device stays blocked");
                        self.audit.record(AuditKind::EnrollmentFailed, instance_id, &outcome.to_string());
                        Resolution::Blocked(outcome)
                    }
                }
            }
        }
    }
}
