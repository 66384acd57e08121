//! # hidwarden-daemon
//!
//! The unprivileged side of hidwarden: the monitor/reconciler loop, the
//! enrollment prompt, the privilege-elevation boundary to the helper, the
//! bulk-enrollment bootstrap, and the host-wide single-instance lock.
//!
//! Nothing in this crate mutates the whitelist or the enforced policy
//! state directly; every mutation goes through
//! [`elevation::PrivilegeBoundary`] into the privileged actor.

pub mod elevation;
pub mod enroll;
pub mod instance_lock;
pub mod monitor;
pub mod prompt;
