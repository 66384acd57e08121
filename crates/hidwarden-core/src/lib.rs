//! # hidwarden-core
//!
//! Core type system for hidwarden -- a fail-safe installation allowlist for
//! human-input devices.
//!
//! This crate defines the shared types and stores used across the hidwarden
//! components: the device classifier, the whitelist store, the policy
//! compiler/applier, the device-enumeration interface, the shared-secret
//! check, configuration, and the audit log.

pub mod audit;
pub mod classify;
pub mod config;
pub mod enumerate;
pub mod policy;
pub mod secret;
pub mod whitelist;
