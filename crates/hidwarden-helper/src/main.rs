//! hidwarden privileged actor.
//!
//! Runs in the elevated context the monitor cannot enter. Exclusively
//! owns all writes to the whitelist document and the policy store; the
//! unprivileged side only ever invokes this binary and observes its exit
//! status.
//!
//! CLI surface: `apply` (no args), `clear` (no args), `add <instanceId>`.
//! Exit status 0 = success, 2 = usage error, 1 = operational failure.
//!
//! `add` is a composite: enroll the id, re-apply policy from the
//! resulting whitelist, then best-effort refresh and re-probe. It is not
//! transactional; both halves are idempotent, so re-running `add` or
//! `apply` after an interruption converges.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use hidwarden_core::audit::{AuditKind, AuditLog, AuditRole};
use hidwarden_core::config::WardenConfig;
use hidwarden_core::policy::refresh::HostRefresher;
use hidwarden_core::policy::{self, FilePolicyStore};
use hidwarden_core::whitelist::WhitelistStore;

/// hidwarden-helper -- privileged policy and whitelist writer.
#[derive(Parser, Debug)]
#[command(name = "hidwarden-helper", version, about)]
struct Args {
    /// Path to configuration file.
    #[arg(short, long, default_value = "/etc/hidwarden/config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: HelperCommand,
}

#[derive(Subcommand, Debug)]
enum HelperCommand {
    /// Compile the whitelist into the enforced policy and write it.
    Apply,
    /// Lower the enforcement flags; whitelist and list contents stay.
    Clear,
    /// Enroll one device-instance id, re-apply policy, refresh, re-probe.
    Add {
        /// Device-instance id to enroll.
        instance_id: String,
    },
}

fn main() -> ExitCode {
    // clap itself exits with status 2 on usage errors.
    let args = Args::parse();

    let env_filter = EnvFilter::try_from_env("HIDWARDEN_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).with_writer(std::io::stderr).init();

    if let HelperCommand::Add { instance_id } = &args.command {
        if instance_id.trim().is_empty() {
            error!("missing or blank instance id");
            return ExitCode::from(2);
        }
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("operation failed: {e:#}");
            ExitCode::from(1)
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let config = WardenConfig::load(&args.config)?;
    let whitelist = WhitelistStore::new(config.whitelist_path.clone());
    let mut store = FilePolicyStore::open(config.policy_store_path.clone());
    let refresher = HostRefresher::new(config.refresh_command.clone(), config.reprobe_command.clone());
    let audit = AuditLog::for_role(config.audit_log_path.clone(), AuditRole::Helper);

    match &args.command {
        HelperCommand::Apply => {
            policy::apply(&mut store, &whitelist.load())?;
            refresher.refresh_policy();
            audit.record(AuditKind::PolicyApplied, "", "");
            info!("lockdown applied");
        }
        HelperCommand::Clear => {
            policy::clear(&mut store)?;
            refresher.refresh_policy();
            audit.record(AuditKind::PolicyCleared, "", "");
            info!("lockdown cleared");
        }
        HelperCommand::Add { instance_id } => {
            whitelist.add(instance_id)?;
            policy::apply(&mut store, &whitelist.load())?;
            // Refresh and re-probe are best-effort: the policy write
            // already succeeded, so their failure never changes the exit
            // status.
            refresher.refresh_policy();
            refresher.reprobe_device(instance_id);
            audit.record(AuditKind::Enrolled, instance_id, "");
            info!(instance_id = %instance_id, "added and reapplied");
        }
    }
    Ok(())
}
