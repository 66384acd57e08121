//! hidwarden daemon binary entry point.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use hidwarden_core::audit::{AuditLog, AuditRole};
use hidwarden_core::config::WardenConfig;
use hidwarden_core::enumerate::CommandEnumerator;
use hidwarden_core::secret::SharedSecret;
use hidwarden_core::whitelist::WhitelistStore;

use hidwarden_daemon::elevation::ElevationLauncher;
use hidwarden_daemon::enroll;
use hidwarden_daemon::instance_lock::InstanceLock;
use hidwarden_daemon::monitor::Monitor;
use hidwarden_daemon::prompt::ConsolePrompt;

/// hidwarden -- fail-safe installation allowlist for input devices.
#[derive(Parser, Debug)]
#[command(name = "hidwarden", version, about)]
struct Args {
    /// Path to configuration file.
    #[arg(short, long, default_value = "/etc/hidwarden/config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the monitor: detect new input devices and gate their
    /// enrollment behind the prompt and the privileged helper.
    Run,
    /// Bootstrap: enroll all currently present input-like devices, then
    /// apply the lockdown policy.
    Enroll,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = WardenConfig::load(&args.config)?;

    let env_filter = EnvFilter::try_from_env("HIDWARDEN_LOG")
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    info!(config = %args.config.display(), "hidwarden starting");

    let enumerator = CommandEnumerator::new(config.enumerate_command.clone());
    let boundary = ElevationLauncher::new(
        config.elevate_command.clone(),
        config.helper_path.clone(),
        Some(args.config.clone()),
        Duration::from_secs(config.elevation_timeout_secs),
        config.denied_exit_codes.clone(),
    );

    match args.command {
        Command::Run => {
            // One monitor per host; the loser exits silently with status 0.
            let Some(_lock) = InstanceLock::acquire(&config.instance_lock_path)? else {
                info!("another monitor instance holds the lock, exiting");
                return Ok(());
            };

            let prompt = ConsolePrompt::new(SharedSecret::from_digest_hex(
                config.secret_sha256.clone(),
            ));
            let mut monitor = Monitor::new(
                Box::new(enumerator),
                Box::new(prompt),
                Box::new(boundary),
                WhitelistStore::new(config.whitelist_path.clone()),
                AuditLog::for_role(config.audit_log_path.clone(), AuditRole::Monitor),
                Duration::from_millis(config.poll_interval_ms),
            );
            monitor.run().await
        }
        Command::Enroll => enroll::bootstrap(&enumerator, &boundary).await,
    }
}
