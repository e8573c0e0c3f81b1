//! The binary that *is* one sync set's supervisor process: parses CLI
//! flags into a [`SyncSetConfig`], wires up a [`Supervisor`], and is the
//! thing the out-of-scope top-level multi-section controller fork/waits.
//!
//! No configuration-file parsing happens here -- that language (with its
//! variable substitution and include-directives) is a separate
//! collaborator whose already-resolved output this binary's flags stand
//! in for.

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Duration;

use clap::Parser;
use miette::{IntoDiagnostic, Result};
use mirror_supervisor::validate::ValidationOutcome;
use mirror_supervisor::{resolve_watcher_binary, Supervisor, SyncSetConfig};

/// Run one sync set: validate, full-sync, and partial-sync against a
/// destination, driven by a watcher child's changed-paths dumps.
#[derive(Parser, Debug)]
#[command(name = "mirror-sync", version)]
struct Args {
    /// Human-readable section name, used in the status file.
    #[arg(long)]
    section: String,

    /// Source directory tree to mirror.
    source: PathBuf,

    /// Destination passed to the transfer tool verbatim (may be remote,
    /// e.g. `user@host:/path`).
    destination: String,

    /// Scratch directory for the change-queue, marker files, excludes
    /// file, captured-stderr file, and status file.
    #[arg(long)]
    working_dir: PathBuf,

    /// Shell command validating the source is reachable. Empty skips
    /// validation.
    #[arg(long, default_value = "")]
    validate_source_cmd: String,

    /// Shell command validating the destination is reachable. Empty
    /// skips validation.
    #[arg(long, default_value = "")]
    validate_destination_cmd: String,

    /// Shell command template for a full sync; `{source}`/`{destination}`
    /// are substituted.
    #[arg(long)]
    full_sync_cmd: String,

    /// Shell command template for a partial sync.
    #[arg(long)]
    partial_sync_cmd: String,

    /// Seconds between full syncs; 0 disables full syncs entirely.
    #[arg(long, default_value_t = 3600)]
    full_interval_secs: u64,

    /// Retry delay in seconds after a failed full sync.
    #[arg(long, default_value_t = 300)]
    full_retry_secs: u64,

    /// Seconds between partial-sync attempts; 0 disables the watcher
    /// child and partial syncing entirely.
    #[arg(long, default_value_t = 5)]
    partial_interval_secs: u64,

    /// Retry delay in seconds after a failed partial sync.
    #[arg(long, default_value_t = 30)]
    partial_retry_secs: u64,

    /// Path to the advisory lock file serializing full/partial transfers.
    #[arg(long)]
    sync_lock: Option<PathBuf>,

    /// Shell-glob exclude patterns (repeatable), written to the excludes
    /// file and passed to the transfer tool via `--exclude-from`.
    #[arg(long = "exclude")]
    excludes: Vec<String>,

    /// Path (or bare name, resolved next to this executable) of the
    /// `mirror-watcherd` binary spawned as the watcher child.
    #[arg(long, default_value = "mirror-watcherd")]
    watcher_binary: PathBuf,

    /// Maximum directory depth the watcher child descends below source.
    #[arg(long, default_value_t = 32)]
    watcher_max_depth: u32,

    /// Run one full sync (if due) and one partial sync (if due), then
    /// exit, instead of looping forever. Useful for cron-driven
    /// invocation.
    #[arg(long)]
    once: bool,

    /// Run source then destination validation once, print the result,
    /// and exit without syncing or starting a watcher child.
    #[arg(long)]
    validate_only: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let watcher_binary = resolve_watcher_binary(&args.watcher_binary).into_diagnostic()?;

    let mut config = SyncSetConfig::new(args.source, args.destination, args.working_dir);
    config.validate_source_cmd = args.validate_source_cmd;
    config.validate_destination_cmd = args.validate_destination_cmd;
    config.full_sync_cmd = args.full_sync_cmd;
    config.partial_sync_cmd = args.partial_sync_cmd;
    config.full_interval = Duration::from_secs(args.full_interval_secs);
    config.full_retry = Duration::from_secs(args.full_retry_secs);
    config.partial_interval = Duration::from_secs(args.partial_interval_secs);
    config.partial_retry = Duration::from_secs(args.partial_retry_secs);
    config.sync_lock = args.sync_lock;
    config.excludes = args.excludes;
    config.watcher_binary = watcher_binary;
    config.watcher_max_depth = args.watcher_max_depth;

    let mut supervisor = Supervisor::new(args.section, config).into_diagnostic()?;

    if args.validate_only {
        return match supervisor.validate_only().await.into_diagnostic()? {
            ValidationOutcome::Success => {
                println!("OK");
                Ok(())
            }
            ValidationOutcome::Failed => {
                println!("FAILED");
                std::process::exit(1);
            }
            ValidationOutcome::Signaled => {
                println!("SIGNALED");
                std::process::exit(1);
            }
        };
    }

    if args.once {
        return supervisor.run_once().await.into_diagnostic();
    }

    // Bridge OS signals to the supervisor's own exit flag: `Supervisor`
    // reads an `AtomicBool` at loop-iteration boundaries rather than a
    // `CancellationToken` directly, matching the watcher loop's simpler
    // flag-based model (see mirror_shutdown's doc comment on why both
    // exist side by side).
    let shutdown = mirror_shutdown::Shutdown::new();
    shutdown.install_signals().await;
    let exit_flag = supervisor.exit_flag();
    tokio::spawn({
        let shutdown = std::sync::Arc::clone(&shutdown);
        async move {
            shutdown.wait_for_shutdown().await;
            exit_flag.store(true, Ordering::Relaxed);
        }
    });

    supervisor.run().await.into_diagnostic()
}
