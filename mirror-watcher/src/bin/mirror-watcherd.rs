//! Standalone change-detection watcher, useful on its own or spawned as
//! the watcher child of `mirror-sync`.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use mirror_watcher::WatcherConfig;

#[derive(ValueEnum, Clone, Copy, Debug, Default)]
enum LogFormat {
    #[default]
    Full,
    Json,
}

/// Watch a directory tree and periodically dump changed relative paths.
#[derive(Parser, Debug)]
#[command(name = "mirror-watcherd", version)]
struct Args {
    /// Directory to mirror.
    root: PathBuf,

    /// Where to write changed-path dump files.
    #[arg(long)]
    output_dir: PathBuf,

    /// Shell-style glob patterns to exclude (repeatable). Defaults to
    /// rejecting leaves ending in `~` or `.tmp` when empty.
    #[arg(long = "exclude")]
    exclude: Vec<String>,

    /// Maximum directory depth below root to watch.
    #[arg(long, default_value_t = 32)]
    max_depth: u32,

    /// Seconds between full rescans of the root.
    #[arg(long, default_value_t = 30)]
    full_scan_interval_secs: u64,

    /// Seconds between changed-path dump writes.
    #[arg(long, default_value_t = 5)]
    dump_interval_secs: u64,

    /// Disable kernel notifications; fall back to periodic rescan only.
    #[arg(long)]
    no_notifications: bool,

    /// Run a fixed number of loop iterations and exit, instead of
    /// running until a termination signal arrives.
    #[arg(long)]
    iterations: Option<u64>,

    /// Log line format: human-readable or newline-delimited JSON, for
    /// callers that ship logs into a structured collector.
    #[arg(long, value_enum, default_value_t = LogFormat::Full)]
    log_format: LogFormat,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::from_default_env();
    match args.log_format {
        LogFormat::Full => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }

    let mut config = WatcherConfig::new(args.root, args.output_dir);
    config.exclude = args.exclude;
    config.max_depth = args.max_depth;
    config.full_scan_interval = Duration::from_secs(args.full_scan_interval_secs);
    config.dump_interval = Duration::from_secs(args.dump_interval_secs);
    config.notifications_enabled = !args.no_notifications;

    let mut watcher = mirror_watcher::WatcherLoop::new(config)?;
    watcher.run(args.iterations)
}
