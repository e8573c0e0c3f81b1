//! Construction-time configuration for one watcher instance.

use std::path::PathBuf;
use std::time::Duration;

/// Everything a [`crate::WatcherLoop`] needs, already resolved -- no file
/// parsing happens here, that belongs to an external config loader.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Directory to mirror. Canonicalized by `mirror_core::Engine::new`.
    pub root: PathBuf,
    /// Where changed-path dump files are written.
    pub output_dir: PathBuf,
    /// Shell-style glob patterns; empty uses the default `*~`/`*.tmp` rule.
    pub exclude: Vec<String>,
    /// Maximum directory depth below root that gets watched/scanned.
    pub max_depth: u32,
    /// Interval between full rescans of the root.
    pub full_scan_interval: Duration,
    /// Upper bound on time spent draining the change queue per iteration.
    pub queue_run_max: Duration,
    /// Interval between changed-path dump writes.
    pub dump_interval: Duration,
    /// If false, no kernel watches are installed and the loop falls back
    /// to sleep-and-rescan polling.
    pub notifications_enabled: bool,
}

impl WatcherConfig {
    pub fn new(root: PathBuf, output_dir: PathBuf) -> Self {
        Self {
            root,
            output_dir,
            exclude: Vec::new(),
            max_depth: 32,
            full_scan_interval: Duration::from_secs(30),
            queue_run_max: Duration::from_millis(50),
            dump_interval: Duration::from_secs(5),
            notifications_enabled: true,
        }
    }
}
