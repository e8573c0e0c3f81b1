//! Construction-time configuration for one sync set's supervisor.
//!
//! Not parsed from a config file -- that parser (with its variable
//! substitution and include-directives) is a separate collaborator.
//! `mirror-sync` builds this from CLI flags/env and hands the already
//! resolved result to [`crate::supervisor::Supervisor`].

use std::path::PathBuf;
use std::time::Duration;

/// Everything one supervisor needs to run one sync set.
#[derive(Debug, Clone)]
pub struct SyncSetConfig {
    /// Source directory tree.
    pub source: PathBuf,
    /// Destination given to the transfer tool verbatim (may be remote,
    /// e.g. `user@host:/path`).
    pub destination: String,
    /// Shell command run to validate the source is reachable; empty
    /// string skips validation (always succeeds).
    pub validate_source_cmd: String,
    /// Shell command run to validate the destination is reachable.
    pub validate_destination_cmd: String,
    /// Shell command template for a full sync. `{source}` and
    /// `{destination}` are substituted; an `--exclude-from`/`--files-from`
    /// flag is appended by the supervisor as needed.
    pub full_sync_cmd: String,
    /// Shell command template for a partial sync.
    pub partial_sync_cmd: String,
    /// Seconds between full syncs; 0 disables full syncs entirely.
    pub full_interval: Duration,
    /// Retry delay after a failed full sync (validation or transfer).
    pub full_retry: Duration,
    /// Seconds between partial-sync attempts; 0 disables the watcher
    /// child and partial syncing entirely.
    pub partial_interval: Duration,
    /// Retry delay after a failed partial sync.
    pub partial_retry: Duration,
    /// Scratch directory for the change-queue, marker files, excludes
    /// file, and captured-stderr file. Deleted at exit.
    pub working_dir: PathBuf,
    /// Path to the status file published for external observers.
    pub status_file: PathBuf,
    /// Path to the advisory lock file serializing full/partial transfers.
    /// `None` disables locking (single-writer guaranteed some other way).
    pub sync_lock: Option<PathBuf>,
    /// Shell-glob exclude patterns written to the excludes file and
    /// passed to the transfer tool via `--exclude-from`.
    pub excludes: Vec<String>,
    /// Path to the `mirror-watcherd` binary spawned as the watcher child.
    pub watcher_binary: PathBuf,
    /// Maximum depth the watcher child descends below `source`.
    pub watcher_max_depth: u32,
}

impl SyncSetConfig {
    pub fn new(source: PathBuf, destination: String, working_dir: PathBuf) -> Self {
        let status_file = working_dir.join("status");
        Self {
            source,
            destination,
            validate_source_cmd: String::new(),
            validate_destination_cmd: String::new(),
            full_sync_cmd: String::new(),
            partial_sync_cmd: String::new(),
            full_interval: Duration::from_secs(3600),
            full_retry: Duration::from_secs(300),
            partial_interval: Duration::from_secs(5),
            partial_retry: Duration::from_secs(30),
            working_dir,
            status_file,
            sync_lock: None,
            excludes: Vec::new(),
            watcher_binary: PathBuf::from("mirror-watcherd"),
            watcher_max_depth: 32,
        }
    }

    pub fn change_queue_dir(&self) -> PathBuf {
        self.working_dir.join("change-queue")
    }

    pub fn excludes_file(&self) -> PathBuf {
        self.working_dir.join("excludes")
    }

    pub fn stderr_file(&self) -> PathBuf {
        self.working_dir.join("stderr.log")
    }

    pub fn full_marker_file(&self) -> PathBuf {
        self.working_dir.join("full.marker")
    }

    pub fn partial_marker_file(&self) -> PathBuf {
        self.working_dir.join("partial.marker")
    }
}
