//! Per-sync-set supervisor: a state machine that interleaves full and
//! incremental transfers, serializes them behind a file lock, consumes
//! the watcher's changed-paths dumps as the incremental work list, and
//! publishes a human-readable status file.
//!
//! This crate owns the supervisor's own bookkeeping (one [`Supervisor`]
//! per sync set). It does not know how to parse a configuration file or
//! multiplex several sync sets in one process -- each `Supervisor` is
//! handed an already-resolved [`SyncSetConfig`] and runs that one sync
//! set until told to stop.

pub mod config;
pub mod error;
pub mod lock;
pub mod marker;
pub mod state;
pub mod status;
pub mod supervisor;
pub mod transfer;
pub mod validate;
pub mod watcher_child;

pub use config::SyncSetConfig;
pub use error::{Error, Result};
pub use state::{LastStatus, SyncSetState, SyncState};
pub use supervisor::{Supervisor, TICK_INTERVAL};
pub use watcher_child::{resolve_watcher_binary, WatcherChild};
