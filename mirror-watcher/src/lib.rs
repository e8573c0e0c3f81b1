//! Single-threaded scheduler driving rescans, event dispatch, change-queue
//! draining, and periodic emission of changed-path files.
//!
//! Deliberately synchronous (no tokio): the loop is one readiness wait
//! around one file descriptor, and adding an async runtime on top would
//! only obscure that.

pub mod config;
pub mod watcher_loop;

pub use config::WatcherConfig;
pub use watcher_loop::{run, WatcherLoop};
