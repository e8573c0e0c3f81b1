use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the change-detection engine.
///
/// Most per-entry failures (a stat failing mid-rescan, a watch already
/// gone) are handled inline and never reach this type. What remains here
/// are the failures that a caller (the watcher loop, or a test) genuinely
/// needs to react to.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot resolve top directory {path}: {source}")]
    TopDirUnresolvable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to install kernel watch on {path}: {source}")]
    WatchInstall {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read kernel event batch: {source}")]
    EventRead {
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write changed-paths dump to {dir}: {source}")]
    DumpWrite {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("allocator or path-construction failure: {0}")]
    Fatal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
