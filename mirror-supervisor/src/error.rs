use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by one sync-set supervisor.
///
/// Transfer and validation failures do not appear here -- they are
/// represented as [`crate::validate::ValidationOutcome`] /
/// [`crate::transfer::TransferOutcome`] values the supervisor loop
/// schedules a retry around, not as exceptions to propagate.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot create working directory {path}: {source}")]
    WorkingDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open or lock {path}: {source}")]
    LockAcquire {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write status file to {dir}: {source}")]
    StatusWrite {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("validation or transfer command for {path} failed to run: {source}")]
    CommandIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write scratch file {path}: {source}")]
    ScratchIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to signal watcher child {pid}: {source}")]
    SignalChild {
        pid: i32,
        #[source]
        source: nix::Error,
    },

    #[error("allocator or path-construction failure: {0}")]
    Fatal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
