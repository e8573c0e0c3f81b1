//! Turns the watcher's over-reporting change-queue dumps into one
//! concrete, minimal transfer list.
//!
//! The watcher marks a path changed whenever it *might* need a transfer;
//! by the time the supervisor gets around to collating, the path may
//! already have been deleted again. Collation resolves that by checking
//! each candidate against the live source tree before it's allowed onto
//! the final list.

use std::path::Path;

use indexmap::IndexSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read change-queue directory {dir}: {source}")]
    ReadDir {
        dir: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read change-queue file {path}: {source}")]
    ReadFile {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to remove change-queue file {path}: {source}")]
    RemoveFile {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Reads and deletes every regular, non-dotfile entry of `change_queue_dir`
/// in sorted order, returning the deduplicated lines that still exist
/// under `source_root`, in first-seen order.
pub fn collate(change_queue_dir: &Path, source_root: &Path) -> Result<Vec<String>> {
    let mut entries: Vec<_> = std::fs::read_dir(change_queue_dir)
        .map_err(|source| Error::ReadDir {
            dir: change_queue_dir.to_path_buf(),
            source,
        })?
        .filter_map(|e| e.ok())
        .filter(|e| is_regular_non_dotfile(e))
        .map(|e| e.path())
        .collect();
    entries.sort();

    let mut seen: IndexSet<String> = IndexSet::new();
    let mut transfer_list = Vec::new();

    for path in entries {
        let contents = std::fs::read_to_string(&path).map_err(|source| Error::ReadFile {
            path: path.clone(),
            source,
        })?;

        for line in contents.lines() {
            if line.is_empty() || !seen.insert(line.to_string()) {
                continue;
            }
            let rel = line.strip_suffix('/').unwrap_or(line);
            if source_root.join(rel).exists() {
                transfer_list.push(line.to_string());
            } else {
                tracing::debug!(path = line, "dropping transfer candidate, no longer exists");
            }
        }

        std::fs::remove_file(&path).map_err(|source| Error::RemoveFile {
            path: path.clone(),
            source,
        })?;
    }

    Ok(transfer_list)
}

fn is_regular_non_dotfile(entry: &std::fs::DirEntry) -> bool {
    let is_dotfile = entry
        .file_name()
        .to_str()
        .map(|n| n.starts_with('.'))
        .unwrap_or(true);
    if is_dotfile {
        return false;
    }
    entry.file_type().map(|t| t.is_file()).unwrap_or(false)
}
