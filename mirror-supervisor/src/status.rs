//! Status-file rendering, published with the same atomic-rename
//! discipline as the Dump Writer.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local};
use mirror_core::publish_atomically;

use crate::error::{Error, Result};
use crate::state::SyncSetState;

/// Writes the status file for one sync set. Called before every state
/// transition so external observers always see current state.
pub fn write(
    status_file: &Path,
    section: &str,
    sync_pid: u32,
    working_dir: &Path,
    state: &SyncSetState,
) -> Result<()> {
    let dir = status_file
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let name = status_file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("status")
        .to_string();

    let body = render(section, sync_pid, working_dir, state);
    publish_atomically(&dir, &name, &body).map_err(|source| Error::StatusWrite {
        dir: dir.clone(),
        source,
    })
}

fn render(section: &str, sync_pid: u32, working_dir: &Path, state: &SyncSetState) -> String {
    let watcher_pid = if state.watcher_alive() {
        state.watcher_pid.to_string()
    } else {
        "-".to_string()
    };

    format!(
        "section : {section}\n\
         action : {action}\n\
         sync pid : {sync_pid}\n\
         watcher pid : {watcher_pid}\n\
         last full sync status : {last_full_status}\n\
         last partial sync status : {last_partial_status}\n\
         last full sync : {last_full_sync}\n\
         next full sync : {next_full_sync}\n\
         last partial sync : {last_partial_sync}\n\
         next partial sync : {next_partial_sync}\n\
         last full sync failure : {last_full_failure}\n\
         last partial sync failure : {last_partial_failure}\n\
         full sync failure count : {full_failure_count}\n\
         partial sync failure count : {partial_failure_count}\n\
         working directory : {working_dir}\n\
         \n",
        working_dir = working_dir.display(),
        action = state.action.label(),
        last_full_status = state.last_full_status.label(),
        last_partial_status = state.last_partial_status.label(),
        last_full_sync = local_time(state.last_full_sync),
        next_full_sync = local_time(Some(state.next_full_sync)),
        last_partial_sync = local_time(state.last_partial_sync),
        next_partial_sync = local_time(Some(state.next_partial_sync)),
        last_full_failure = local_time(state.last_full_failure),
        last_partial_failure = local_time(state.last_partial_failure),
        full_failure_count = state.full_failure_count,
        partial_failure_count = state.partial_failure_count,
    )
}

fn local_time(t: Option<SystemTime>) -> String {
    match t {
        None => "-".to_string(),
        Some(t) => {
            let dt: DateTime<Local> = t.into();
            dt.format("%Y-%m-%d %H:%M:%S").to_string()
        }
    }
}
