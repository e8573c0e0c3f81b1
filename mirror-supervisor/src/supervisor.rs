//! The per-iteration driver: one sync set's state machine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use crate::config::SyncSetConfig;
use crate::error::Result;
use crate::state::{SyncSetState, SyncState};
use crate::validate::ValidationOutcome;
use crate::watcher_child::WatcherChild;

/// Sleep at the bottom of each iteration when there was no due work.
pub const TICK_INTERVAL: std::time::Duration = std::time::Duration::from_millis(100);
/// Sleep after a failed watcher-child bring-up attempt before retrying.
const WATCHER_RETRY_SLEEP: std::time::Duration = std::time::Duration::from_secs(5);

pub struct Supervisor {
    section: String,
    config: SyncSetConfig,
    state: SyncSetState,
    watcher: Option<WatcherChild>,
    exit: Arc<AtomicBool>,
    sync_pid: u32,
}

impl Supervisor {
    pub fn new(section: String, config: SyncSetConfig) -> std::io::Result<Self> {
        std::fs::create_dir_all(&config.working_dir)?;
        std::fs::create_dir_all(config.change_queue_dir())?;
        write_excludes_file(&config)?;

        let now = SystemTime::now();
        let mut state = SyncSetState::new(now);
        if let Some(mtime) = crate::marker::read(&config.full_marker_file()) {
            state.last_full_sync = Some(mtime);
            state.next_full_sync = mtime + config.full_interval;
        }
        if let Some(mtime) = crate::marker::read(&config.partial_marker_file()) {
            state.last_partial_sync = Some(mtime);
            state.next_partial_sync = mtime + config.partial_interval;
        }

        Ok(Self {
            section,
            config,
            state,
            watcher: None,
            exit: Arc::new(AtomicBool::new(false)),
            sync_pid: std::process::id(),
        })
    }

    pub fn exit_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.exit)
    }

    pub fn should_exit(&self) -> bool {
        self.exit.load(Ordering::Relaxed)
    }

    /// Runs until `should_exit()` is true, sleeping [`TICK_INTERVAL`]
    /// between iterations with no due work.
    pub async fn run(&mut self) -> Result<()> {
        while !self.should_exit() {
            self.tick().await?;
            tokio::time::sleep(TICK_INTERVAL).await;
        }
        self.shutdown().await
    }

    /// Runs source then destination validation once and returns the
    /// first non-success outcome (or `Success` if both pass), without
    /// touching scheduling state. Used by `--validate-only`.
    pub async fn validate_only(&mut self) -> Result<ValidationOutcome> {
        self.validate_both().await
    }

    /// Runs one full-sync attempt (if due) and one partial-sync attempt
    /// (if the watcher is already up and one is due), then returns
    /// without looping or cleaning up. Used by `--once`.
    pub async fn run_once(&mut self) -> Result<()> {
        self.maybe_bring_up_watcher().await?;
        self.maybe_full_sync().await?;
        self.maybe_partial_sync().await?;
        self.reap_watcher();
        Ok(())
    }

    async fn tick(&mut self) -> Result<()> {
        self.maybe_bring_up_watcher().await?;
        self.maybe_full_sync().await?;
        self.maybe_partial_sync().await?;
        self.reap_watcher();
        self.check_working_dir_gone();
        Ok(())
    }

    async fn maybe_bring_up_watcher(&mut self) -> Result<()> {
        if self.config.partial_interval.is_zero() || self.watcher.is_some() {
            return Ok(());
        }

        self.set_action(SyncState::ValidateSource).await?;
        let outcome = self.validate(&self.config.validate_source_cmd.clone()).await?;

        match outcome {
            ValidationOutcome::Success => {
                let child = WatcherChild::spawn(&self.config).map_err(|source| crate::error::Error::WorkingDirCreate {
                    path: self.config.working_dir.clone(),
                    source,
                })?;
                self.state.watcher_pid = child.pid() as i32;
                self.watcher = Some(child);
                self.set_action(SyncState::Waiting).await?;
            }
            ValidationOutcome::Signaled => self.exit.store(true, Ordering::Relaxed),
            ValidationOutcome::Failed => {
                tracing::warn!(section = %self.section, "watcher bring-up validation failed, retrying");
                tokio::time::sleep(WATCHER_RETRY_SLEEP).await;
            }
        }
        Ok(())
    }

    async fn maybe_full_sync(&mut self) -> Result<()> {
        if self.config.full_interval.is_zero() || SystemTime::now() < self.state.next_full_sync {
            return Ok(());
        }

        match self.validate_both().await? {
            ValidationOutcome::Success => {}
            ValidationOutcome::Signaled => {
                self.exit.store(true, Ordering::Relaxed);
                return Ok(());
            }
            ValidationOutcome::Failed => {
                self.state.record_full_failure(SystemTime::now(), self.config.full_retry);
                self.write_status().await?;
                return Ok(());
            }
        }

        self.set_action(SyncState::SyncFullAwaitingLock).await?;
        self.set_action(SyncState::SyncFull).await?;

        let config = self.config.clone();
        let outcome = crate::lock::with_lock(config.sync_lock.as_ref(), || async move {
            crate::transfer::run(
                &config.full_sync_cmd,
                &config.source,
                &config.destination,
                Some(&config.excludes_file()),
                None,
                &config.stderr_file(),
            )
            .await
        })
        .await?
        .map_err(|source| crate::error::Error::CommandIo {
            path: self.config.stderr_file(),
            source,
        })?;

        let now = SystemTime::now();
        match outcome {
            ValidationOutcome::Success => {
                crate::marker::touch(&self.config.full_marker_file(), now).map_err(|source| {
                    crate::error::Error::ScratchIo {
                        path: self.config.full_marker_file(),
                        source,
                    }
                })?;
                self.state.record_full_success(now, self.config.full_interval);
            }
            ValidationOutcome::Signaled => self.exit.store(true, Ordering::Relaxed),
            ValidationOutcome::Failed => self.state.record_full_failure(now, self.config.full_retry),
        }
        self.set_action(SyncState::Waiting).await
    }

    async fn maybe_partial_sync(&mut self) -> Result<()> {
        if self.watcher.is_none() || SystemTime::now() < self.state.next_partial_sync {
            return Ok(());
        }

        match self.validate_both().await? {
            ValidationOutcome::Success => {}
            ValidationOutcome::Signaled => {
                self.exit.store(true, Ordering::Relaxed);
                return Ok(());
            }
            ValidationOutcome::Failed => {
                self.state.record_partial_failure(SystemTime::now(), self.config.partial_retry);
                self.write_status().await?;
                return Ok(());
            }
        }

        let change_queue_dir = self.config.change_queue_dir();
        let transfer_list = match mirror_collator::collate(&change_queue_dir, &self.config.source) {
            Ok(list) => list,
            Err(e) => {
                tracing::warn!(section = %self.section, error = %e, "collation failed");
                return Ok(());
            }
        };

        if transfer_list.is_empty() {
            self.state.next_partial_sync = SystemTime::now() + self.config.partial_interval;
            return Ok(());
        }

        let files_from = self.config.working_dir.join("transfer-list");
        std::fs::write(&files_from, transfer_list.join("\n") + "\n").map_err(|source| {
            crate::error::Error::ScratchIo {
                path: files_from.clone(),
                source,
            }
        })?;

        self.set_action(SyncState::SyncPartialAwaitingLock).await?;
        self.set_action(SyncState::SyncPartial).await?;

        let config = self.config.clone();
        let files_from_for_closure = files_from.clone();
        let outcome = crate::lock::with_lock(config.sync_lock.as_ref(), || async move {
            crate::transfer::run(
                &config.partial_sync_cmd,
                &config.source,
                &config.destination,
                Some(&config.excludes_file()),
                Some(&files_from_for_closure),
                &config.stderr_file(),
            )
            .await
        })
        .await?
        .map_err(|source| crate::error::Error::CommandIo {
            path: self.config.stderr_file(),
            source,
        })?;

        let _ = std::fs::remove_file(&files_from);

        let now = SystemTime::now();
        match outcome {
            ValidationOutcome::Success => {
                crate::marker::touch(&self.config.partial_marker_file(), now).map_err(|source| {
                    crate::error::Error::ScratchIo {
                        path: self.config.partial_marker_file(),
                        source,
                    }
                })?;
                self.state.record_partial_success(now, self.config.partial_interval);
            }
            ValidationOutcome::Signaled => self.exit.store(true, Ordering::Relaxed),
            ValidationOutcome::Failed => self.state.record_partial_failure(now, self.config.partial_retry),
        }
        self.set_action(SyncState::Waiting).await
    }

    async fn validate_both(&mut self) -> Result<ValidationOutcome> {
        self.set_action(SyncState::ValidateSource).await?;
        let source = self.validate(&self.config.validate_source_cmd.clone()).await?;
        if source != ValidationOutcome::Success {
            return Ok(source);
        }

        self.set_action(SyncState::ValidateDestination).await?;
        self.validate(&self.config.validate_destination_cmd.clone()).await
    }

    async fn validate(&self, cmd: &str) -> Result<ValidationOutcome> {
        crate::validate::run(cmd, &self.config.stderr_file())
            .await
            .map_err(|source| crate::error::Error::CommandIo {
                path: self.config.stderr_file(),
                source,
            })
    }

    fn reap_watcher(&mut self) {
        let exited = match self.watcher.as_mut() {
            Some(w) => w.try_reap().unwrap_or(false),
            None => false,
        };
        if exited {
            tracing::info!(section = %self.section, "watcher child exited");
            self.watcher = None;
            self.state.watcher_pid = 0;
        }
    }

    fn check_working_dir_gone(&mut self) {
        if !self.config.working_dir.exists() {
            tracing::warn!(section = %self.section, "working directory disappeared, exiting");
            self.exit.store(true, Ordering::Relaxed);
        }
    }

    async fn shutdown(&mut self) -> Result<()> {
        if let Some(watcher) = self.watcher.take() {
            let _ = watcher.terminate();
        }
        remove_dir_depth_limited(&self.config.working_dir, 10);
        let _ = std::fs::remove_file(&self.config.status_file);
        Ok(())
    }

    async fn set_action(&mut self, action: SyncState) -> Result<()> {
        self.state.action = action;
        self.write_status().await
    }

    async fn write_status(&self) -> Result<()> {
        crate::status::write(
            &self.config.status_file,
            &self.section,
            self.sync_pid,
            &self.config.working_dir,
            &self.state,
        )
    }
}

fn write_excludes_file(config: &SyncSetConfig) -> std::io::Result<()> {
    let contents = config.excludes.join("\n");
    std::fs::write(config.excludes_file(), contents)
}

/// Recursively removes `dir`, refusing to descend more than `max_depth`
/// levels -- a guard against a misconfigured working directory pointing
/// at something unexpectedly large.
fn remove_dir_depth_limited(dir: &std::path::Path, max_depth: u32) {
    if max_depth == 0 {
        return;
    }
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        match entry.file_type() {
            Ok(t) if t.is_dir() => remove_dir_depth_limited(&path, max_depth - 1),
            _ => {
                let _ = std::fs::remove_file(&path);
            }
        }
    }
    let _ = std::fs::remove_dir(dir);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_creates_working_dir_and_change_queue() {
        let root = tempfile::tempdir().unwrap();
        let config = SyncSetConfig::new(
            root.path().join("src"),
            "/dst".to_string(),
            root.path().join("work"),
        );
        let supervisor = Supervisor::new("example".to_string(), config.clone()).unwrap();
        assert!(config.working_dir.exists());
        assert!(config.change_queue_dir().exists());
        assert_eq!(supervisor.state.action, SyncState::Waiting);
    }

    #[test]
    fn remove_dir_depth_limited_removes_nested_contents() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        std::fs::write(dir.path().join("a/b/file"), "x").unwrap();

        remove_dir_depth_limited(dir.path(), 10);

        assert!(!dir.path().exists());
    }

    #[tokio::test]
    async fn run_once_with_no_intervals_configured_does_nothing() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("src")).unwrap();
        let mut config = SyncSetConfig::new(
            root.path().join("src"),
            "/dst".to_string(),
            root.path().join("work"),
        );
        config.full_interval = std::time::Duration::ZERO;
        config.partial_interval = std::time::Duration::ZERO;

        let mut supervisor = Supervisor::new("example".to_string(), config).unwrap();
        supervisor.run_once().await.unwrap();
        assert_eq!(supervisor.state.action, SyncState::Waiting);
    }
}
