//! The supervisor's action label and the bookkeeping it carries between
//! iterations.

use std::time::SystemTime;

/// Current action label. Exactly one of these is active at a time; the
/// supervisor loop advances through them, never running two at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Waiting,
    ValidateSource,
    ValidateDestination,
    SyncFullAwaitingLock,
    SyncFull,
    SyncPartialAwaitingLock,
    SyncPartial,
}

impl SyncState {
    pub fn label(self) -> &'static str {
        match self {
            SyncState::Waiting => "WAITING",
            SyncState::ValidateSource => "VALIDATE-SOURCE",
            SyncState::ValidateDestination => "VALIDATE-DESTINATION",
            SyncState::SyncFullAwaitingLock => "SYNC-FULL-AWAITING-LOCK",
            SyncState::SyncFull => "SYNC-FULL",
            SyncState::SyncPartialAwaitingLock => "SYNC-PARTIAL-AWAITING-LOCK",
            SyncState::SyncPartial => "SYNC-PARTIAL",
        }
    }
}

/// One of "OK", "FAILED", or unset ("-").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LastStatus {
    #[default]
    Unset,
    Ok,
    Failed,
}

impl LastStatus {
    pub fn label(self) -> &'static str {
        match self {
            LastStatus::Unset => "-",
            LastStatus::Ok => "OK",
            LastStatus::Failed => "FAILED",
        }
    }
}

/// Everything the supervisor tracks across iterations for one sync set.
#[derive(Debug, Clone)]
pub struct SyncSetState {
    pub action: SyncState,
    /// 0 when no watcher child is running.
    pub watcher_pid: i32,
    pub last_full_sync: Option<SystemTime>,
    pub next_full_sync: SystemTime,
    pub last_partial_sync: Option<SystemTime>,
    pub next_partial_sync: SystemTime,
    pub last_full_failure: Option<SystemTime>,
    pub last_partial_failure: Option<SystemTime>,
    pub last_full_status: LastStatus,
    pub last_partial_status: LastStatus,
    pub full_failure_count: u64,
    pub partial_failure_count: u64,
}

impl SyncSetState {
    pub fn new(now: SystemTime) -> Self {
        Self {
            action: SyncState::Waiting,
            watcher_pid: 0,
            last_full_sync: None,
            next_full_sync: now,
            last_partial_sync: None,
            next_partial_sync: now,
            last_full_failure: None,
            last_partial_failure: None,
            last_full_status: LastStatus::Unset,
            last_partial_status: LastStatus::Unset,
            full_failure_count: 0,
            partial_failure_count: 0,
        }
    }

    pub fn watcher_alive(&self) -> bool {
        self.watcher_pid != 0
    }

    pub fn record_full_success(&mut self, now: SystemTime, next_interval: std::time::Duration) {
        self.last_full_sync = Some(now);
        self.full_failure_count = 0;
        self.last_full_status = LastStatus::Ok;
        self.next_full_sync = now + next_interval;
    }

    pub fn record_full_failure(&mut self, now: SystemTime, retry: std::time::Duration) {
        self.last_full_failure = Some(now);
        self.full_failure_count += 1;
        self.last_full_status = LastStatus::Failed;
        self.next_full_sync = now + retry;
    }

    pub fn record_partial_success(&mut self, now: SystemTime, next_interval: std::time::Duration) {
        self.last_partial_sync = Some(now);
        self.partial_failure_count = 0;
        self.last_partial_status = LastStatus::Ok;
        self.next_partial_sync = now + next_interval;
    }

    pub fn record_partial_failure(&mut self, now: SystemTime, retry: std::time::Duration) {
        self.last_partial_failure = Some(now);
        self.partial_failure_count += 1;
        self.last_partial_status = LastStatus::Failed;
        self.next_partial_sync = now + retry;
    }
}
