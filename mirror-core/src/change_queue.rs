//! Deferred-work queue of (file or directory, earliest-process time) items,
//! deduplicated by target.
//!
//! Implemented as a vector with tombstone compaction plus a secondary
//! dedup set rather than a sorted array: at most one pending entry per
//! referent, due entries drained in insertion order, not-yet-due entries
//! retained.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use crate::tree::{DirHandle, FileHandle};

/// Coalescing window for file writes: bursts of writes to
/// one file collapse into a single deferred check.
pub const FILE_COALESCE_WINDOW: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    File(FileHandle),
    Dir(DirHandle),
}

struct Entry {
    when: Instant,
    target: Target,
}

/// At most one non-tombstone entry per file pointer and per directory
/// pointer.
#[derive(Default)]
pub struct ChangeQueue {
    entries: Vec<Entry>,
    queued: HashSet<Target>,
}

impl ChangeQueue {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            queued: HashSet::new(),
        }
    }

    /// `queue_file(f, when)`: default `when` = now + 2s; skipped if already
    /// queued.
    pub fn queue_file(&mut self, file: FileHandle, when: Option<Instant>) {
        self.queue(Target::File(file), when.unwrap_or_else(|| Instant::now() + FILE_COALESCE_WINDOW));
    }

    /// `queue_dir(d, when)`: default `when` = now; same dedup rule.
    pub fn queue_dir(&mut self, dir: DirHandle, when: Option<Instant>) {
        self.queue(Target::Dir(dir), when.unwrap_or_else(Instant::now));
    }

    fn queue(&mut self, target: Target, when: Instant) {
        if self.queued.contains(&target) {
            return;
        }
        self.queued.insert(target);
        self.entries.push(Entry { when, target });
    }

    pub fn cancel_file(&mut self, file: FileHandle) {
        self.cancel(Target::File(file));
    }

    pub fn cancel_dir(&mut self, dir: DirHandle) {
        self.cancel(Target::Dir(dir));
    }

    fn cancel(&mut self, target: Target) {
        if self.queued.remove(&target) {
            self.entries.retain(|e| e.target != target);
        }
    }

    /// Removes and returns every entry whose `when <= now`, processed
    /// within `deadline`. Entries not yet due, or found after `deadline`
    /// has passed, are retained in order -- this caps how much of one
    /// overloaded tick goes to queue draining.
    ///
    /// Bounded by `deadline`, not by count: once `Instant::now() >=
    /// deadline` the remaining entries (due or not) are left for the next
    /// drain pass.
    pub fn take_due(&mut self, deadline: Instant) -> Vec<Target> {
        let now = Instant::now();
        let mut due = Vec::new();
        let mut retained = Vec::new();

        for entry in self.entries.drain(..) {
            if Instant::now() >= deadline {
                retained.push(entry);
                continue;
            }
            if entry.when <= now {
                self.queued.remove(&entry.target);
                due.push(entry.target);
            } else {
                retained.push(entry);
            }
        }

        self.entries = retained;
        due
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedups_by_target() {
        let mut q = ChangeQueue::new();
        q.queue_file(FileHandle(1), Some(Instant::now()));
        q.queue_file(FileHandle(1), Some(Instant::now()));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn take_due_leaves_not_yet_due_entries_in_place() {
        let mut q = ChangeQueue::new();
        let due_time = Instant::now();
        let future_time = Instant::now() + Duration::from_secs(60);
        q.queue_dir(DirHandle(1), Some(due_time));
        q.queue_file(FileHandle(2), Some(future_time));

        let due = q.take_due(Instant::now() + Duration::from_secs(5));
        assert_eq!(due, vec![Target::Dir(DirHandle(1))]);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn cancel_removes_pending_entry() {
        let mut q = ChangeQueue::new();
        q.queue_file(FileHandle(5), Some(Instant::now()));
        q.cancel_file(FileHandle(5));
        assert!(q.is_empty());
        assert!(q.take_due(Instant::now() + Duration::from_secs(1)).is_empty());
    }
}
