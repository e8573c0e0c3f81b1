//! The Top Directory: Tree Model + Watch Index + Change Queue + Changed-
//! Paths Accumulator bound together with the kernel notification handle
//! and the configuration they share.
//!
//! Rescan (`rescan.rs`) and event dispatch (`dispatch.rs`) are implemented
//! as additional `impl` blocks on [`Engine`] in their own modules, since
//! both need simultaneous access to every field here.

use std::os::unix::fs::MetadataExt;
use std::path::PathBuf;
use std::time::{Instant, SystemTime};

use crate::accumulator::Accumulator;
use crate::change_queue::{ChangeQueue, Target};
use crate::error::{Error, Result};
use crate::kernel::{DIRECTORY_WATCH_MASK, KernelWatch, WatchId};
use crate::path_filter::PathFilter;
use crate::tree::{DirHandle, FileHandle, Tree, ROOT};
use crate::watch_index::WatchIndex;

pub struct Engine<K: KernelWatch> {
    pub tree: Tree,
    pub watch_index: WatchIndex,
    pub change_queue: ChangeQueue,
    pub accumulator: Accumulator,
    pub filter: PathFilter,
    pub max_depth: u32,
    pub kernel: Option<K>,
}

/// Outcome of a per-file on-disk check.
pub enum CheckOutcome {
    Unchanged,
    Changed,
    Deleted,
}

impl<K: KernelWatch> Engine<K> {
    pub fn new(root: PathBuf, filter: PathFilter, max_depth: u32, kernel: Option<K>) -> Result<Self> {
        let canonical = root.canonicalize().map_err(|source| Error::TopDirUnresolvable {
            path: root.clone(),
            source,
        })?;
        Ok(Self {
            tree: Tree::new(canonical),
            watch_index: WatchIndex::new(),
            change_queue: ChangeQueue::new(),
            accumulator: Accumulator::new(),
            filter,
            max_depth,
            kernel,
        })
    }

    pub fn notifications_enabled(&self) -> bool {
        self.kernel.is_some()
    }

    /// Installs a kernel watch on `dir` if notifications are enabled and
    /// it doesn't already have one. Logs and continues on failure,
    /// recording the attempt so a directory is never retried every tick.
    pub fn install_watch(&mut self, dir: DirHandle) {
        if self.tree.dir(dir).watch != WatchId::NONE {
            return;
        }
        let Some(kernel) = self.kernel.as_mut() else {
            return;
        };
        let path = self.tree.dir_abs_path(dir);
        match kernel.add_watch(&path, DIRECTORY_WATCH_MASK) {
            Ok(id) => {
                self.tree.dir_mut(dir).watch = id;
                self.tree.dir_mut(dir).watch_install_failed = false;
                self.watch_index.insert(id, dir);
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to install kernel watch");
                self.tree.dir_mut(dir).watch_install_failed = true;
            }
        }
    }

    /// `check_changed(f)`: stat the file; if it fails or it is no longer a
    /// regular file, the caller should remove it and mark the parent
    /// changed. If (mtime, size) differ from the recorded value, they are
    /// updated and the file is reported changed.
    pub fn check_changed(&mut self, file: FileHandle) -> CheckOutcome {
        let path = self.tree.file_abs_path(file);
        let meta = match std::fs::symlink_metadata(&path) {
            Ok(m) if m.file_type().is_file() => m,
            _ => return CheckOutcome::Deleted,
        };

        let mtime = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(meta.mtime().max(0) as u64);
        let size = meta.size();

        let node = self.tree.file_mut(file);
        if node.mtime != mtime || node.size != size {
            node.mtime = mtime;
            node.size = size;
            CheckOutcome::Changed
        } else {
            CheckOutcome::Unchanged
        }
    }

    /// Queues a full rescan of the root directory -- used by the Watcher
    /// Loop's periodic full-scan deadline.
    pub fn queue_root_rescan(&mut self) {
        self.change_queue.queue_dir(ROOT, Some(Instant::now()));
    }

    /// Drains due Change Queue entries within `deadline`. File entries run `check_changed`; directory
    /// entries run a recursive rescan.
    pub fn drain_change_queue(&mut self, deadline: Instant) {
        let due = self.change_queue.take_due(deadline);
        for target in due {
            match target {
                Target::File(file) => {
                    if !self.tree.file_exists(file) {
                        continue;
                    }
                    match self.check_changed(file) {
                        CheckOutcome::Deleted => {
                            let parent = self.tree.file(file).parent;
                            let parent_path = self.tree.dir_rel_path(parent);
                            self.accumulator.mark_dir(&parent_path);
                            self.tree.remove_file(file, &mut self.change_queue);
                        }
                        CheckOutcome::Changed => {
                            let rel = self.tree.file_rel_path(file);
                            self.accumulator.mark_file(&rel);
                        }
                        CheckOutcome::Unchanged => {}
                    }
                }
                Target::Dir(dir) => {
                    if !self.tree.dir_exists(dir) {
                        continue;
                    }
                    let _ = self.scan(dir, false);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::FakeKernelWatch;

    fn engine(root: PathBuf) -> Engine<FakeKernelWatch> {
        Engine::new(root, PathFilter::default(), 32, Some(FakeKernelWatch::new())).unwrap()
    }

    #[test]
    fn queuing_same_file_repeatedly_yields_one_pending_entry() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hi").unwrap();
        let mut e = engine(dir.path().to_path_buf());
        let file = e.tree.add_file(ROOT, std::ffi::OsStr::new("a.txt"));
        for _ in 0..5 {
            e.change_queue.queue_file(file, Some(Instant::now()));
        }
        assert_eq!(e.change_queue.len(), 1);
    }

    #[test]
    fn check_changed_detects_size_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "hi").unwrap();
        let mut e = engine(dir.path().to_path_buf());
        let file = e.tree.add_file(ROOT, std::ffi::OsStr::new("a.txt"));
        assert!(matches!(e.check_changed(file), CheckOutcome::Changed));
        assert!(matches!(e.check_changed(file), CheckOutcome::Unchanged));

        std::fs::write(&path, "hello there").unwrap();
        assert!(matches!(e.check_changed(file), CheckOutcome::Changed));
    }

    #[test]
    fn check_changed_reports_deleted_when_file_gone() {
        let dir = tempfile::tempdir().unwrap();
        let mut e = engine(dir.path().to_path_buf());
        let file = e.tree.add_file(ROOT, std::ffi::OsStr::new("missing.txt"));
        assert!(matches!(e.check_changed(file), CheckOutcome::Deleted));
    }
}
