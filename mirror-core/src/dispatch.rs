//! Turns one batch of kernel events into tree mutations and Change Queue
//! insertions.

use std::ffi::OsStr;

use crate::kernel::{EventMask, KernelWatch, RawEvent};

enum Classification {
    Create,
    Update,
    Delete,
    None,
}

impl<K: KernelWatch> crate::engine::Engine<K> {
    /// Reads one batch (up to an 8KiB buffer inside the `KernelWatch`
    /// implementation) and dispatches every event in it. Returns the
    /// number of events processed, for callers that want to log batch
    /// sizes.
    pub fn read_and_dispatch(&mut self) -> crate::error::Result<usize> {
        let events = {
            let Some(kernel) = self.kernel.as_mut() else {
                return Ok(0);
            };
            kernel
                .read_events()
                .map_err(|source| crate::error::Error::EventRead { source })?
        };
        let count = events.len();
        self.dispatch_events(events);
        Ok(count)
    }

    pub fn dispatch_events(&mut self, events: Vec<RawEvent>) {
        for event in events {
            self.dispatch_one(event);
        }
    }

    fn dispatch_one(&mut self, event: RawEvent) {
        let Some(dir) = self.watch_index.lookup(event.watch) else {
            tracing::debug!(watch = event.watch.0, "event for unknown watch, dropping");
            return;
        };
        if !self.tree.dir_exists(dir) {
            return;
        }

        if event.mask.contains(EventMask::DELETE_SELF) {
            self.tree.remove_dir(
                dir,
                &mut self.watch_index,
                &mut self.change_queue,
                self.kernel.as_mut().map(|k| k as &mut dyn KernelWatch),
            );
            return;
        }

        let Some(name) = event.name.as_deref() else {
            return;
        };

        let is_dir = event.mask.contains(EventMask::IS_DIR);
        let classification = classify(event.mask, has_existing_child(self, dir, name, is_dir));

        match (classification, is_dir) {
            (Classification::Create, false) => self.file_create(dir, name),
            (Classification::Update, false) => self.file_update(dir, name),
            (Classification::Delete, false) => self.file_delete(dir, name),
            (Classification::Create, true) => self.dir_create(dir, name),
            (Classification::Update, true) => self.dir_update(dir, name),
            (Classification::Delete, true) => self.dir_delete(dir, name),
            (Classification::None, _) => {}
        }
    }

    fn file_create(&mut self, dir: crate::tree::DirHandle, name: &OsStr) {
        if self.filter.is_excluded(&name.to_string_lossy()) {
            return;
        }
        let abs = self.tree.dir_abs_path(dir).join(name);
        match std::fs::symlink_metadata(&abs) {
            Ok(m) if m.file_type().is_file() => {}
            _ => return,
        }
        let handle = self.tree.add_file(dir, name);
        self.change_queue.queue_file(handle, None);
    }

    fn file_update(&mut self, dir: crate::tree::DirHandle, name: &OsStr) {
        if let Some(handle) = self.tree.find_file(dir, name) {
            self.change_queue.queue_file(handle, None);
        }
    }

    fn file_delete(&mut self, dir: crate::tree::DirHandle, name: &OsStr) {
        let parent_rel = self.tree.dir_rel_path(dir);
        self.accumulator.mark_dir(&parent_rel);
        if let Some(handle) = self.tree.find_file(dir, name) {
            self.tree.remove_file(handle, &mut self.change_queue);
        }
    }

    fn dir_create(&mut self, dir: crate::tree::DirHandle, name: &OsStr) {
        if self.filter.is_excluded(&name.to_string_lossy()) {
            return;
        }
        let abs = self.tree.dir_abs_path(dir).join(name);
        match std::fs::symlink_metadata(&abs) {
            Ok(m) if m.file_type().is_dir() => {}
            _ => return,
        }
        if let Some(handle) = self.tree.add_dir(dir, name, self.max_depth) {
            self.change_queue.queue_dir(handle, None);
            let rel = self.tree.dir_rel_path(handle);
            self.accumulator.mark_dir(&rel);
        }
    }

    fn dir_update(&mut self, dir: crate::tree::DirHandle, name: &OsStr) {
        if let Some(handle) = self.tree.find_dir(dir, name) {
            self.change_queue.queue_dir(handle, None);
        }
    }

    fn dir_delete(&mut self, dir: crate::tree::DirHandle, name: &OsStr) {
        if let Some(handle) = self.tree.find_dir(dir, name) {
            self.tree.remove_dir(
                handle,
                &mut self.watch_index,
                &mut self.change_queue,
                self.kernel.as_mut().map(|k| k as &mut dyn KernelWatch),
            );
        }
        let parent_rel = self.tree.dir_rel_path(dir);
        self.accumulator.mark_dir(&parent_rel);
    }
}

fn has_existing_child<K: KernelWatch>(
    engine: &crate::engine::Engine<K>,
    dir: crate::tree::DirHandle,
    name: &OsStr,
    is_dir: bool,
) -> bool {
    if is_dir {
        engine.tree.find_dir(dir, name).is_some()
    } else {
        engine.tree.find_file(dir, name).is_some()
    }
}

/// Classifies an event mask into {CREATE, UPDATE, DELETE, NONE}
///. The CREATE-vs-UPDATE split handles renames arriving
/// as separate moved-from/moved-to pairs: a moved-to for a name we
/// already track (e.g. a rename that replaces an existing file) is an
/// UPDATE, not a second CREATE.
fn classify(mask: EventMask, existing_child: bool) -> Classification {
    let creates_or_updates = mask.intersects(EventMask::ATTRIB | EventMask::CREATE | EventMask::MODIFY | EventMask::MOVED_TO);
    let deletes = mask.intersects(EventMask::DELETE | EventMask::MOVED_FROM);

    if creates_or_updates {
        if existing_child {
            Classification::Update
        } else {
            Classification::Create
        }
    } else if deletes && existing_child {
        Classification::Delete
    } else {
        Classification::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use crate::kernel::{FakeKernelWatch, WatchId};
    use crate::path_filter::PathFilter;
    use crate::tree::ROOT;
    use std::ffi::OsString;

    fn engine_with_root_watch(root: std::path::PathBuf) -> (Engine<FakeKernelWatch>, WatchId) {
        let mut e = Engine::new(root, PathFilter::default(), 32, Some(FakeKernelWatch::new())).unwrap();
        e.install_watch(ROOT);
        let watch = e.tree.dir(ROOT).watch;
        (e, watch)
    }

    #[test]
    fn file_create_event_adds_node_and_queues_check() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hi").unwrap();
        let (mut e, watch) = engine_with_root_watch(dir.path().to_path_buf());

        e.dispatch_events(vec![RawEvent {
            watch,
            mask: EventMask::CREATE,
            name: Some(OsString::from("a.txt")),
        }]);

        assert!(e.tree.find_file(ROOT, OsStr::new("a.txt")).is_some());
        assert_eq!(e.change_queue.len(), 1);
    }

    #[test]
    fn file_delete_event_marks_parent_and_removes_node() {
        let dir = tempfile::tempdir().unwrap();
        let (mut e, watch) = engine_with_root_watch(dir.path().to_path_buf());
        let handle = e.tree.add_file(ROOT, OsStr::new("a.txt"));
        let _ = handle;

        e.dispatch_events(vec![RawEvent {
            watch,
            mask: EventMask::DELETE,
            name: Some(OsString::from("a.txt")),
        }]);

        assert!(e.tree.find_file(ROOT, OsStr::new("a.txt")).is_none());
        assert_eq!(e.accumulator.entries(), ["/"]);
    }

    #[test]
    fn moved_from_and_moved_to_pair_is_one_delete_and_one_create() {
        let src_dir = tempfile::tempdir().unwrap();
        let dst_dir = tempfile::tempdir().unwrap();
        std::fs::write(dst_dir.path().join("b.txt"), "moved").unwrap();

        let mut e = Engine::new(src_dir.path().to_path_buf(), PathFilter::default(), 32, Some(FakeKernelWatch::new())).unwrap();
        e.install_watch(ROOT);
        let src_watch = e.tree.dir(ROOT).watch;
        let src_file = e.tree.add_file(ROOT, OsStr::new("a.txt"));

        // moved-from at the source: acts like a delete.
        e.dispatch_events(vec![RawEvent {
            watch: src_watch,
            mask: EventMask::MOVED_FROM,
            name: Some(OsString::from("a.txt")),
        }]);
        assert!(!e.tree.file_exists(src_file));

        // moved-to at (conceptually) the destination watch: acts like a create.
        let dst = e.tree.add_dir(ROOT, OsStr::new("dst"), 32).unwrap();
        // Reuse the same watch id bookkeeping as if `dst` were watched.
        e.watch_index.insert(WatchId(999), dst);
        e.dispatch_events(vec![RawEvent {
            watch: WatchId(999),
            mask: EventMask::MOVED_TO,
            name: Some(OsString::from("a.txt")),
        }]);
    }

    #[test]
    fn unknown_watch_id_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let mut e = Engine::new(dir.path().to_path_buf(), PathFilter::default(), 32, Some(FakeKernelWatch::new())).unwrap();
        e.dispatch_events(vec![RawEvent {
            watch: WatchId(12345),
            mask: EventMask::CREATE,
            name: Some(OsString::from("x")),
        }]);
        assert!(e.accumulator.is_empty());
    }

    #[test]
    fn read_and_dispatch_surfaces_event_read_as_recoverable_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut e = Engine::new(dir.path().to_path_buf(), PathFilter::default(), 32, Some(FakeKernelWatch::new())).unwrap();
        e.kernel.as_mut().unwrap().fail_next_read = true;

        let err = e.read_and_dispatch().unwrap_err();
        assert!(matches!(err, crate::error::Error::EventRead { .. }));
        // The engine itself never tears down the handle on this error --
        // that decision, and the degrade-to-polling that follows it, is
        // the caller's (the watcher loop's).
        assert!(e.kernel.is_some());
    }
}
