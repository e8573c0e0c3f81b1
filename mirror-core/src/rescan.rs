//! One-level (or recursive) directory scan, reconciled with the Tree
//! Model.

use std::ffi::OsString;
use std::os::unix::fs::MetadataExt;

use crate::engine::{CheckOutcome, Engine};
use crate::kernel::KernelWatch;
use crate::tree::DirHandle;

impl<K: KernelWatch> Engine<K> {
    /// `scan(dir, no_recurse)`. Returns `Err` when the
    /// directory had to be removed (too deep, or stat failed) -- callers
    /// treat this the same way as any other implicit-delete.
    pub fn scan(&mut self, dir: DirHandle, no_recurse: bool) -> Result<(), ()> {
        // Step 1: depth check.
        if self.tree.dir(dir).depth > self.max_depth {
            self.tree
                .remove_dir(dir, &mut self.watch_index, &mut self.change_queue, self.kernel.as_mut().map(|k| k as &mut dyn KernelWatch));
            return Err(());
        }

        // Step 2: stat the directory, record device id.
        let abs_path = self.tree.dir_abs_path(dir);
        let meta = match std::fs::metadata(&abs_path) {
            Ok(m) if m.is_dir() => m,
            _ => {
                self.tree.remove_dir(
                    dir,
                    &mut self.watch_index,
                    &mut self.change_queue,
                    self.kernel.as_mut().map(|k| k as &mut dyn KernelWatch),
                );
                return Err(());
            }
        };
        self.tree.dir_mut(dir).device = meta.dev();
        let parent_device = meta.dev();

        // Step 3: list children, sorted for determinism, filtered.
        let mut names: Vec<OsString> = match std::fs::read_dir(&abs_path) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name())
                .filter(|name| !self.filter.is_excluded(&name.to_string_lossy()))
                .collect(),
            Err(_) => {
                self.tree.remove_dir(
                    dir,
                    &mut self.watch_index,
                    &mut self.change_queue,
                    self.kernel.as_mut().map(|k| k as &mut dyn KernelWatch),
                );
                return Err(());
            }
        };
        names.sort();

        // Step 4: clear seen marks.
        for &f in &self.tree.dir(dir).child_files.clone() {
            self.tree.file_mut(f).seen_in_rescan = false;
        }
        for &d in &self.tree.dir(dir).child_dirs.clone() {
            self.tree.dir_mut(d).seen_in_rescan = false;
        }

        // Step 5: reconcile each listed name.
        let mut recurse_into: Vec<DirHandle> = Vec::new();
        for name in &names {
            let child_path = abs_path.join(name);
            let lmeta = match std::fs::symlink_metadata(&child_path) {
                Ok(m) => m,
                Err(_) => continue,
            };

            if lmeta.file_type().is_file() {
                let handle = self.tree.add_file(dir, name);
                self.tree.file_mut(handle).seen_in_rescan = true;
            } else if lmeta.file_type().is_dir() {
                // Never cross filesystem boundaries.
                if lmeta.dev() != parent_device {
                    continue;
                }
                if let Some(handle) = self.tree.add_dir(dir, name, self.max_depth) {
                    self.tree.dir_mut(handle).seen_in_rescan = true;
                    recurse_into.push(handle);
                }
            }
        }

        // Step 6: remove unseen subdirectories; recurse into seen ones.
        let existing_dirs = self.tree.dir(dir).child_dirs.clone();
        for child in existing_dirs {
            if !self.tree.dir_exists(child) {
                continue;
            }
            if !self.tree.dir(child).seen_in_rescan {
                self.tree.remove_dir(
                    child,
                    &mut self.watch_index,
                    &mut self.change_queue,
                    self.kernel.as_mut().map(|k| k as &mut dyn KernelWatch),
                );
            } else if !no_recurse {
                let _ = self.scan(child, false);
            }
        }

        // Step 7: remove unseen files.
        let existing_files = self.tree.dir(dir).child_files.clone();
        for child in existing_files {
            if self.tree.file_exists(child) && !self.tree.file(child).seen_in_rescan {
                self.tree.remove_file(child, &mut self.change_queue);
            }
        }

        // Step 8: check remaining files for changes; remove on failure.
        // Deliberately asymmetric: a deletion discovered here does NOT
        // mark the parent as changed, unlike the change-queue drain and
        // event-dispatcher delete paths.
        let remaining_files = self.tree.dir(dir).child_files.clone();
        for file in remaining_files {
            if !self.tree.file_exists(file) {
                continue;
            }
            match self.check_changed(file) {
                CheckOutcome::Deleted => {
                    self.tree.remove_file(file, &mut self.change_queue);
                }
                CheckOutcome::Changed => {
                    let rel = self.tree.file_rel_path(file);
                    self.accumulator.mark_file(&rel);
                }
                CheckOutcome::Unchanged => {}
            }
        }

        // Step 9: install a watch if notifications are enabled and it
        // doesn't have one yet.
        if self.notifications_enabled() {
            self.install_watch(dir);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use crate::kernel::FakeKernelWatch;
    use crate::path_filter::PathFilter;
    use crate::tree::ROOT;

    fn engine(root: std::path::PathBuf) -> Engine<FakeKernelWatch> {
        Engine::new(root, PathFilter::default(), 32, Some(FakeKernelWatch::new())).unwrap()
    }

    #[test]
    fn two_consecutive_scans_of_unchanged_tree_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hi").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/b.txt"), "yo").unwrap();

        let mut e = engine(dir.path().to_path_buf());
        e.scan(ROOT, false).unwrap();
        e.accumulator.clear();
        e.scan(ROOT, false).unwrap();

        assert!(e.accumulator.is_empty());
        assert_eq!(e.tree.dir(ROOT).child_files.len(), 1);
        assert_eq!(e.tree.dir(ROOT).child_dirs.len(), 1);
    }

    #[test]
    fn scan_removes_nodes_for_deleted_entries() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        std::fs::create_dir(&sub).unwrap();

        let mut e = engine(dir.path().to_path_buf());
        e.scan(ROOT, false).unwrap();
        assert_eq!(e.tree.dir(ROOT).child_dirs.len(), 1);

        std::fs::remove_dir(&sub).unwrap();
        e.scan(ROOT, false).unwrap();
        assert!(e.tree.dir(ROOT).child_dirs.is_empty());
    }

    #[test]
    fn creating_directory_at_max_depth_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();

        let mut e = Engine::new(dir.path().to_path_buf(), PathFilter::default(), 1, Some(FakeKernelWatch::new())).unwrap();
        e.scan(ROOT, false).unwrap();
        let a = e.tree.find_dir(ROOT, std::ffi::OsStr::new("a")).unwrap();
        assert_eq!(e.tree.dir(a).child_dirs.len(), 0);
    }

    #[test]
    fn excluded_leaf_never_enters_the_tree() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("c~"), "x").unwrap();
        std::fs::write(dir.path().join("keep.txt"), "x").unwrap();

        let mut e = engine(dir.path().to_path_buf());
        e.scan(ROOT, false).unwrap();

        assert!(e.tree.find_file(ROOT, std::ffi::OsStr::new("c~")).is_none());
        assert!(e.tree.find_file(ROOT, std::ffi::OsStr::new("keep.txt")).is_some());
    }
}
