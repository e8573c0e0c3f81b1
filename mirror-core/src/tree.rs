//! The in-memory forest rooted at the watched top directory.
//!
//! Nodes live in a flat arena and refer to each other by stable handles
//! rather than `Rc`/`Weak` cycles. A handle is never reused while any live
//! node still references it as a parent -- removal always detaches
//! children first (see [`Tree::remove_dir`]).

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::change_queue::ChangeQueue;
use crate::kernel::{KernelWatch, WatchId};
use crate::watch_index::WatchIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DirHandle(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileHandle(pub usize);

/// The root directory always lives at this handle.
pub const ROOT: DirHandle = DirHandle(0);

#[derive(Debug)]
pub struct DirNode {
    pub leaf: OsString,
    pub parent: Option<DirHandle>,
    pub depth: u32,
    pub watch: WatchId,
    /// Set once an install attempt has been made and failed, so a
    /// directory with no watch can be told apart from one that simply
    /// hasn't been scanned yet, without re-attempting forever.
    pub watch_install_failed: bool,
    pub device: u64,
    pub child_files: Vec<FileHandle>,
    pub child_dirs: Vec<DirHandle>,
    pub files_unsorted: bool,
    pub dirs_unsorted: bool,
    pub seen_in_rescan: bool,
}

#[derive(Debug)]
pub struct FileNode {
    pub leaf: OsString,
    pub parent: DirHandle,
    pub mtime: SystemTime,
    pub size: u64,
    pub seen_in_rescan: bool,
}

/// The arena-backed tree for one watcher instance, plus the root path
/// needed to turn absolute paths into the relative paths the
/// Changed-Paths Accumulator emits.
pub struct Tree {
    root_path: PathBuf,
    dirs: Vec<Option<DirNode>>,
    files: Vec<Option<FileNode>>,
    free_dirs: Vec<usize>,
    free_files: Vec<usize>,
}

impl Tree {
    pub fn new(root_path: PathBuf) -> Self {
        let root = DirNode {
            leaf: OsString::new(),
            parent: None,
            depth: 0,
            watch: WatchId::NONE,
            watch_install_failed: false,
            device: 0,
            child_files: Vec::new(),
            child_dirs: Vec::new(),
            files_unsorted: false,
            dirs_unsorted: false,
            seen_in_rescan: false,
        };
        Self {
            root_path,
            dirs: vec![Some(root)],
            files: Vec::new(),
            free_dirs: Vec::new(),
            free_files: Vec::new(),
        }
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    pub fn dir(&self, h: DirHandle) -> &DirNode {
        self.dirs[h.0].as_ref().expect("dead directory handle")
    }

    pub fn dir_mut(&mut self, h: DirHandle) -> &mut DirNode {
        self.dirs[h.0].as_mut().expect("dead directory handle")
    }

    pub fn file(&self, h: FileHandle) -> &FileNode {
        self.files[h.0].as_ref().expect("dead file handle")
    }

    pub fn file_mut(&mut self, h: FileHandle) -> &mut FileNode {
        self.files[h.0].as_mut().expect("dead file handle")
    }

    pub fn dir_exists(&self, h: DirHandle) -> bool {
        self.dirs.get(h.0).is_some_and(Option::is_some)
    }

    pub fn file_exists(&self, h: FileHandle) -> bool {
        self.files.get(h.0).is_some_and(Option::is_some)
    }

    /// Find an existing child file by leaf name. No two siblings ever
    /// share a leaf name.
    pub fn find_file(&self, parent: DirHandle, leaf: &OsStr) -> Option<FileHandle> {
        self.dir(parent)
            .child_files
            .iter()
            .find(|&&h| self.file(h).leaf == leaf)
            .copied()
    }

    pub fn find_dir(&self, parent: DirHandle, leaf: &OsStr) -> Option<DirHandle> {
        self.dir(parent)
            .child_dirs
            .iter()
            .find(|&&h| self.dir(h).leaf == leaf)
            .copied()
    }

    /// `add_file(dir, leaf)`: returns the existing file
    /// node of that leaf if any, else appends a new one.
    pub fn add_file(&mut self, parent: DirHandle, leaf: &OsStr) -> FileHandle {
        if let Some(existing) = self.find_file(parent, leaf) {
            return existing;
        }
        let node = FileNode {
            leaf: leaf.to_os_string(),
            parent,
            mtime: SystemTime::UNIX_EPOCH,
            size: 0,
            seen_in_rescan: false,
        };
        let idx = if let Some(idx) = self.free_files.pop() {
            self.files[idx] = Some(node);
            idx
        } else {
            self.files.push(Some(node));
            self.files.len() - 1
        };
        let handle = FileHandle(idx);
        self.dir_mut(parent).child_files.push(handle);
        self.dir_mut(parent).files_unsorted = true;
        handle
    }

    /// `add_dir(parent, leaf)`: refuses when
    /// `parent.depth >= max_depth`.
    pub fn add_dir(&mut self, parent: DirHandle, leaf: &OsStr, max_depth: u32) -> Option<DirHandle> {
        if let Some(existing) = self.find_dir(parent, leaf) {
            return Some(existing);
        }
        let parent_depth = self.dir(parent).depth;
        if parent_depth >= max_depth {
            return None;
        }
        let node = DirNode {
            leaf: leaf.to_os_string(),
            parent: Some(parent),
            depth: parent_depth + 1,
            watch: WatchId::NONE,
            watch_install_failed: false,
            device: 0,
            child_files: Vec::new(),
            child_dirs: Vec::new(),
            files_unsorted: false,
            dirs_unsorted: false,
            seen_in_rescan: false,
        };
        let idx = if let Some(idx) = self.free_dirs.pop() {
            self.dirs[idx] = Some(node);
            idx
        } else {
            self.dirs.push(Some(node));
            self.dirs.len() - 1
        };
        let handle = DirHandle(idx);
        self.dir_mut(parent).child_dirs.push(handle);
        self.dir_mut(parent).dirs_unsorted = true;
        Some(handle)
    }

    /// `remove_file(f)`: splices from parent, drops from
    /// the Change Queue, frees the slot.
    pub fn remove_file(&mut self, handle: FileHandle, queue: &mut ChangeQueue) {
        if !self.file_exists(handle) {
            return;
        }
        let parent = self.file(handle).parent;
        if self.dir_exists(parent) {
            self.dir_mut(parent).child_files.retain(|&h| h != handle);
        }
        queue.cancel_file(handle);
        self.files[handle.0] = None;
        self.free_files.push(handle.0);
    }

    /// `remove_dir(d)`: removes the watch (tolerating
    /// `EINVAL`), drops it from the Watch Index, recursively removes
    /// children (clearing each child's parent pointer first so the
    /// child's own splice is a no-op), splices from its own parent, drops
    /// from the Change Queue, frees the slot.
    pub fn remove_dir(
        &mut self,
        handle: DirHandle,
        watch_index: &mut WatchIndex,
        queue: &mut ChangeQueue,
        kernel: Option<&mut dyn KernelWatch>,
    ) {
        self.remove_dir_inner(handle, watch_index, queue, kernel, true);
    }

    fn remove_dir_inner(
        &mut self,
        handle: DirHandle,
        watch_index: &mut WatchIndex,
        queue: &mut ChangeQueue,
        mut kernel: Option<&mut dyn KernelWatch>,
        splice_from_parent: bool,
    ) {
        if !self.dir_exists(handle) {
            return;
        }

        let watch = self.dir(handle).watch;
        if watch != WatchId::NONE {
            if let Some(kernel) = kernel.as_deref_mut() {
                // EINVAL (directory already gone) is tolerated by KernelWatch::rm_watch.
                let _ = kernel.rm_watch(watch);
            }
            watch_index.remove(watch);
        }

        let child_dirs = std::mem::take(&mut self.dir_mut(handle).child_dirs);
        for child in child_dirs {
            self.remove_dir_inner(child, watch_index, queue, kernel.as_deref_mut(), false);
        }
        let child_files = std::mem::take(&mut self.dir_mut(handle).child_files);
        for child in child_files {
            self.remove_file(child, queue);
        }

        if splice_from_parent
            && let Some(parent) = self.dir(handle).parent
            && self.dir_exists(parent)
        {
            self.dir_mut(parent).child_dirs.retain(|&h| h != handle);
        }

        queue.cancel_dir(handle);
        self.dirs[handle.0] = None;
        self.free_dirs.push(handle.0);
    }

    /// Absolute filesystem path of a directory node.
    pub fn dir_abs_path(&self, handle: DirHandle) -> PathBuf {
        let mut components = Vec::new();
        let mut cur = handle;
        loop {
            let node = self.dir(cur);
            if node.parent.is_none() {
                break;
            }
            components.push(node.leaf.clone());
            cur = node.parent.unwrap();
        }
        components.reverse();
        let mut path = self.root_path.clone();
        for c in components {
            path.push(c);
        }
        path
    }

    pub fn file_abs_path(&self, handle: FileHandle) -> PathBuf {
        let node = self.file(handle);
        let mut path = self.dir_abs_path(node.parent);
        path.push(&node.leaf);
        path
    }

    /// Path relative to the top directory; root's relative path is empty.
    pub fn dir_rel_path(&self, handle: DirHandle) -> String {
        path_suffix(&self.root_path, &self.dir_abs_path(handle))
    }

    pub fn file_rel_path(&self, handle: FileHandle) -> String {
        path_suffix(&self.root_path, &self.file_abs_path(handle))
    }
}

fn path_suffix(root: &Path, full: &Path) -> String {
    match full.strip_prefix(root) {
        Ok(rest) => rest.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/"),
        Err(_) => full.to_string_lossy().into_owned(),
    }
}
