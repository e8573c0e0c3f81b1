//! Abstraction over the kernel notification API.
//!
//! Everything above this module (`rescan`, `dispatch`, the watcher loop)
//! talks to [`KernelWatch`] rather than the `inotify` crate directly, so
//! the Tree Model / Rescan Engine / Event Dispatcher can be driven in unit
//! tests with [`FakeKernelWatch`] instead of a real filesystem and a real
//! kernel.

use std::ffi::OsString;
use std::os::fd::RawFd;
use std::path::Path;

use bitflags::bitflags;

bitflags! {
    /// The subset of inotify event bits the change-detection engine cares
    /// about. Named after our own event-mask vocabulary rather than the
    /// raw `IN_*` constants, since a non-Linux backend would express the
    /// same six concepts differently.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EventMask: u32 {
        const CREATE       = 1 << 0;
        const DELETE       = 1 << 1;
        const MODIFY       = 1 << 2;
        const ATTRIB       = 1 << 3;
        const MOVED_FROM   = 1 << 4;
        const MOVED_TO     = 1 << 5;
        const DELETE_SELF  = 1 << 6;
        const IS_DIR       = 1 << 7;
        const Q_OVERFLOW   = 1 << 8;
    }
}

/// Event mask installed on every directory the Rescan Engine watches
///.
pub const DIRECTORY_WATCH_MASK: EventMask = EventMask::CREATE
    .union(EventMask::DELETE)
    .union(EventMask::MODIFY)
    .union(EventMask::DELETE_SELF)
    .union(EventMask::MOVED_FROM)
    .union(EventMask::MOVED_TO)
    .union(EventMask::ATTRIB);

/// A kernel-assigned watch identifier. `-1` denotes "unwatched".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchId(pub i32);

impl WatchId {
    pub const NONE: WatchId = WatchId(-1);
}

/// One decoded kernel event.
#[derive(Debug, Clone)]
pub struct RawEvent {
    pub watch: WatchId,
    pub mask: EventMask,
    pub name: Option<OsString>,
}

/// Operations the rest of the crate needs from a kernel notification
/// handle. Implemented for Linux inotify via [`InotifyWatch`]; a
/// polling-only deployment (no notification handle available) is modeled
/// by simply not constructing one -- the watcher loop already tolerates
/// `None`.
pub trait KernelWatch {
    /// Install a watch for `mask` on `path`. Returns the kernel-assigned id.
    fn add_watch(&mut self, path: &Path, mask: EventMask) -> std::io::Result<WatchId>;

    /// Remove a previously installed watch. Implementations must map
    /// `EINVAL` (the watch is already gone) into `Ok(())` so callers don't
    /// need to special-case it.
    fn rm_watch(&mut self, id: WatchId) -> std::io::Result<()>;

    /// Read one batch of available events, non-blocking. Returns an empty
    /// vector if none are currently available.
    fn read_events(&mut self) -> std::io::Result<Vec<RawEvent>>;

    /// Raw fd suitable for `poll(2)`, so the Watcher Loop can wait up to
    /// 100ms for readability without busy-polling `read_events`.
    fn as_raw_fd(&self) -> RawFd;
}

/// Linux inotify-backed implementation.
///
/// `inotify::WatchDescriptor` carries no public raw-integer accessor (by
/// design -- it exists to be compared and removed, not serialized), so
/// this type keeps its own `WatchId -> WatchDescriptor` side table rather
/// than trying to reconstruct one from an integer.
pub struct InotifyWatch {
    inner: inotify::Inotify,
    buffer: [u8; 8192],
    next_id: i32,
    descriptors: std::collections::HashMap<WatchId, inotify::WatchDescriptor>,
}

impl InotifyWatch {
    pub fn new() -> std::io::Result<Self> {
        let inner = inotify::Inotify::init()?;
        Ok(Self {
            inner,
            buffer: [0u8; 8192],
            next_id: 1,
            descriptors: std::collections::HashMap::new(),
        })
    }

    fn to_inotify_mask(mask: EventMask) -> inotify::WatchMask {
        let mut m = inotify::WatchMask::empty();
        if mask.contains(EventMask::CREATE) {
            m |= inotify::WatchMask::CREATE;
        }
        if mask.contains(EventMask::DELETE) {
            m |= inotify::WatchMask::DELETE;
        }
        if mask.contains(EventMask::MODIFY) {
            m |= inotify::WatchMask::MODIFY;
        }
        if mask.contains(EventMask::ATTRIB) {
            m |= inotify::WatchMask::ATTRIB;
        }
        if mask.contains(EventMask::DELETE_SELF) {
            m |= inotify::WatchMask::DELETE_SELF;
        }
        if mask.contains(EventMask::MOVED_FROM) {
            m |= inotify::WatchMask::MOVED_FROM;
        }
        if mask.contains(EventMask::MOVED_TO) {
            m |= inotify::WatchMask::MOVED_TO;
        }
        m
    }

    fn from_inotify_mask(mask: inotify::EventMask) -> EventMask {
        let mut out = EventMask::empty();
        if mask.contains(inotify::EventMask::CREATE) {
            out |= EventMask::CREATE;
        }
        if mask.contains(inotify::EventMask::DELETE) {
            out |= EventMask::DELETE;
        }
        if mask.contains(inotify::EventMask::MODIFY) {
            out |= EventMask::MODIFY;
        }
        if mask.contains(inotify::EventMask::ATTRIB) {
            out |= EventMask::ATTRIB;
        }
        if mask.contains(inotify::EventMask::DELETE_SELF) {
            out |= EventMask::DELETE_SELF;
        }
        if mask.contains(inotify::EventMask::MOVED_FROM) {
            out |= EventMask::MOVED_FROM;
        }
        if mask.contains(inotify::EventMask::MOVED_TO) {
            out |= EventMask::MOVED_TO;
        }
        if mask.contains(inotify::EventMask::ISDIR) {
            out |= EventMask::IS_DIR;
        }
        if mask.contains(inotify::EventMask::Q_OVERFLOW) {
            out |= EventMask::Q_OVERFLOW;
        }
        out
    }
}

impl KernelWatch for InotifyWatch {
    fn add_watch(&mut self, path: &Path, mask: EventMask) -> std::io::Result<WatchId> {
        let wd = self.inner.watches().add(path, Self::to_inotify_mask(mask))?;
        // If this path was already watched, the kernel reuses the existing
        // descriptor; reuse our id for it too instead of minting a new one.
        if let Some((&id, _)) = self.descriptors.iter().find(|(_, d)| **d == wd) {
            return Ok(id);
        }
        let id = WatchId(self.next_id);
        self.next_id += 1;
        self.descriptors.insert(id, wd);
        Ok(id)
    }

    fn rm_watch(&mut self, id: WatchId) -> std::io::Result<()> {
        let Some(wd) = self.descriptors.remove(&id) else {
            return Ok(());
        };
        match self.inner.watches().remove(wd) {
            Ok(()) => Ok(()),
            Err(e) if e.raw_os_error() == Some(libc::EINVAL) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn read_events(&mut self) -> std::io::Result<Vec<RawEvent>> {
        let raw: Vec<(inotify::WatchDescriptor, inotify::EventMask, Option<OsString>)> =
            match self.inner.read_events(&mut self.buffer) {
                Ok(events) => events
                    .map(|e| (e.wd, e.mask, e.name.map(|n| n.to_os_string())))
                    .collect(),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Vec::new(),
                Err(e) => return Err(e),
            };

        Ok(raw
            .into_iter()
            .filter_map(|(wd, mask, name)| {
                let id = self
                    .descriptors
                    .iter()
                    .find(|(_, d)| **d == wd)
                    .map(|(&id, _)| id)?;
                Some(RawEvent {
                    watch: id,
                    mask: Self::from_inotify_mask(mask),
                    name,
                })
            })
            .collect())
    }

    fn as_raw_fd(&self) -> RawFd {
        use std::os::fd::AsRawFd;
        self.inner.as_raw_fd()
    }
}

/// An in-memory fake used by tests to drive the Rescan Engine and Event
/// Dispatcher without a real kernel. Records watch installs/removals and
/// lets a test queue up synthetic event batches to be drained by
/// `read_events`.
#[derive(Default)]
pub struct FakeKernelWatch {
    pub next_id: i32,
    pub installed: Vec<(WatchId, std::path::PathBuf)>,
    pub removed: Vec<WatchId>,
    pub pending_events: std::collections::VecDeque<Vec<RawEvent>>,
    /// When set, the next `read_events` call fails instead of draining
    /// `pending_events`, for exercising the notification-handle-read-error
    /// path without a real kernel.
    pub fail_next_read: bool,
}

impl FakeKernelWatch {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Default::default()
        }
    }

    pub fn push_batch(&mut self, batch: Vec<RawEvent>) {
        self.pending_events.push_back(batch);
    }
}

impl KernelWatch for FakeKernelWatch {
    fn add_watch(&mut self, path: &Path, _mask: EventMask) -> std::io::Result<WatchId> {
        let id = WatchId(self.next_id);
        self.next_id += 1;
        self.installed.push((id, path.to_path_buf()));
        Ok(id)
    }

    fn rm_watch(&mut self, id: WatchId) -> std::io::Result<()> {
        self.removed.push(id);
        Ok(())
    }

    fn read_events(&mut self) -> std::io::Result<Vec<RawEvent>> {
        if self.fail_next_read {
            self.fail_next_read = false;
            return Err(std::io::Error::other("simulated notification handle read failure"));
        }
        Ok(self.pending_events.pop_front().unwrap_or_default())
    }

    fn as_raw_fd(&self) -> RawFd {
        -1
    }
}
