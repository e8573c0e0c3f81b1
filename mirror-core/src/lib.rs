//! Change-detection engine for a continuously mirrored directory tree.
//!
//! This crate owns everything below the process boundary: the exclusion
//! rules, the in-memory tree, the watch index, the deferred-work queue,
//! the changed-paths accumulator, the kernel-notification abstraction,
//! and the rescan/dispatch algorithms that tie them together through
//! [`Engine`]. It does not know about processes, locking, or the sync
//! pipeline downstream of it -- those live in the other workspace crates.

pub mod accumulator;
pub mod change_queue;
pub mod dispatch;
pub mod dump;
pub mod engine;
pub mod error;
pub mod kernel;
pub mod path_filter;
pub mod rescan;
pub mod tree;
pub mod watch_index;

pub use accumulator::Accumulator;
pub use change_queue::{ChangeQueue, Target, FILE_COALESCE_WINDOW};
pub use dump::{publish_atomically, DumpWriter};
pub use engine::{CheckOutcome, Engine};
pub use error::{Error, Result};
pub use kernel::{EventMask, FakeKernelWatch, InotifyWatch, KernelWatch, RawEvent, WatchId, DIRECTORY_WATCH_MASK};
pub use path_filter::PathFilter;
pub use tree::{DirHandle, FileHandle, Tree, ROOT};
pub use watch_index::WatchIndex;
