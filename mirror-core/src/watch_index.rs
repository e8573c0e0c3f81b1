//! Reverse map from kernel watch identifier to directory node.
//!
//! Inserts dominate at bootstrap (one per directory discovered), lookups
//! dominate at steady state (one per kernel event). A hash map gives
//! amortized O(1) for both without any lazy-sort bookkeeping.

use std::collections::HashMap;

use crate::kernel::WatchId;
use crate::tree::DirHandle;

#[derive(Debug, Default)]
pub struct WatchIndex {
    entries: HashMap<WatchId, DirHandle>,
}

impl WatchIndex {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Invariant: at most one entry per watch id.
    pub fn insert(&mut self, id: WatchId, dir: DirHandle) {
        self.entries.insert(id, dir);
    }

    pub fn remove(&mut self, id: WatchId) -> Option<DirHandle> {
        self.entries.remove(&id)
    }

    pub fn lookup(&self, id: WatchId) -> Option<DirHandle> {
        self.entries.get(&id).copied()
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
    use crate::tree::ROOT;

    #[test]
    fn at_most_one_entry_per_watch_id() {
        let mut idx = WatchIndex::new();
        idx.insert(WatchId(1), ROOT);
        idx.insert(WatchId(1), DirHandle(7));
        assert_eq!(idx.len(), 1);
        assert_eq!(idx.lookup(WatchId(1)), Some(DirHandle(7)));
    }

    #[test]
    fn lookup_after_mutation_is_consistent() {
        let mut idx = WatchIndex::new();
        idx.insert(WatchId(3), DirHandle(1));
        idx.insert(WatchId(4), DirHandle(2));
        idx.remove(WatchId(3));
        assert_eq!(idx.lookup(WatchId(3)), None);
        assert_eq!(idx.lookup(WatchId(4)), Some(DirHandle(2)));
    }
}
