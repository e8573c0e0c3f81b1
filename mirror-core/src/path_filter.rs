//! Leaf-name exclusion rules.
//!
//! The filter only ever sees a leaf name, never a full path or file type --
//! it must stay that way so it can be applied identically during a rescan
//! (before `lstat`) and inside the event dispatcher (before touching the
//! tree).

/// Tests leaf names against an exclusion rule set.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    patterns: Vec<glob::Pattern>,
}

impl PathFilter {
    /// Build a filter from caller-supplied shell-style glob patterns.
    ///
    /// An empty `patterns` list switches to the default rule: reject any
    /// leaf ending in `~` or `.tmp`.
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .filter_map(|p| glob::Pattern::new(p.as_ref()).ok())
            .collect();
        Self { patterns }
    }

    /// Returns `true` if `leaf` should be excluded from the tree entirely.
    pub fn is_excluded(&self, leaf: &str) -> bool {
        if leaf.is_empty() || leaf == "." || leaf == ".." {
            return true;
        }

        if self.patterns.is_empty() {
            return leaf.ends_with('~') || leaf.ends_with(".tmp");
        }

        self.patterns.iter().any(|pat| pat.matches(leaf))
    }
}
