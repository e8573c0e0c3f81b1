//! Zero-length marker files whose mtime records the last successful
//! sync of their kind. Read at startup to seed the next-due deadlines;
//! written via create-then-utime on success.

use std::path::Path;
use std::time::SystemTime;

/// Returns the marker's mtime, or `None` if it doesn't exist yet.
pub fn read(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).ok()?.modified().ok()
}

/// Creates the marker if absent, then sets its mtime to `when`.
pub fn touch(path: &Path, when: SystemTime) -> std::io::Result<()> {
    let file = std::fs::File::options().create(true).write(true).open(path)?;
    file.set_modified(when)
}
