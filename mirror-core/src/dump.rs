//! Atomic publish of a batch of accumulated paths.
//!
//! Filename is `YYYYMMDD-HHMMSS.<pid>` under the configured output
//! directory. Content is written to a hidden `.{name}XXXXXX` temp file
//! created securely in the same directory, then renamed onto the final
//! name -- so readers of the output directory only ever see fully-formed
//! files. On rename failure the temp file is removed and the caller's
//! accumulator is left untouched, so the next dump attempt retries the
//! same batch.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::accumulator::Accumulator;
use crate::error::{Error, Result};

/// Shared write-via-tempfile-and-rename helper. Used by the dump writer
/// here and reused verbatim by the supervisor's status-file writer.
pub fn publish_atomically(dir: &Path, final_name: &str, contents: &str) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(&format!(".{final_name}"))
        .rand_bytes(6)
        .tempfile_in(dir)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.flush()?;

    match tmp.persist(dir.join(final_name)) {
        Ok(_file) => Ok(()),
        Err(e) => Err(e.error),
    }
}

pub struct DumpWriter {
    output_dir: PathBuf,
    pid: u32,
}

impl DumpWriter {
    pub fn new(output_dir: PathBuf) -> Self {
        Self {
            output_dir,
            pid: std::process::id(),
        }
    }

    #[cfg(test)]
    pub fn with_pid(output_dir: PathBuf, pid: u32) -> Self {
        Self { output_dir, pid }
    }

    fn filename(&self, now: std::time::SystemTime) -> String {
        let datetime = humantime_timestamp(now);
        format!("{datetime}.{}", self.pid)
    }

    /// Writes the accumulator's contents (one path plus `\n` per line) and
    /// clears it on success. Returns `Ok(false)` (accumulator untouched)
    /// when there is nothing to dump.
    pub fn dump(&self, accumulator: &mut Accumulator, now: std::time::SystemTime) -> Result<bool> {
        if accumulator.is_empty() {
            return Ok(false);
        }

        let mut contents = String::new();
        for line in accumulator.entries() {
            contents.push_str(line);
            contents.push('\n');
        }

        let name = self.filename(now);
        publish_atomically(&self.output_dir, &name, &contents).map_err(|source| Error::DumpWrite {
            dir: self.output_dir.clone(),
            source,
        })?;

        accumulator.clear();
        Ok(true)
    }
}

/// `YYYYMMDD-HHMMSS` in UTC; the status file and marker files use local
/// time instead, since those are read by humans.
fn humantime_timestamp(t: std::time::SystemTime) -> String {
    let datetime: chrono::DateTime<chrono::Utc> = t.into();
    datetime.format("%Y%m%d-%H%M%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn dump_writes_one_line_per_entry_and_clears_accumulator() {
        let dir = tempfile::tempdir().unwrap();
        let writer = DumpWriter::with_pid(dir.path().to_path_buf(), 4242);
        let mut acc = Accumulator::new();
        acc.mark_file("a.txt");
        acc.mark_dir("sub");

        let now = std::time::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let wrote = writer.dump(&mut acc, now).unwrap();
        assert!(wrote);
        assert!(acc.is_empty());

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].ends_with(".4242"));

        let content = std::fs::read_to_string(dir.path().join(&entries[0])).unwrap();
        assert_eq!(content, "a.txt\nsub/\n");
    }

    #[test]
    fn dump_is_noop_when_accumulator_empty() {
        let dir = tempfile::tempdir().unwrap();
        let writer = DumpWriter::new(dir.path().to_path_buf());
        let mut acc = Accumulator::new();
        assert!(!writer.dump(&mut acc, std::time::SystemTime::now()).unwrap());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
