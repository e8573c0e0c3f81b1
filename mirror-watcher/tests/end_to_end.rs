//! End-to-end scenarios driving a real `WatcherLoop` (real inotify, real
//! `tempfile::tempdir()` trees) and asserting on the dump-writer output
//! directory, instead of poking the engine's internals directly.

use std::path::Path;
use std::time::{Duration, Instant};

use mirror_watcher::{WatcherConfig, WatcherLoop};

const STEP: Duration = Duration::from_millis(50);
const DUMP_INTERVAL: Duration = Duration::from_millis(600);
// Must clear the file-coalesce window (mirror_core::FILE_COALESCE_WINDOW,
// 2s) plus a dump interval so a queued file check has had a chance to run.
const SETTLE: Duration = Duration::from_millis(2_700);

fn config(root: &Path, out: &Path) -> WatcherConfig {
    let mut cfg = WatcherConfig::new(root.to_path_buf(), out.to_path_buf());
    cfg.full_scan_interval = Duration::from_secs(3600);
    cfg.queue_run_max = STEP;
    cfg.dump_interval = DUMP_INTERVAL;
    cfg
}

/// Ticks `watcher` until `total` has elapsed (each tick waits at most
/// ~100ms for notification readiness, so this advances roughly wall-clock
/// time rather than a fixed iteration count).
fn run_until(watcher: &mut WatcherLoop, total: Duration) {
    let deadline = Instant::now() + total;
    while Instant::now() < deadline {
        watcher.run(Some(1)).unwrap();
    }
}

/// Reads every dump file currently in `dir`, removes them, and returns
/// their contents concatenated -- so each call observes exactly what was
/// published since the last call.
fn drain_dumps(dir: &Path) -> String {
    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .collect();
    entries.sort();

    let mut out = String::new();
    for path in entries {
        out.push_str(&std::fs::read_to_string(&path).unwrap());
        std::fs::remove_file(&path).unwrap();
    }
    out
}

/// Scenario 1: a new empty file is dumped as a single line within one
/// dump interval.
#[test]
fn new_file_appears_in_next_dump() {
    let root = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let mut watcher = WatcherLoop::new(config(root.path(), out.path())).unwrap();

    // First tick drains the initial root scan queued at construction.
    run_until(&mut watcher, DUMP_INTERVAL);
    drain_dumps(out.path());

    std::fs::write(root.path().join("a.txt"), "").unwrap();
    run_until(&mut watcher, SETTLE);

    let dumped = drain_dumps(out.path());
    assert!(dumped.lines().any(|l| l == "a.txt"), "dump was: {dumped:?}");
}

/// Scenario 2: two writes within the coalescing window settle into a
/// single subsequent "changed" emission.
#[test]
fn rapid_writes_coalesce_into_one_dump_entry() {
    let root = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let path = root.path().join("a.txt");
    std::fs::write(&path, "initial").unwrap();

    let mut watcher = WatcherLoop::new(config(root.path(), out.path())).unwrap();
    run_until(&mut watcher, DUMP_INTERVAL);
    drain_dumps(out.path());

    std::fs::write(&path, "hi").unwrap();
    run_until(&mut watcher, Duration::from_millis(500));
    std::fs::write(&path, "bye").unwrap();
    run_until(&mut watcher, SETTLE);

    let dumped = drain_dumps(out.path());
    let hits = dumped.lines().filter(|l| *l == "a.txt").count();
    assert_eq!(hits, 1, "expected exactly one coalesced emission, dump was: {dumped:?}");

    // Quiet period afterwards: no further emission for the same file.
    run_until(&mut watcher, SETTLE);
    let dumped_again = drain_dumps(out.path());
    assert!(!dumped_again.lines().any(|l| l == "a.txt"));
}

/// Scenario 3: `mkdir sub; touch sub/b` -- the next dump contains both the
/// new directory and the file underneath it.
#[test]
fn new_directory_and_its_child_both_appear() {
    let root = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let mut watcher = WatcherLoop::new(config(root.path(), out.path())).unwrap();

    run_until(&mut watcher, DUMP_INTERVAL);
    drain_dumps(out.path());

    std::fs::create_dir(root.path().join("sub")).unwrap();
    std::fs::write(root.path().join("sub/b"), "x").unwrap();
    run_until(&mut watcher, SETTLE);

    let dumped = drain_dumps(out.path());
    assert!(dumped.lines().any(|l| l == "sub/"), "dump was: {dumped:?}");
    assert!(dumped.lines().any(|l| l == "sub/b"), "dump was: {dumped:?}");
}

/// Scenario 4: backup/temp files matching the default exclude patterns
/// never show up in any dump.
#[test]
fn excluded_files_are_never_dumped() {
    let root = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let mut watcher = WatcherLoop::new(config(root.path(), out.path())).unwrap();

    run_until(&mut watcher, DUMP_INTERVAL);
    drain_dumps(out.path());

    std::fs::write(root.path().join("c~"), "x").unwrap();
    std::fs::write(root.path().join("d.tmp"), "x").unwrap();
    run_until(&mut watcher, SETTLE);

    let dumped = drain_dumps(out.path());
    assert!(!dumped.contains("c~"), "dump was: {dumped:?}");
    assert!(!dumped.contains("d.tmp"), "dump was: {dumped:?}");
}

/// Scenario 5: removing a previously-tracked directory marks its parent
/// as changed but does not re-emit the removed directory itself.
#[test]
fn removed_directory_marks_parent_not_itself() {
    let root = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let sub = root.path().join("sub");
    std::fs::create_dir(&sub).unwrap();
    std::fs::write(sub.join("b"), "x").unwrap();

    let mut watcher = WatcherLoop::new(config(root.path(), out.path())).unwrap();
    // Let the initial scan pick up `sub` and drain that dump.
    run_until(&mut watcher, SETTLE);
    drain_dumps(out.path());

    std::fs::remove_dir_all(&sub).unwrap();
    run_until(&mut watcher, SETTLE);

    let dumped = drain_dumps(out.path());
    assert!(dumped.lines().any(|l| l == "/"), "dump was: {dumped:?}");
    assert!(!dumped.lines().any(|l| l == "sub/"), "dump was: {dumped:?}");
}
