//! Scenario 6: a supervisor configured with `partial_interval=5`,
//! `full_interval=0`, and an empty destination launches exactly one
//! partial transfer, with `--files-from` pointing at the collated
//! changed-files list, once the (stubbed) watcher child's first dump has
//! been collated.
//!
//! The watcher child and the transfer tool are both replaced with small
//! shell scripts here -- spawning the real `mirror-watcherd` binary would
//! tie this test to the cargo build layout, and the real transfer tool
//! doesn't exist in this repo at all.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::time::Duration;

use mirror_supervisor::SyncSetConfig;
use mirror_supervisor::Supervisor;

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// A stand-in for `mirror-watcherd`: ignores its arguments beyond
/// `--output-dir`, drops one changed-paths dump into it, then sleeps --
/// long enough to still be "up" (and reapable) for the rest of the test.
fn stub_watcher(dir: &Path) -> PathBuf {
    write_script(
        dir,
        "fake-watcherd.sh",
        r#"out=""
while [ "$#" -gt 0 ]; do
  case "$1" in
    --output-dir) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
mkdir -p "$out"
printf 'a.txt\n' > "$out/dump.0"
sleep 3600
"#,
    )
}

/// A stand-in transfer tool that just records its own invocation
/// (including whatever `--exclude-from`/`--files-from` flags the
/// supervisor appended) to `recorder`.
fn stub_transfer(dir: &Path, recorder: &Path) -> PathBuf {
    write_script(
        dir,
        "fake-rsync.sh",
        &format!("echo \"$*\" >> {}", shell_escape::escape(recorder.to_string_lossy())),
    )
}

#[tokio::test(flavor = "multi_thread")]
async fn partial_sync_launches_once_after_first_collation() {
    let root = tempfile::tempdir().unwrap();
    let source = root.path().join("src");
    std::fs::create_dir_all(&source).unwrap();
    std::fs::write(source.join("a.txt"), "hello").unwrap();
    let working_dir = root.path().join("work");
    let recorder = root.path().join("invocations");

    let mut config = SyncSetConfig::new(source, String::new(), working_dir);
    config.full_interval = Duration::ZERO;
    config.partial_interval = Duration::from_secs(5);
    config.partial_sync_cmd = stub_transfer(root.path(), &recorder).to_string_lossy().into_owned();
    config.watcher_binary = stub_watcher(root.path());

    let mut supervisor = Supervisor::new("scenario6".to_string(), config).unwrap();
    let exit = supervisor.exit_flag();

    let handle = tokio::spawn(async move { supervisor.run().await });

    // Long enough to clear one `partial_interval` retry window even if the
    // watcher's dump isn't collated on the very first attempt.
    tokio::time::sleep(Duration::from_secs(7)).await;
    exit.store(true, Ordering::Relaxed);
    handle.await.unwrap().unwrap();

    let invocations = std::fs::read_to_string(&recorder).unwrap_or_default();
    let with_files_from = invocations.lines().filter(|l| l.contains("--files-from")).count();
    assert_eq!(with_files_from, 1, "invocations were: {invocations:?}");
    assert!(invocations.contains("--exclude-from"));
}
