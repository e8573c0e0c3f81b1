//! The watcher child: spawned as a genuine subprocess running
//! `mirror-watcherd`, rather than a raw `fork()` of the supervisor
//! itself. A bare `fork()` inside a process already running a tokio
//! runtime is hazardous (the runtime's allocator and I/O driver state
//! may be mid-mutation on another thread); spawning a fresh process gets
//! the same process-separation guarantee the scheduling model asks for
//! without that hazard. The supervisor still owns the child's lifetime:
//! it tracks the pid, forwards `SIGTERM` on its own exit, and reaps
//! non-blockingly every tick.

use std::path::Path;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

use crate::config::SyncSetConfig;
use crate::error::{Error, Result};

pub struct WatcherChild {
    child: tokio::process::Child,
    pid: u32,
}

impl WatcherChild {
    pub fn spawn(config: &SyncSetConfig) -> std::io::Result<Self> {
        let change_queue_dir = config.change_queue_dir();
        let mut cmd = tokio::process::Command::new(&config.watcher_binary);
        cmd.arg(&config.source)
            .arg("--output-dir")
            .arg(&change_queue_dir)
            .arg("--max-depth")
            .arg(config.watcher_max_depth.to_string())
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null());

        for pattern in &config.excludes {
            cmd.arg("--exclude").arg(pattern);
        }

        let child = cmd.spawn()?;
        let pid = child.id().expect("freshly spawned child always has a pid");
        Ok(Self { child, pid })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Non-blocking reap. Returns `true` once the child has exited.
    pub fn try_reap(&mut self) -> std::io::Result<bool> {
        Ok(self.child.try_wait()?.is_some())
    }

    /// Sends `SIGTERM` and does not wait for exit -- matching the
    /// "forwards termination ... and does not wait for it" rule.
    pub fn terminate(&self) -> Result<()> {
        signal::kill(Pid::from_raw(self.pid as i32), Signal::SIGTERM).map_err(|source| Error::SignalChild {
            pid: self.pid as i32,
            source,
        })
    }
}

/// Resolves the watcher binary next to the current executable when the
/// configured path is a bare name (no directory component), so
/// `mirror-sync` finds its sibling `mirror-watcherd` without requiring
/// `PATH` to be set up for it specifically.
pub fn resolve_watcher_binary(configured: &Path) -> std::io::Result<std::path::PathBuf> {
    if configured.components().count() > 1 {
        return Ok(configured.to_path_buf());
    }
    let exe = std::env::current_exe()?;
    let dir = exe.parent().unwrap_or_else(|| Path::new("."));
    let candidate = dir.join(configured);
    if candidate.exists() {
        Ok(candidate)
    } else {
        Ok(configured.to_path_buf())
    }
}
