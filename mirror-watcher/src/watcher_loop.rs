//! The scheduler itself: one readiness wait, three deadlines, one exit flag.

use std::os::fd::{AsRawFd, BorrowedFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use mirror_core::{DumpWriter, Engine, InotifyWatch, PathFilter};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

use crate::config::WatcherConfig;

/// Wait up to 100ms for readability before giving the dispatcher a chance
/// to run; this is what keeps the loop from busy-spinning.
const READINESS_WAIT: Duration = Duration::from_millis(100);
/// Sleep interval used instead of the readiness wait when notifications
/// are disabled and the loop has nothing to wait on.
const POLL_ONLY_SLEEP: Duration = Duration::from_secs(1);

pub struct WatcherLoop {
    engine: Engine<InotifyWatch>,
    dump_writer: DumpWriter,
    next_full_scan: Instant,
    next_change_queue_run: Instant,
    next_changedpath_dump: Instant,
    full_scan_interval: Duration,
    queue_run_max: Duration,
    dump_interval: Duration,
    exit: Arc<AtomicBool>,
}

impl WatcherLoop {
    pub fn new(config: WatcherConfig) -> anyhow::Result<Self> {
        let filter = PathFilter::new(&config.exclude);
        let kernel = if config.notifications_enabled {
            Some(InotifyWatch::new()?)
        } else {
            None
        };
        let mut engine = Engine::new(config.root.clone(), filter, config.max_depth, kernel)?;
        engine.queue_root_rescan();

        let now = Instant::now();
        Ok(Self {
            engine,
            dump_writer: DumpWriter::new(config.output_dir),
            next_full_scan: now,
            next_change_queue_run: now + config.queue_run_max,
            next_changedpath_dump: now + config.dump_interval,
            full_scan_interval: config.full_scan_interval,
            queue_run_max: config.queue_run_max,
            dump_interval: config.dump_interval,
            exit: install_signal_flag()?,
        })
    }

    /// Runs until the exit flag is set (by `SIGTERM`/`SIGINT`) or, if
    /// `max_iterations` is given, until that many iterations have run --
    /// used by tests and by `--once`-style callers that don't want a
    /// genuine daemon loop.
    pub fn run(&mut self, max_iterations: Option<u64>) -> anyhow::Result<()> {
        let mut iterations = 0u64;
        loop {
            self.tick()?;

            if self.exit.load(Ordering::Relaxed) {
                tracing::info!("exit flag set, shutting down");
                break;
            }
            iterations += 1;
            if let Some(max) = max_iterations {
                if iterations >= max {
                    break;
                }
            }
        }
        Ok(())
    }

    fn tick(&mut self) -> anyhow::Result<()> {
        // Step 1: wait for readability, or sleep, then dispatch one batch.
        let readable = self.wait_for_readiness()?;
        if readable {
            match self.engine.read_and_dispatch() {
                Ok(_) => {}
                Err(mirror_core::Error::EventRead { source }) => {
                    tracing::warn!(error = %source, "notification handle read failed, degrading to polling");
                    self.engine.kernel = None;
                }
                Err(e) => return Err(e.into()),
            }
        }

        let now = Instant::now();

        // Step 2: periodic full scan.
        if now >= self.next_full_scan {
            self.engine.queue_root_rescan();
            self.next_full_scan = now + self.full_scan_interval;
        }

        // Step 3: drain the change queue, capped by deadline.
        if now >= self.next_change_queue_run {
            self.engine.drain_change_queue(Instant::now() + self.queue_run_max);
            self.next_change_queue_run = Instant::now() + self.queue_run_max;
        }

        // Step 4: periodic dump.
        if now >= self.next_changedpath_dump {
            let wrote = self.dump_writer.dump(&mut self.engine.accumulator, std::time::SystemTime::now())?;
            if wrote {
                tracing::debug!("wrote changed-paths dump");
            }
            self.next_changedpath_dump = now + self.dump_interval;
        }

        Ok(())
    }

    /// Waits up to `READINESS_WAIT` for the kernel notification handle to
    /// become readable. When notifications are disabled, sleeps
    /// `POLL_ONLY_SLEEP` instead and reports "not readable" so the caller
    /// skips dispatch (there is nothing to read).
    fn wait_for_readiness(&self) -> anyhow::Result<bool> {
        let Some(kernel) = self.engine.kernel.as_ref() else {
            std::thread::sleep(POLL_ONLY_SLEEP);
            return Ok(false);
        };

        let raw_fd = kernel.as_raw_fd();
        let borrowed = unsafe { BorrowedFd::borrow_raw(raw_fd) };
        let mut fds = [PollFd::new(borrowed, PollFlags::POLLIN)];
        let timeout = PollTimeout::try_from(READINESS_WAIT.as_millis() as u16).unwrap_or(PollTimeout::MAX);

        match poll(&mut fds, timeout) {
            Ok(n) if n > 0 => Ok(fds[0]
                .revents()
                .is_some_and(|events| events.contains(PollFlags::POLLIN))),
            Ok(_) => Ok(false),
            Err(nix::errno::Errno::EINTR) => Ok(false),
            Err(e) => anyhow::bail!("poll on notification handle failed: {e}"),
        }
    }
}

fn install_signal_flag() -> anyhow::Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&flag))?;
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&flag))?;
    Ok(flag)
}

pub fn run(config: WatcherConfig) -> anyhow::Result<()> {
    WatcherLoop::new(config)?.run(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watcher_loop_dumps_an_initial_scan() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("a.txt"), "hello").unwrap();
        let out = tempfile::tempdir().unwrap();

        let mut config = WatcherConfig::new(root.path().to_path_buf(), out.path().to_path_buf());
        config.notifications_enabled = false;
        config.full_scan_interval = Duration::from_secs(3600);
        config.queue_run_max = Duration::from_millis(0);
        config.dump_interval = Duration::from_millis(0);

        let mut watcher = WatcherLoop::new(config).unwrap();
        watcher.run(Some(2)).unwrap();

        let dumped: Vec<_> = std::fs::read_dir(out.path()).unwrap().collect();
        assert!(!dumped.is_empty());
    }
}
