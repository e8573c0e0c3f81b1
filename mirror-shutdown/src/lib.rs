use nix::sys::signal::{
    self as nix_signal, SaFlags, SigAction, SigHandler as NixSigHandler, SigSet,
};
use nix::unistd;

// Re-export Signal for consumers who need to set it manually.
pub use nix::sys::signal::Signal;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Bridges `SIGINT`/`SIGTERM`/`SIGHUP` into a single [`CancellationToken`],
/// with a second signal forcing an immediate exit instead of waiting on
/// whatever is in the middle of shutting down.
pub struct Shutdown {
    token: CancellationToken,
    last_signal: AtomicI32,
}

impl std::fmt::Debug for Shutdown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shutdown")
            .field("token", &self.token)
            .field("last_signal", &self.last_signal)
            .finish()
    }
}

impl Shutdown {
    /// Create a new Shutdown instance wrapped in Arc
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            token: CancellationToken::new(),
            last_signal: AtomicI32::new(0),
        })
    }

    /// Install signal handlers for graceful shutdown
    pub async fn install_signals(self: &Arc<Self>) {
        let shutdown = Arc::clone(self);

        tokio::spawn(async move {
            let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
                .expect("Failed to install SIGINT handler");
            let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM handler");
            let mut sighup = signal::unix::signal(signal::unix::SignalKind::hangup())
                .expect("Failed to install SIGHUP handler");

            loop {
                let last_signal;

                tokio::select! {
                    _ = sigint.recv() => {
                        last_signal = Signal::SIGINT;
                    }
                    _ = sigterm.recv() => {
                        last_signal = Signal::SIGTERM;
                    }
                    _ = sighup.recv() => {
                        last_signal = Signal::SIGHUP;
                    }
                }

                // If a signal was already received, this is a repeated
                // interrupt -- force-exit immediately.
                if shutdown.last_signal.load(Ordering::Relaxed) != 0 {
                    info!("Received second signal, forcing exit...");
                    shutdown.exit_process();
                }

                info!("Received {:?}, shutting down gracefully...", last_signal);

                // Store the last signal received
                shutdown
                    .last_signal
                    .store(last_signal as i32, Ordering::Relaxed);

                // Trigger shutdown
                shutdown.token.cancel();
            }
        });
    }

    /// Wait for shutdown to be requested
    pub async fn wait_for_shutdown(&self) {
        self.token.cancelled().await;
    }

    /// Check if shutdown has been triggered
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    fn last_signal(&self) -> Option<Signal> {
        match self.last_signal.load(Ordering::Relaxed) {
            0 => None,
            i => Signal::try_from(i).ok(),
        }
    }

    /// Restore the default handler for the last received signal and re-raise the signal
    /// to terminate with the correct exit code.
    fn exit_process(&self) -> ! {
        let signal = self.last_signal().unwrap_or(Signal::SIGTERM);
        let action = SigAction::new(NixSigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
        unsafe {
            nix_signal::sigaction(signal, &action)
                .expect("Failed to restore default signal handler");
            nix_signal::kill(unistd::getpid(), signal).expect("Failed to re-raise signal");
        }

        // Unreachable: something went wrong
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn wait_for_shutdown_returns_once_cancelled() {
        let shutdown = Shutdown::new();

        tokio::spawn({
            let shutdown = Arc::clone(&shutdown);
            async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                shutdown.token.cancel();
            }
        });

        shutdown.wait_for_shutdown().await;
        assert!(shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn not_cancelled_until_a_signal_arrives() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.is_cancelled());
    }
}
