//! # Signals
//!
//! Two-stage shutdown: the first SIGINT/SIGTERM cancels the returned token so
//! the controller drains and stops; a second one exits the process with
//! status 1 immediately.

use std::io;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

struct Signals {
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
}

impl Signals {
    #[cfg(unix)]
    fn new() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            terminate: signal(SignalKind::terminate())?,
            interrupt: signal(SignalKind::interrupt())?,
        })
    }

    #[cfg(not(unix))]
    fn new() -> io::Result<Self> {
        Ok(Self {})
    }

    /// Wait for the next shutdown signal; `None` if signals can no longer be received
    #[cfg(unix)]
    async fn recv(&mut self) -> Option<&'static str> {
        tokio::select! {
            received = self.terminate.recv() => received.map(|()| "SIGTERM"),
            received = self.interrupt.recv() => received.map(|()| "SIGINT"),
        }
    }

    #[cfg(not(unix))]
    async fn recv(&mut self) -> Option<&'static str> {
        match tokio::signal::ctrl_c().await {
            Ok(()) => Some("ctrl-c"),
            Err(e) => {
                error!(error = %e, "failed to listen for ctrl-c");
                None
            }
        }
    }
}

/// Install the signal handlers and return the token they cancel
///
/// Must be called from within a tokio runtime. Each call installs an
/// independent handler with its own token.
///
/// # Errors
///
/// Fails when the OS signal handlers cannot be registered.
pub fn shutdown_on_signal() -> io::Result<CancellationToken> {
    let signals = Signals::new()?;
    let token = CancellationToken::new();
    tokio::spawn(handle_signals(signals, token.clone()));
    Ok(token)
}

async fn handle_signals(mut signals: Signals, token: CancellationToken) {
    let Some(first) = signals.recv().await else {
        error!("signal stream closed, graceful shutdown by signal unavailable");
        return;
    };
    info!(signal = first, "shutdown signal received, stopping gracefully (repeat to force exit)");
    token.cancel();

    if let Some(second) = signals.recv().await {
        warn!(signal = second, "second shutdown signal received, exiting immediately");
        std::process::exit(1);
    }
}
