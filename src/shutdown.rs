//! Graceful shutdown handling.
//!
//! SIGINT and SIGTERM trigger the controller; the main loop then waits for
//! the in-flight tool call to release the connection and closes it.

use crate::constants::DEFAULT_DRAIN_TIMEOUT;
use crate::database::Database;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Shutdown signal that can be awaited.
#[derive(Clone)]
pub struct ShutdownSignal {
    receiver: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Wait for the shutdown signal.
    pub async fn recv(&mut self) {
        let _ = self.receiver.wait_for(|&v| v).await;
    }

    /// Check if shutdown has been signaled without blocking.
    pub fn is_shutdown(&self) -> bool {
        *self.receiver.borrow()
    }
}

/// Shutdown phases, logged as they are entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    /// Shutdown has been initiated.
    Initiated,

    /// Waiting for the in-flight call to finish.
    DrainingRequests,

    /// Closing the database connection.
    ClosingConnection,

    /// Final cleanup complete.
    Complete,
}

impl std::fmt::Display for ShutdownPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownPhase::Initiated => write!(f, "initiated"),
            ShutdownPhase::DrainingRequests => write!(f, "draining_requests"),
            ShutdownPhase::ClosingConnection => write!(f, "closing_connection"),
            ShutdownPhase::Complete => write!(f, "complete"),
        }
    }
}

/// Controller for managing graceful shutdown.
pub struct ShutdownController {
    sender: watch::Sender<bool>,
    shutting_down: AtomicBool,
    drain_timeout: Duration,
}

impl ShutdownController {
    /// Create a new shutdown controller with the default drain timeout.
    pub fn new() -> Self {
        Self::with_drain_timeout(DEFAULT_DRAIN_TIMEOUT)
    }

    /// Create a shutdown controller with a custom drain timeout.
    pub fn with_drain_timeout(drain_timeout: Duration) -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender,
            shutting_down: AtomicBool::new(false),
            drain_timeout,
        }
    }

    /// Get a shutdown signal receiver.
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            receiver: self.sender.subscribe(),
        }
    }

    /// Check if shutdown is in progress.
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Time allowed for the in-flight call to finish.
    pub fn drain_timeout(&self) -> Duration {
        self.drain_timeout
    }

    /// Initiate shutdown. Idempotent.
    pub fn shutdown(&self) {
        if self
            .shutting_down
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            info!(phase = %ShutdownPhase::Initiated, "Shutdown phase");
            let _ = self.sender.send(true);
        }
    }

    /// Shut down and close the connection once it is free.
    ///
    /// If the in-flight call does not finish within the drain timeout the
    /// connection is abandoned and dropped with the process.
    pub async fn graceful_shutdown(&self, db: &Database) {
        self.shutdown();

        info!(phase = %ShutdownPhase::DrainingRequests, "Shutdown phase");
        info!(phase = %ShutdownPhase::ClosingConnection, "Shutdown phase");
        if tokio::time::timeout(self.drain_timeout, db.close())
            .await
            .is_err()
        {
            warn!(
                timeout_secs = self.drain_timeout.as_secs(),
                "In-flight request did not finish, abandoning connection"
            );
        }

        info!(phase = %ShutdownPhase::Complete, "Shutdown phase");
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared shutdown controller type.
pub type SharedShutdownController = Arc<ShutdownController>;

/// Create a new shared shutdown controller.
pub fn new_shutdown_controller() -> SharedShutdownController {
    Arc::new(ShutdownController::new())
}

/// Install SIGINT and SIGTERM handlers that trigger the controller.
pub async fn install_signal_handlers(controller: SharedShutdownController) {
    let ctrl_c_controller = controller.clone();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, initiating shutdown...");
                ctrl_c_controller.shutdown();
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for Ctrl+C signal");
            }
        }
    });

    #[cfg(unix)]
    {
        tokio::spawn(async move {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                    info!("Received SIGTERM, initiating shutdown...");
                    controller.shutdown();
                }
                Err(e) => {
                    error!(error = %e, "Failed to install SIGTERM handler");
                }
            }
        });
    }

    #[cfg(not(unix))]
    drop(controller);
}
