//! Graceful shutdown of the object server.
//!
//! Health state transitions are lock-free through `ArcSwap`; the reactor
//! listens on a `watch` channel for the shutdown trigger.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::watch;

/// Server health state.
///
/// State machine: Starting -> Ready -> Draining -> Stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    /// Objects are being declared; the reactor is not running yet.
    Starting,
    /// The reactor is serving calls.
    Ready,
    /// New calls are refused; suspended calls are still driven.
    Draining,
    /// The reactor has exited.
    Stopped,
}

/// Shared handle that moves the server through its health states.
///
/// 1. The reactor calls `set_ready()` when it starts.
/// 2. Anyone holding the controller may call `trigger_shutdown()`.
/// 3. The reactor drains suspended calls, then calls `set_stopped()`.
#[derive(Debug)]
pub struct ShutdownController {
    shutdown_signal: watch::Sender<bool>,
    health_state: Arc<ArcSwap<HealthState>>,
}

impl ShutdownController {
    /// Creates a controller in the `Starting` state.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            shutdown_signal: tx,
            health_state: Arc::new(ArcSwap::from_pointee(HealthState::Starting)),
        }
    }

    pub fn set_ready(&self) {
        self.health_state.store(Arc::new(HealthState::Ready));
    }

    /// Receiver notified when shutdown is triggered.
    #[must_use]
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_signal.subscribe()
    }

    /// Moves to `Draining` and wakes the reactor. Has no effect once the
    /// server has stopped.
    pub fn trigger_shutdown(&self) {
        if self.health_state() == HealthState::Stopped {
            return;
        }
        self.health_state.store(Arc::new(HealthState::Draining));
        // Stored even with no receiver yet, so a later subscriber sees it.
        self.shutdown_signal.send_replace(true);
    }

    pub fn set_stopped(&self) {
        self.health_state.store(Arc::new(HealthState::Stopped));
    }

    #[must_use]
    pub fn health_state(&self) -> HealthState {
        **self.health_state.load()
    }

    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.health_state() == HealthState::Draining
    }

    /// Waits until the reactor reports `Stopped`, up to `timeout`.
    /// Returns `false` on timeout.
    pub async fn wait_for_stop(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if self.health_state() == HealthState::Stopped {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}
