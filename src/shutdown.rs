//! # Shutdown Coordination
//!
//! Cooperative shutdown shared between the signal handlers and the link
//! state machine, plus a hard deadline for when cooperation fails.
//!
//! A [`ShutdownTrigger`] flips a `tokio::sync::watch` flag once; every
//! [`ShutdownToken`] observes it. Backoff waits race against
//! [`ShutdownToken::requested`] so they end immediately.

use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::watch;
use tracing::error;

/// Create a connected trigger/token pair
pub fn channel() -> (ShutdownTrigger, ShutdownToken) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx: Arc::new(tx) }, ShutdownToken { rx })
}

/// Requests shutdown. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownTrigger {
    /// Request shutdown. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// A new token observing this trigger
    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            rx: self.tx.subscribe(),
        }
    }
}

/// Observes a shutdown request
#[derive(Debug, Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    pub fn is_requested(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown is requested
    ///
    /// Never resolves if every trigger is dropped without firing.
    pub async fn requested(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Sleep for `duration` unless shutdown comes first
    ///
    /// # Returns
    ///
    /// `true` if the full duration elapsed, `false` if shutdown cut it short
    pub async fn sleep_or_shutdown(&self, duration: Duration) -> bool {
        if self.is_requested() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.requested() => false,
        }
    }
}

/// Start the hard-deadline timer
///
/// Runs on a plain OS thread so it fires even if the async runtime is
/// stuck. If the process is still alive after `grace`, it exits with
/// status 1.
///
/// # Errors
///
/// Returns an error if the thread cannot be spawned
pub fn spawn_hard_deadline(grace: Duration) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("shutdown-deadline".to_string())
        .spawn(move || {
            thread::sleep(grace);
            error!("Shutdown did not finish within {:?}, forcing exit", grace);
            std::process::exit(1);
        })
}
