//! Shutdown signal plumbing.

use tokio::sync::watch;

/// A synchronization utility for sending / receiving shutdown signals.
///
/// - Multi-producer and multi-consumer: simply clone to get another handle.
/// - Consumers observe a shutdown signal that was sent before they started
///   waiting (unlike [`tokio::sync::broadcast`]).
/// - Sending more than once is fine.
#[derive(Clone, Debug)]
pub struct ShutdownChannel {
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
}

impl ShutdownChannel {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx, rx }
    }

    /// Send a shutdown signal, waking all actors waiting in [`recv`].
    ///
    /// [`recv`]: ShutdownChannel::recv
    pub fn send(&self) {
        // Ignore the no-receivers error; we hold a receiver ourselves.
        let _ = self.tx.send(true);
    }

    /// Wait for a shutdown signal. Returns immediately if one was already
    /// sent.
    pub async fn recv(&self) {
        let mut rx = self.rx.clone();
        // The sender half lives inside `self`, so `changed()` cannot error
        // out before a signal is observed.
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Immediately returns whether a shutdown signal has been sent.
    pub fn try_recv(&self) -> bool {
        *self.rx.borrow()
    }
}
