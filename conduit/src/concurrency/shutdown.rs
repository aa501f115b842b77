//! Broadcast cancellation shared by every pipeline stage.
//!
//! This module abstracts a tokio watch channel into a single-shot "stop" signal. Once triggered,
//! the signal stays triggered for good, and every receiver observes it, including receivers that
//! subscribe after the fact. Dropping every [`ShutdownTx`] is observed as a trigger too, so a
//! driver that goes out of scope cannot leave stages running.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

/// Outcome of an operation raced against the shutdown signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownResult<T, I> {
    /// The operation completed before shutdown was observed.
    Ok(T),
    /// Shutdown was observed first.
    Shutdown(I),
}

impl<T, I> ShutdownResult<T, I> {
    /// Returns `true` when shutdown was observed.
    pub fn should_shutdown(&self) -> bool {
        matches!(self, ShutdownResult::Shutdown(_))
    }
}

/// Transmitter side of the shutdown signal.
///
/// [`ShutdownTx`] is cheap to clone. Triggering through any clone is visible to all receivers.
#[derive(Debug, Clone)]
pub struct ShutdownTx(Arc<watch::Sender<bool>>);

impl ShutdownTx {
    /// Triggers the shutdown signal.
    ///
    /// Triggering is idempotent and may happen concurrently from many tasks.
    pub fn shutdown(&self) {
        // `send_replace` succeeds even when no receiver is subscribed yet.
        self.0.send_replace(true);
    }

    /// Returns `true` once the signal has been triggered.
    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }

    /// Creates a new receiver subscription.
    pub fn subscribe(&self) -> ShutdownRx {
        ShutdownRx(self.0.subscribe())
    }

    /// Returns a guard which triggers the signal when dropped.
    pub fn drop_guard(&self) -> ShutdownGuard {
        ShutdownGuard(self.clone())
    }
}

/// Receiver side of the shutdown signal.
#[derive(Debug, Clone)]
pub struct ShutdownRx(watch::Receiver<bool>);

impl ShutdownRx {
    /// Returns `true` if the signal was triggered or every transmitter was dropped.
    ///
    /// This never blocks.
    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow() || self.0.has_changed().is_err()
    }

    /// Waits until the signal is triggered or every transmitter is dropped.
    ///
    /// Resolves immediately when the signal already fired. The future is cancel safe and is meant
    /// to be used as a `tokio::select!` branch.
    pub async fn wait(&mut self) {
        // An error means every sender was dropped, which counts as shutdown.
        let _ = self.0.wait_for(|triggered| *triggered).await;
    }

    /// Races `future` against the shutdown signal.
    ///
    /// The signal branch is polled first, so when both are ready shutdown wins.
    pub async fn race<F>(&mut self, future: F) -> ShutdownResult<F::Output, ()>
    where
        F: Future,
    {
        tokio::select! {
            biased;

            _ = self.wait() => ShutdownResult::Shutdown(()),

            output = future => ShutdownResult::Ok(output),
        }
    }
}

/// Triggers the shutdown signal when dropped.
///
/// Keep a guard alive for the whole driver scope to guarantee that the signal fires on every exit
/// path, including early returns and panics.
#[derive(Debug)]
#[must_use = "the signal fires as soon as the guard is dropped"]
pub struct ShutdownGuard(ShutdownTx);

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        self.0.shutdown();
    }
}

/// Creates a new shutdown channel in the non-triggered state.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTx(Arc::new(tx)), ShutdownRx(rx))
}
