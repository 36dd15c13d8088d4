//! Cooperative cancellation for long-running tasks.

use tokio::sync::watch;

/// Read side of a cancellation flag.
///
/// Wraps a `watch::Receiver<bool>` the same way every processor receives its
/// shutdown signal. Dropping the sender also counts as cancellation, so an
/// owner that goes away takes its tasks with it.
#[derive(Debug, Clone)]
pub struct CancellationSignal {
    rx: watch::Receiver<bool>,
}

impl CancellationSignal {
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    /// Create a fresh flag, returning the sender that trips it.
    pub fn channel() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self::new(rx))
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolve once the flag is set or its sender is dropped.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}
