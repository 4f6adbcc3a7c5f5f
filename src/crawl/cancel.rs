//! Deadline and external-signal cancellation for a crawl session.

use std::future::pending;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// Cancellation sources for one session. Cloning shares the same sources.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    deadline: Option<Instant>,
    signal: Option<watch::Receiver<bool>>,
}

impl Cancellation {
    /// Never cancels.
    pub fn none() -> Self {
        Self::default()
    }

    /// Cancel once `after` has elapsed from now.
    pub fn with_deadline(mut self, after: Duration) -> Self {
        self.deadline = Some(Instant::now() + after);
        self
    }

    /// Cancel when `true` is sent on `signal`.
    pub fn with_signal(mut self, signal: watch::Receiver<bool>) -> Self {
        self.signal = Some(signal);
        self
    }

    /// A sender/cancellation pair; send `true` to cancel.
    pub fn channel() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self::none().with_signal(rx))
    }

    pub fn is_cancelled(&self) -> bool {
        let expired = self.deadline.is_some_and(|d| Instant::now() >= d);
        let signalled = self.signal.as_ref().is_some_and(|rx| *rx.borrow());
        expired || signalled
    }

    /// Resolves once cancelled. Pending forever with no sources.
    pub async fn cancelled(&self) {
        let deadline = async {
            match self.deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => pending::<()>().await,
            }
        };
        let signal = async {
            match self.signal.clone() {
                Some(mut rx) => {
                    let closed = rx.wait_for(|cancelled| *cancelled).await.is_err();
                    // A dropped sender can no longer cancel.
                    if closed {
                        pending::<()>().await;
                    }
                }
                None => pending::<()>().await,
            }
        };
        tokio::select! {
            _ = deadline => {}
            _ = signal => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_none_never_cancels() {
        let cancel = Cancellation::none();
        assert!(!cancel.is_cancelled());
        let waited = tokio::time::timeout(Duration::from_millis(20), cancel.cancelled()).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn test_deadline() {
        let cancel = Cancellation::none().with_deadline(Duration::from_millis(10));
        cancel.cancelled().await;
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_signal() {
        let (tx, cancel) = Cancellation::channel();
        assert!(!cancel.is_cancelled());
        let waiter = {
            let cancel = cancel.clone();
            tokio::spawn(async move { cancel.cancelled().await })
        };
        tx.send(true).unwrap();
        waiter.await.unwrap();
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_dropped_sender_does_not_cancel() {
        let (tx, cancel) = Cancellation::channel();
        drop(tx);
        let waited = tokio::time::timeout(Duration::from_millis(20), cancel.cancelled()).await;
        assert!(waited.is_err());
        assert!(!cancel.is_cancelled());
    }
}
