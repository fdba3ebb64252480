//! Waiting between connection attempts
//!
//! The pipeline never sleeps directly: it goes through a [`Sleeper`] so tests
//! can skip wall-clock time, and every wait races a [`CancellationToken`].

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::watch;

/// Source of delays
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real delays on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Cloneable cancellation signal. Once cancelled it stays cancelled.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    sender: std::sync::Arc<watch::Sender<bool>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: std::sync::Arc::new(sender),
        }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolves once [`CancellationToken::cancel`] has been called on any clone
    pub async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        // wait_for checks the current value first, so an earlier cancel is seen
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Sleep for `duration` unless cancelled first. Returns false if cancelled.
pub async fn wait_or_cancel(sleeper: &dyn Sleeper, duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = sleeper.sleep(duration) => true,
    }
}
