//! Export-ready notification channel
//!
//! A single binary "ready" flag shared between the webhook listener (producer)
//! and the batch orchestrator (consumer). Built on `tokio::sync::watch`, so
//! waiting never polls and repeated signals before a wait collapse into one.

use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;

#[derive(Debug)]
pub struct NotificationChannel {
    ready: watch::Sender<bool>,
}

impl Default for NotificationChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationChannel {
    pub fn new() -> Self {
        let (ready, _) = watch::channel(false);
        Self { ready }
    }

    /// Mark the export as ready. Idempotent.
    pub fn signal(&self) {
        let was_ready = self.ready.send_replace(true);
        debug!(was_ready, "Export-ready signal received");
    }

    /// Clear the ready flag. Only the consumer calls this.
    pub fn reset(&self) {
        self.ready.send_replace(false);
    }

    pub fn is_signaled(&self) -> bool {
        *self.ready.borrow()
    }

    /// Wait until signaled or until `timeout` elapses (`None` waits forever).
    ///
    /// Returns whether the signal was observed. The flag is left as-is;
    /// the caller resets it after a successful wait.
    pub async fn wait(&self, timeout: Option<Duration>) -> bool {
        let mut rx = self.ready.subscribe();
        // The sender lives in `self`, so `wait_for` can only fail if the
        // channel is dropped mid-wait, which the borrow rules out.
        let ready = async move { rx.wait_for(|ready| *ready).await.is_ok() };

        match timeout {
            Some(limit) => tokio::time::timeout(limit, ready).await.unwrap_or(false),
            None => ready.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_wait_returns_immediately_when_already_signaled() {
        let channel = NotificationChannel::new();
        channel.signal();
        assert!(channel.wait(Some(Duration::from_millis(10))).await);
    }

    #[tokio::test]
    async fn test_wait_times_out_without_signal() {
        let channel = NotificationChannel::new();
        assert!(!channel.wait(Some(Duration::from_millis(20))).await);
        assert!(!channel.is_signaled());
    }

    #[tokio::test]
    async fn test_signal_from_another_task_wakes_waiter() {
        let channel = Arc::new(NotificationChannel::new());
        let producer = channel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.signal();
        });

        assert!(channel.wait(Some(Duration::from_secs(5))).await);
    }

    #[tokio::test]
    async fn test_multiple_signals_collapse_and_reset_clears() {
        let channel = NotificationChannel::new();
        channel.signal();
        channel.signal();
        assert!(channel.wait(None).await);

        channel.reset();
        assert!(!channel.is_signaled());
        assert!(!channel.wait(Some(Duration::from_millis(20))).await);
    }
}
