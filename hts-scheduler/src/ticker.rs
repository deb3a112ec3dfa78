//! Tick Source — a single-threaded 1-second pulse emitter.
//!
//! Delivery is best-effort: the one-slot channel drops a tick if the
//! previous one hasn't been consumed yet, rather than queuing or blocking
//! the emitter.

use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const TICK_INTERVAL: Duration = Duration::from_secs(1);

pub struct TickSource {
    tx: mpsc::Sender<()>,
    rx: Mutex<Option<mpsc::Receiver<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Default for TickSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TickSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
            handle: Mutex::new(None),
        }
    }

    /// Returns the single receive end. Panics if called more than once —
    /// the tick source has exactly one subscriber by design.
    pub async fn subscribe(&self) -> mpsc::Receiver<()> {
        self.rx
            .lock()
            .await
            .take()
            .expect("TickSource has only one subscriber")
    }

    /// Runs until `cancel` fires, emitting a tick once per second.
    pub async fn start(&self, cancel: CancellationToken) {
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK_INTERVAL);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        // Best-effort: drop the tick if the subscriber hasn't
                        // consumed the prior one.
                        let _ = tx.try_send(());
                    }
                }
            }
        });
        *self.handle.lock().await = Some(handle);
    }

    /// Idempotent termination.
    pub async fn stop(&self) {
        if let Some(handle) = self.handle.lock().await.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn drops_ticks_the_subscriber_does_not_consume() {
        let source = TickSource::new();
        let mut rx = source.subscribe().await;
        let cancel = CancellationToken::new();
        source.start(cancel.clone()).await;

        tokio::time::advance(Duration::from_secs(4)).await;
        cancel.cancel();
        source.stop().await;

        // At most one unconsumed tick can be sitting in the 1-slot channel,
        // regardless of how many seconds actually elapsed.
        let mut seen = 0;
        while rx.try_recv().is_ok() {
            seen += 1;
        }
        assert!(seen <= 1);
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let source = TickSource::new();
        let _rx = source.subscribe().await;
        source.stop().await;
        source.stop().await;
    }
}
