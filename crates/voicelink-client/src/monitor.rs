//! Periodic status sampling behind a watch channel.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// A source of point-in-time status readings (network reachability,
/// media channel quality, and the like).
#[async_trait]
pub trait StatusProbe: Send + Sync + 'static {
    /// One reading.
    type Snapshot: Clone + Send + Sync + 'static;

    /// Take a reading. Implementations should be quick; the feed awaits
    /// each sample before scheduling the next.
    async fn sample(&self) -> Self::Snapshot;
}

/// Samples a probe on a fixed period and fans readings out to watchers.
///
/// `None` on the channel means no sample has landed yet.
pub struct StatusFeed<P: StatusProbe> {
    probe: Arc<P>,
    period: Duration,
    updates: watch::Sender<Option<P::Snapshot>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<P: StatusProbe> StatusFeed<P> {
    /// Create a stopped feed over the probe.
    pub fn new(probe: Arc<P>, period: Duration) -> Self {
        let (updates, _) = watch::channel(None);
        Self { probe, period, updates, task: Mutex::new(None) }
    }

    /// Subscribe to readings. Starts with `None` until the first sample.
    pub fn subscribe(&self) -> watch::Receiver<Option<P::Snapshot>> {
        self.updates.subscribe()
    }

    /// Start sampling. Idempotent: a running feed is left alone.
    pub fn start(&self) {
        let mut task = self.lock_task();
        if task.is_some() {
            return;
        }
        let probe = Arc::clone(&self.probe);
        let updates = self.updates.clone();
        let period = self.period;
        *task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let snapshot = probe.sample().await;
                updates.send_replace(Some(snapshot));
            }
        }));
    }

    /// Stop sampling. Idempotent.
    pub fn stop(&self) {
        if let Some(handle) = self.lock_task().take() {
            handle.abort();
        }
    }

    fn lock_task(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        match self.task.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<P: StatusProbe> Drop for StatusFeed<P> {
    fn drop(&mut self) {
        self.stop();
    }
}
