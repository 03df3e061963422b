use crate::services::broadcaster::Broadcaster;
use crate::services::ordering::OrderingGate;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

/// Reclaims live channels and ordering locks that nobody uses anymore.
#[derive(Debug)]
pub struct ChannelGcWorker {
    broadcaster: Arc<Broadcaster>,
    gate: Arc<OrderingGate>,
    interval_secs: u64,
}

impl ChannelGcWorker {
    #[must_use]
    pub const fn new(broadcaster: Arc<Broadcaster>, gate: Arc<OrderingGate>, interval_secs: u64) -> Self {
        Self { broadcaster, gate, interval_secs }
    }

    pub async fn run(self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));

        while !*shutdown.borrow() {
            tokio::select! {
                _ = interval.tick() => {
                    async {
                        self.perform_gc();
                    }
                    .instrument(tracing::debug_span!("channel_gc_iteration"))
                    .await;
                }
                _ = shutdown.changed() => {}
            }
        }
        tracing::info!("Channel GC loop shutting down...");
    }

    pub fn perform_gc(&self) -> (u64, usize) {
        let channels = self.broadcaster.perform_gc();
        let locks = self.gate.reclaim();
        if channels > 0 || locks > 0 {
            tracing::debug!(channels, locks, "Reclaimed idle channels");
        }
        (channels, locks)
    }
}
