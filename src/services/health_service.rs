use crate::adapters::redis::RedisClient;
use crate::adapters::store::Store;
use opentelemetry::{KeyValue, global, metrics::Gauge};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

#[derive(Clone, Debug)]
pub struct Metrics {
    pub status: Gauge<i64>,
}

impl Metrics {
    #[must_use]
    pub(crate) fn new() -> Self {
        let meter = global::meter("threadline-server");
        Self {
            status: meter
                .i64_gauge("threadline_health_status")
                .with_description("Status of health checks (1 for ok, 0 for error)")
                .build(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug)]
pub struct HealthService {
    store: Arc<dyn Store>,
    pubsub: Option<Arc<RedisClient>>,
    store_timeout: Duration,
    metrics: Metrics,
}

impl HealthService {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, pubsub: Option<Arc<RedisClient>>, store_timeout: Duration) -> Self {
        Self { store, pubsub, store_timeout, metrics: Metrics::new() }
    }

    /// Checks store connectivity.
    ///
    /// # Errors
    /// Returns a string describing the failure if the store is unreachable.
    pub async fn check_store(&self) -> Result<(), String> {
        match timeout(self.store_timeout, self.store.ping()).await {
            Ok(Ok(())) => {
                self.metrics.status.record(1, &[KeyValue::new("component", "store")]);
                Ok(())
            }
            Ok(Err(e)) => {
                self.metrics.status.record(0, &[KeyValue::new("component", "store")]);
                Err(format!("Store connection failed: {e}"))
            }
            Err(_) => {
                self.metrics.status.record(0, &[KeyValue::new("component", "store")]);
                Err("Store connection timed out".to_string())
            }
        }
    }

    /// Checks `PubSub` connectivity. Always healthy when running without a relay.
    ///
    /// # Errors
    /// Returns a string describing the failure if `PubSub` is unreachable.
    pub async fn check_pubsub(&self) -> Result<(), String> {
        let Some(pubsub) = &self.pubsub else {
            return Ok(());
        };
        match pubsub.ping().await {
            Ok(()) => {
                self.metrics.status.record(1, &[KeyValue::new("component", "pubsub")]);
                Ok(())
            }
            Err(e) => {
                self.metrics.status.record(0, &[KeyValue::new("component", "pubsub")]);
                Err(format!("PubSub connection failed: {e:?}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryStore;

    #[tokio::test]
    async fn memory_store_without_relay_is_ready() {
        let health = HealthService::new(Arc::new(MemoryStore::new()), None, Duration::from_millis(100));
        assert!(health.check_store().await.is_ok());
        assert!(health.check_pubsub().await.is_ok());
    }
}
