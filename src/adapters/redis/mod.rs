use crate::config::PubSubConfig;
use backon::{ExponentialBuilder, Retryable};
use dashmap::DashMap;
use futures::StreamExt;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::Instrument;

#[derive(Debug, Clone)]
pub struct PubSubMessage {
    pub channel: String,
    pub payload: Vec<u8>,
}

/// Redis publisher plus shared pattern listeners used to relay live events between nodes.
#[derive(Debug)]
pub struct RedisClient {
    publisher: redis::aio::ConnectionManager,
    // Maps patterns (e.g. "chat:*") to broadcast senders
    subscriptions: Arc<DashMap<String, broadcast::Sender<PubSubMessage>>>,
    client: redis::Client,
    shutdown: watch::Receiver<bool>,
    config: PubSubConfig,
}

impl RedisClient {
    /// Connects to the configured Redis server.
    ///
    /// # Errors
    /// Returns an error if no URL is configured or the connection fails.
    pub async fn new(config: &PubSubConfig, shutdown: watch::Receiver<bool>) -> anyhow::Result<Arc<Self>> {
        let url = config.url.as_deref().ok_or_else(|| anyhow::anyhow!("pubsub url is not set"))?;
        let client = redis::Client::open(url)?;
        let publisher = client.get_connection_manager().await?;

        Ok(Arc::new(Self {
            publisher,
            subscriptions: Arc::new(DashMap::new()),
            client,
            shutdown,
            config: config.clone(),
        }))
    }

    /// Publishes a payload on a channel.
    ///
    /// # Errors
    /// Returns an error if the publish command fails.
    pub async fn publish(&self, channel: &str, payload: Vec<u8>) -> anyhow::Result<()> {
        let mut conn = self.publisher.clone();
        let _: i64 = conn.publish(channel, payload).await?;
        Ok(())
    }

    /// Subscribes to a Redis pattern.
    /// If a background listener for this pattern isn't already running, it will be started.
    ///
    /// # Errors
    /// Returns an error if the subscription fails.
    pub async fn subscribe(&self, pattern: &str) -> anyhow::Result<broadcast::Receiver<PubSubMessage>> {
        if let Some(tx) = self.subscriptions.get(pattern) {
            return Ok(tx.subscribe());
        }

        let (tx, rx) = broadcast::channel(self.config.channel_capacity);
        self.subscriptions.insert(pattern.to_string(), tx.clone());

        let pattern_str = pattern.to_string();
        let client = self.client.clone();
        let shutdown = self.shutdown.clone();
        let subscriptions = Arc::clone(&self.subscriptions);
        let config = self.config.clone();

        let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();

        tokio::spawn(
            async move {
                Self::run_pattern_listener(client, pattern_str, tx, shutdown, subscriptions, config, ready_tx).await;
            }
            .instrument(tracing::debug_span!("pubsub_listener", pattern = %pattern)),
        );

        if ready_rx.await.is_err() {
            anyhow::bail!("pubsub listener for {pattern} stopped before subscribing");
        }

        Ok(rx)
    }

    async fn run_pattern_listener(
        client: redis::Client,
        pattern: String,
        tx: broadcast::Sender<PubSubMessage>,
        mut shutdown: watch::Receiver<bool>,
        subscriptions: Arc<DashMap<String, broadcast::Sender<PubSubMessage>>>,
        config: PubSubConfig,
        ready_tx: tokio::sync::oneshot::Sender<()>,
    ) {
        let retry_strategy = ExponentialBuilder::default()
            .with_min_delay(Duration::from_secs(config.min_backoff_secs))
            .with_max_delay(Duration::from_secs(config.max_backoff_secs));

        let mut ready_tx = Some(ready_tx);

        loop {
            let pubsub_result = (|| async {
                let mut pubsub = client.get_async_pubsub().await?;
                pubsub.psubscribe(&pattern).await?;
                Ok::<redis::aio::PubSub, redis::RedisError>(pubsub)
            })
            .retry(&retry_strategy)
            .notify(|e, duration| {
                tracing::warn!(error = %e, retry_in = ?duration, "Failed to subscribe to pubsub, retrying");
            })
            .await;

            let pubsub = match pubsub_result {
                Ok(ps) => ps,
                Err(e) => {
                    tracing::error!(error = %e, "Pubsub subscription failed after retries");
                    break;
                }
            };

            tracing::info!(pattern = %pattern, "Subscribed to pubsub");
            if let Some(rtx) = ready_tx.take() {
                let _ = rtx.send(());
            }

            let mut message_stream = pubsub.into_on_message();

            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        subscriptions.remove(&pattern);
                        return;
                    }
                    msg = message_stream.next() => {
                        let Some(msg) = msg else {
                            tracing::warn!(pattern = %pattern, "Pubsub connection lost, reconnecting");
                            break;
                        };
                        let message = PubSubMessage {
                            channel: msg.get_channel_name().to_string(),
                            payload: msg.get_payload().unwrap_or_default(),
                        };
                        // No receivers just means no local dispatcher right now.
                        let _ = tx.send(message);
                    }
                }
            }

            if *shutdown.borrow() {
                break;
            }
        }

        subscriptions.remove(&pattern);
    }

    /// Pings the Redis server to check connectivity.
    ///
    /// # Errors
    /// Returns an error if the ping fails or exceeds the configured timeout.
    pub async fn ping(&self) -> anyhow::Result<()> {
        let mut conn = self.publisher.clone();
        tokio::time::timeout(
            Duration::from_millis(self.config.timeout_ms),
            redis::cmd("PING").query_async::<String>(&mut conn),
        )
        .await??;
        Ok(())
    }
}
