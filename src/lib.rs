#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

pub mod adapters;
pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod telemetry;
pub mod workers;

use crate::adapters::database::{DbPool, PgStore};
use crate::adapters::memory::MemoryStore;
use crate::adapters::redis::RedisClient;
use crate::adapters::store::Store;
use crate::api::ServiceContainer;
use crate::config::Config;
use crate::services::ChatCore;
use crate::services::broadcaster::Broadcaster;
use crate::services::clock::{Clock, SystemClock};
use crate::services::conversation_service::ConversationService;
use crate::services::gateway::GatewayService;
use crate::services::health_service::HealthService;
use crate::services::message_service::MessageService;
use crate::services::notification_service::NotificationService;
use crate::services::ordering::OrderingGate;
use crate::services::retry::StoreRetry;
use crate::workers::{ChannelGcWorker, NotificationCleanupWorker};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;

pub use crate::adapters::database::run_migrations;

/// Wires the store, the live fan-out and every service into a runnable application.
#[derive(Debug)]
pub struct AppBuilder {
    config: Config,
    store: Option<Arc<dyn Store>>,
    pubsub: Option<Arc<RedisClient>>,
    clock: Option<Arc<dyn Clock>>,
    shutdown_rx: Option<watch::Receiver<bool>>,
}

impl AppBuilder {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config, store: None, pubsub: None, clock: None, shutdown_rx: None }
    }

    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn with_database(self, pool: DbPool) -> Self {
        self.with_store(Arc::new(PgStore::new(pool)))
    }

    /// Relays live events through Redis. Without it fan-out stays on this node.
    #[must_use]
    pub fn with_pubsub(mut self, pubsub: Option<Arc<RedisClient>>) -> Self {
        self.pubsub = pubsub;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    #[must_use]
    pub fn with_shutdown_rx(mut self, shutdown_rx: watch::Receiver<bool>) -> Self {
        self.shutdown_rx = Some(shutdown_rx);
        self
    }

    /// Builds the application. Falls back to the in-memory store when none was given.
    ///
    /// # Errors
    /// Returns an error if no shutdown receiver was provided or the relay subscription fails.
    pub async fn build(self) -> anyhow::Result<App> {
        let shutdown_rx = self.shutdown_rx.ok_or_else(|| anyhow::anyhow!("shutdown_rx is required"))?;
        let config = self.config;

        let store = self.store.unwrap_or_else(|| {
            tracing::warn!("No database configured, state is kept in memory only");
            Arc::new(MemoryStore::new())
        });
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let capacity = config.notifications.channel_capacity;
        let broadcaster = match &self.pubsub {
            Some(pubsub) => Broadcaster::with_relay(Arc::clone(pubsub), capacity, shutdown_rx.clone()).await?,
            None => Broadcaster::local(capacity),
        };

        let core = ChatCore {
            store: Arc::clone(&store),
            broadcaster: Arc::new(broadcaster),
            gate: Arc::new(OrderingGate::new()),
            retry: StoreRetry::new(&config.store_retry),
            clock: Arc::clone(&clock),
        };

        let notification_service =
            NotificationService::new(Arc::clone(&store), Arc::clone(&core.broadcaster), Arc::clone(&clock));
        let message_service = MessageService::new(
            core.clone(),
            notification_service.clone(),
            config.messaging.clone(),
            config.conversations.status_policy,
        );
        let conversation_service = ConversationService::new(
            core.clone(),
            message_service.clone(),
            notification_service.clone(),
            config.conversations.clone(),
            config.messaging.max_page_size,
        );
        let gateway_service = GatewayService::new(
            conversation_service.clone(),
            message_service.clone(),
            Arc::clone(&core.broadcaster),
            Arc::clone(&clock),
        );

        let health_service = HealthService::new(
            Arc::clone(&store),
            self.pubsub,
            Duration::from_millis(config.server.health_timeout_ms),
        );

        let workers = Workers {
            notification_cleanup: NotificationCleanupWorker::new(
                notification_service.clone(),
                Arc::clone(&clock),
                config.notifications.clone(),
            ),
            channel_gc: ChannelGcWorker::new(
                Arc::clone(&core.broadcaster),
                Arc::clone(&core.gate),
                config.notifications.gc_interval_secs,
            ),
        };

        Ok(App {
            services: ServiceContainer { conversation_service, message_service, notification_service, gateway_service },
            health_service,
            workers,
        })
    }
}

#[derive(Debug)]
pub struct App {
    pub services: ServiceContainer,
    pub health_service: HealthService,
    pub workers: Workers,
}

/// Background loops started once the listeners are bound.
#[derive(Debug)]
pub struct Workers {
    pub notification_cleanup: NotificationCleanupWorker,
    pub channel_gc: ChannelGcWorker,
}

impl Workers {
    #[must_use]
    pub fn spawn_all(self, shutdown_rx: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(
                self.notification_cleanup
                    .run(shutdown_rx.clone())
                    .instrument(tracing::info_span!("notification_cleanup_worker")),
            ),
            tokio::spawn(self.channel_gc.run(shutdown_rx).instrument(tracing::info_span!("channel_gc_worker"))),
        ]
    }
}

/// Routes panics through tracing before the default hook runs.
pub fn setup_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| info.payload().downcast_ref::<String>().map(String::as_str))
            .unwrap_or("<unknown payload>");
        let location = info.location().map(ToString::to_string).unwrap_or_default();
        tracing::error!(panic = %payload, location = %location, "Thread panicked");
        default_hook(info);
    }));
}

/// Flips the shutdown flag on SIGINT or SIGTERM.
pub fn spawn_signal_handler(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
            () = terminate => tracing::info!("Received SIGTERM, shutting down"),
        }

        let _ = shutdown_tx.send(true);
    });
}
