use clap::{Args, Parser, ValueEnum};

#[derive(Clone, Debug, Default, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    #[command(flatten)]
    pub server: ServerConfig,

    #[command(flatten)]
    pub database: DatabaseConfig,

    #[command(flatten)]
    pub pubsub: PubSubConfig,

    #[command(flatten)]
    pub messaging: MessagingConfig,

    #[command(flatten)]
    pub conversations: ConversationConfig,

    #[command(flatten)]
    pub notifications: NotificationConfig,

    #[command(flatten)]
    pub store_retry: StoreRetryConfig,

    #[command(flatten)]
    pub telemetry: TelemetryConfig,
}

impl Config {
    #[must_use]
    pub fn load() -> Self {
        Self::parse()
    }
}

#[derive(Clone, Debug, Args)]
pub struct ServerConfig {
    /// Host to listen on
    #[arg(long, env = "THREADLINE_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "THREADLINE_PORT", default_value_t = 3000)]
    pub port: u16,

    /// Port for the management (health) server
    #[arg(long, env = "THREADLINE_MGMT_PORT", default_value_t = 9090)]
    pub mgmt_port: u16,

    /// Seconds to wait for background tasks on shutdown
    #[arg(long, env = "THREADLINE_SHUTDOWN_TIMEOUT_SECS", default_value_t = 5)]
    pub shutdown_timeout_secs: u64,

    /// Milliseconds a readiness probe may wait on the store
    #[arg(long, env = "THREADLINE_HEALTH_TIMEOUT_MS", default_value_t = 2000)]
    pub health_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 3000, mgmt_port: 9090, shutdown_timeout_secs: 5, health_timeout_ms: 2000 }
    }
}

#[derive(Clone, Debug, Args)]
pub struct DatabaseConfig {
    /// Database connection URL. When unset the in-memory store is used.
    #[arg(long = "database-url", env = "THREADLINE_DATABASE_URL")]
    pub url: Option<String>,

    #[arg(long, env = "THREADLINE_DB_MAX_CONNECTIONS", default_value_t = 20)]
    pub max_connections: u32,

    #[arg(long, env = "THREADLINE_DB_MIN_CONNECTIONS", default_value_t = 2)]
    pub min_connections: u32,

    #[arg(long, env = "THREADLINE_DB_ACQUIRE_TIMEOUT_SECS", default_value_t = 5)]
    pub acquire_timeout_secs: u64,

    #[arg(long, env = "THREADLINE_DB_IDLE_TIMEOUT_SECS", default_value_t = 600)]
    pub idle_timeout_secs: u64,

    #[arg(long, env = "THREADLINE_DB_MAX_LIFETIME_SECS", default_value_t = 1800)]
    pub max_lifetime_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 20,
            min_connections: 2,
            acquire_timeout_secs: 5,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
        }
    }
}

#[derive(Clone, Debug, Args)]
pub struct PubSubConfig {
    /// Redis URL used to relay live events between nodes. Local-only fan-out when unset.
    #[arg(long = "pubsub-url", env = "THREADLINE_PUBSUB_URL")]
    pub url: Option<String>,

    /// Minimum backoff when (re)subscribing
    #[arg(long = "pubsub-min-backoff-secs", env = "THREADLINE_PUBSUB_MIN_BACKOFF_SECS", default_value_t = 1)]
    pub min_backoff_secs: u64,

    /// Maximum backoff when (re)subscribing
    #[arg(long = "pubsub-max-backoff-secs", env = "THREADLINE_PUBSUB_MAX_BACKOFF_SECS", default_value_t = 30)]
    pub max_backoff_secs: u64,

    /// Buffer of the shared pattern listener channel
    #[arg(long = "pubsub-channel-capacity", env = "THREADLINE_PUBSUB_CHANNEL_CAPACITY", default_value_t = 1024)]
    pub channel_capacity: usize,

    /// Timeout for the readiness ping
    #[arg(long = "pubsub-timeout-ms", env = "THREADLINE_PUBSUB_TIMEOUT_MS", default_value_t = 2000)]
    pub timeout_ms: u64,
}

impl Default for PubSubConfig {
    fn default() -> Self {
        Self { url: None, min_backoff_secs: 1, max_backoff_secs: 30, channel_capacity: 1024, timeout_ms: 2000 }
    }
}

#[derive(Clone, Debug, Args)]
pub struct MessagingConfig {
    /// Seconds after sending during which the author may edit a message
    #[arg(long, env = "THREADLINE_EDIT_WINDOW_SECS", default_value_t = 900)]
    pub edit_window_secs: i64,

    /// Seconds after sending during which the author may delete a message for everyone
    #[arg(long, env = "THREADLINE_DELETE_WINDOW_SECS", default_value_t = 3600)]
    pub delete_window_secs: i64,

    /// Maximum message length in characters
    #[arg(long, env = "THREADLINE_MAX_CONTENT_CHARS", default_value_t = 5000)]
    pub max_content_chars: usize,

    /// Upper bound on any requested page size
    #[arg(long, env = "THREADLINE_MAX_PAGE_SIZE", default_value_t = 100)]
    pub max_page_size: u32,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self { edit_window_secs: 900, delete_window_secs: 3600, max_content_chars: 5000, max_page_size: 100 }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum StatusPolicy {
    /// Any participant may set any status.
    #[default]
    Open,
    /// ARCHIVED is terminal and only the server side may set RESOLVED.
    Strict,
}

#[derive(Clone, Debug, Default, Args)]
pub struct ConversationConfig {
    /// Conversation status transition policy
    #[arg(long, env = "THREADLINE_STATUS_POLICY", value_enum, default_value_t = StatusPolicy::Open)]
    pub status_policy: StatusPolicy,
}

#[derive(Clone, Debug, Args)]
pub struct NotificationConfig {
    /// Capacity of each live broadcast channel
    #[arg(long, env = "THREADLINE_CHANNEL_CAPACITY", default_value_t = 64)]
    pub channel_capacity: usize,

    /// How often to reclaim channels without subscribers
    #[arg(long, env = "THREADLINE_GC_INTERVAL_SECS", default_value_t = 60)]
    pub gc_interval_secs: u64,

    /// Days a read notification is kept before cleanup
    #[arg(long, env = "THREADLINE_READ_RETENTION_DAYS", default_value_t = 30)]
    pub read_retention_days: i64,

    /// How often to run the notification cleanup task
    #[arg(long, env = "THREADLINE_NOTIFICATION_CLEANUP_INTERVAL_SECS", default_value_t = 3600)]
    pub cleanup_interval_secs: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self { channel_capacity: 64, gc_interval_secs: 60, read_retention_days: 30, cleanup_interval_secs: 3600 }
    }
}

#[derive(Clone, Debug, Args)]
pub struct StoreRetryConfig {
    /// Retries for transient store failures on the write path
    #[arg(long, env = "THREADLINE_STORE_RETRY_ATTEMPTS", default_value_t = 3)]
    pub max_attempts: usize,

    #[arg(long, env = "THREADLINE_STORE_RETRY_MIN_DELAY_MS", default_value_t = 20)]
    pub min_delay_ms: u64,

    #[arg(long, env = "THREADLINE_STORE_RETRY_MAX_DELAY_MS", default_value_t = 500)]
    pub max_delay_ms: u64,
}

impl Default for StoreRetryConfig {
    fn default() -> Self {
        Self { max_attempts: 3, min_delay_ms: 20, max_delay_ms: 500 }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Debug, Default, Args)]
pub struct TelemetryConfig {
    /// OTLP collector endpoint; export is disabled when unset
    #[arg(long, env = "THREADLINE_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,

    #[arg(long, env = "THREADLINE_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}
