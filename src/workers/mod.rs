pub mod channel_gc;
pub mod notification_cleanup;

pub use channel_gc::ChannelGcWorker;
pub use notification_cleanup::NotificationCleanupWorker;
