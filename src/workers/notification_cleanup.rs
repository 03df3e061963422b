use crate::config::NotificationConfig;
use crate::error::AppError;
use crate::services::clock::Clock;
use crate::services::notification_service::NotificationService;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

/// Deletes notifications that have been read for longer than the retention period.
#[derive(Debug)]
pub struct NotificationCleanupWorker {
    service: NotificationService,
    clock: Arc<dyn Clock>,
    config: NotificationConfig,
}

impl NotificationCleanupWorker {
    #[must_use]
    pub fn new(service: NotificationService, clock: Arc<dyn Clock>, config: NotificationConfig) -> Self {
        Self { service, clock, config }
    }

    pub async fn run(self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.config.cleanup_interval_secs));

        while !*shutdown.borrow() {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.perform_cleanup()
                        .instrument(tracing::info_span!("notification_cleanup_iteration"))
                        .await
                    {
                        tracing::error!(error = ?e, "Notification cleanup iteration failed");
                    }
                }
                _ = shutdown.changed() => {}
            }
        }
        tracing::info!("Notification cleanup loop shutting down...");
    }

    /// # Errors
    /// Returns an error if the store fails.
    #[tracing::instrument(skip(self), err, fields(deleted = tracing::field::Empty))]
    pub async fn perform_cleanup(&self) -> Result<u64, AppError> {
        let cutoff = self.clock.now() - time::Duration::days(self.config.read_retention_days);
        let count = self.service.purge_read_before(cutoff).await?;
        if count > 0 {
            tracing::info!(count = %count, "Deleted old read notifications");
            tracing::Span::current().record("deleted", count);
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::party::Party;
    use crate::services::testing::Harness;

    #[tokio::test]
    async fn only_notifications_read_before_the_retention_cutoff_are_deleted() {
        let h = Harness::new();
        let requester = Party::requester(1);
        let old = h.notifications.notify_order_update(requester, None, "Order update", "Delivered").await.expect("old");
        h.notifications.mark_read(old.id, requester).await.expect("read");
        h.clock.advance(time::Duration::days(20));
        let recent = h.notifications.notify_order_update(requester, None, "Order update", "Rated").await.expect("new");
        h.notifications.mark_read(recent.id, requester).await.expect("read");
        h.clock.advance(time::Duration::days(15));

        let worker = NotificationCleanupWorker::new(
            h.notifications.clone(),
            Arc::clone(&h.clock) as Arc<dyn Clock>,
            NotificationConfig::default(),
        );
        assert_eq!(worker.perform_cleanup().await.expect("cleanup"), 1);
        assert!(matches!(
            h.notifications.get(old.id, requester).await,
            Err(AppError::NotFound("Notification"))
        ));
        h.notifications.get(recent.id, requester).await.expect("kept");
    }
}
