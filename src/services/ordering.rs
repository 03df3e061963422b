use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Per-conversation async lock held from the store write until its event is published,
/// so local subscribers observe events in commit order.
#[derive(Debug, Default)]
pub struct OrderingGate {
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl OrderingGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn enter(&self, conversation_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = Arc::clone(self.locks.entry(conversation_id).or_default().value());
        lock.lock_owned().await
    }

    /// Drops entries nobody holds or waits on. Returns how many were removed.
    pub fn reclaim(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before.saturating_sub(self.locks.len())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
