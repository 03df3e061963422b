pub mod access_guard;
pub mod broadcaster;
pub mod clock;
pub mod conversation_service;
pub mod gateway;
pub mod health_service;
pub mod message_service;
pub mod notification_service;
pub mod ordering;
pub mod retry;

use crate::adapters::store::Store;
use broadcaster::Broadcaster;
use clock::Clock;
use ordering::OrderingGate;
use retry::StoreRetry;
use std::sync::Arc;

/// Collaborators shared by every service that writes conversation state.
#[derive(Clone, Debug)]
pub struct ChatCore {
    pub store: Arc<dyn Store>,
    pub broadcaster: Arc<Broadcaster>,
    pub gate: Arc<OrderingGate>,
    pub retry: StoreRetry,
    pub clock: Arc<dyn Clock>,
}
