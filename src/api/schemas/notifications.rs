use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize)]
pub struct ListNotificationsQuery {
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnreadCountResponse {
    pub count: u64,
}

/// Result of a bulk mutation.
#[derive(Debug, Serialize, Deserialize)]
pub struct AffectedResponse {
    pub affected: u64,
}
