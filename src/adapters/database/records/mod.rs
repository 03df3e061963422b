pub mod conversation;
pub mod message;
pub mod notification;

pub use conversation::ConversationRecord;
pub use message::MessageRecord;
pub use notification::NotificationRecord;

use crate::error::AppError;
use std::str::FromStr;

/// Parses an enum column, treating unknown values as corrupt data.
pub(crate) fn parse_column<T: FromStr<Err = String>>(column: &'static str, value: &str) -> Result<T, AppError> {
    value.parse().map_err(|e| AppError::Internal(format!("invalid {column} column: {e}")))
}
