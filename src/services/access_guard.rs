//! Participant checks. Identity arrives pre-authenticated; this only decides whether
//! a given party may act on a given conversation.

use crate::domain::conversation::Conversation;
use crate::domain::party::{Party, PartyKind};
use crate::error::{AppError, Result};

/// Whether `caller` is one of the conversation's parties. An assigned agent acts for
/// the server side.
#[must_use]
pub fn is_participant(conversation: &Conversation, caller: &Party) -> bool {
    match caller.kind {
        PartyKind::Requester => conversation.requester_id == caller.id,
        PartyKind::Server => conversation.server_id == caller.id || conversation.agent_id == Some(caller.id),
    }
}

/// # Errors
/// Returns `AppError::AccessDenied` if `caller` is not a participant.
pub fn authorize(conversation: &Conversation, caller: &Party) -> Result<()> {
    if is_participant(conversation, caller) { Ok(()) } else { Err(AppError::AccessDenied) }
}
