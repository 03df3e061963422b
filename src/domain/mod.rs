pub mod conversation;
pub mod event;
pub mod message;
pub mod notification;
pub mod page;
pub mod party;
pub mod text;
