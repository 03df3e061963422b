pub mod conversations;
pub mod gateway;
pub mod health;
pub mod messages;
pub mod notifications;

use crate::domain::page::{DEFAULT_PAGE_SIZE, PageRequest};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub size: Option<u32>,
}

impl PageQuery {
    #[must_use]
    pub fn to_request(&self) -> PageRequest {
        PageRequest::new(self.page.unwrap_or(0), self.size.unwrap_or(DEFAULT_PAGE_SIZE))
    }
}
