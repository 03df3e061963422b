use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Zero-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
}

impl PageRequest {
    #[must_use]
    pub fn new(page: u32, size: u32) -> Self {
        Self { page, size: size.max(1) }
    }

    /// Clamps the page size to `max_size`.
    #[must_use]
    pub fn clamped(self, max_size: u32) -> Self {
        Self::new(self.page, self.size.min(max_size.max(1)))
    }

    #[must_use]
    pub fn offset(&self) -> usize {
        self.page as usize * self.size as usize
    }

    #[must_use]
    pub fn limit(&self) -> usize {
        self.size as usize
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(0, DEFAULT_PAGE_SIZE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub size: u32,
    pub total: u64,
}

impl<T> Page<T> {
    #[must_use]
    pub const fn new(items: Vec<T>, request: PageRequest, total: u64) -> Self {
        Self { items, page: request.page, size: request.size, total }
    }

    /// Slices an already ordered collection.
    #[must_use]
    pub fn from_sorted(all: Vec<T>, request: PageRequest) -> Self {
        let total = all.len() as u64;
        let items = all.into_iter().skip(request.offset()).take(request.limit()).collect();
        Self::new(items, request, total)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page { items: self.items.into_iter().map(f).collect(), page: self.page, size: self.size, total: self.total }
    }

    #[must_use]
    pub fn has_next(&self) -> bool {
        (u64::from(self.page) + 1) * u64::from(self.size) < self.total
    }
}
