use serde::Serialize;
use thiserror::Error;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Zero-based page request validated against [`MAX_PAGE_SIZE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    size: u32,
}

impl PageRequest {
    /// Builds a request from optional query parameters.
    pub fn new(page: Option<u32>, size: Option<u32>) -> Result<Self, PageError> {
        let size = size.unwrap_or(DEFAULT_PAGE_SIZE);
        if size == 0 || size > MAX_PAGE_SIZE {
            return Err(PageError::InvalidSize(size));
        }
        Ok(Self {
            page: page.unwrap_or(0),
            size,
        })
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Row offset for `LIMIT ? OFFSET ?` queries.
    pub fn offset(&self) -> i64 {
        i64::from(self.page) * i64::from(self.size)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 0,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PageError {
    #[error("page size must be between 1 and {MAX_PAGE_SIZE} (got {0})")]
    InvalidSize(u32),
}

/// One page of results together with the totals of the full filtered set.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageableDto<T> {
    pub page: Vec<T>,
    pub total_elements: i64,
    pub current_page: u32,
    pub total_pages: u32,
}

impl<T> PageableDto<T> {
    pub fn new(page: Vec<T>, total_elements: i64, request: PageRequest) -> Self {
        let total = total_elements.max(0) as u64;
        let size = u64::from(request.size());
        let total_pages = total.div_ceil(size) as u32;
        Self {
            page,
            total_elements,
            current_page: request.page(),
            total_pages,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PageableDto<U> {
        PageableDto {
            page: self.page.into_iter().map(f).collect(),
            total_elements: self.total_elements,
            current_page: self.current_page,
            total_pages: self.total_pages,
        }
    }
}
