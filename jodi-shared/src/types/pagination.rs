use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult, ErrorCode};

/// Upper bound on `take`; larger requests are rejected, not clamped.
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageParams {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_take")]
    pub take: i64,
}

fn default_take() -> i64 {
    20
}

impl PageParams {
    pub fn new(skip: i64, take: i64) -> Self {
        Self { skip, take }
    }

    /// Validates the window. `take` beyond [`MAX_PAGE_SIZE`] is a caller
    /// error, never silently clamped.
    pub fn validate(&self) -> AppResult<()> {
        if self.skip < 0 || self.take < 1 {
            return Err(AppError::new(
                ErrorCode::ValidationError,
                "skip must be >= 0 and take >= 1",
            ));
        }
        if self.take > MAX_PAGE_SIZE {
            return Err(AppError::new(
                ErrorCode::PageSizeExceeded,
                format!("take must not exceed {MAX_PAGE_SIZE}"),
            ));
        }
        Ok(())
    }

    pub fn next(&self) -> Self {
        Self {
            skip: self.skip + self.take,
            take: self.take,
        }
    }
}

impl Default for PageParams {
    fn default() -> Self {
        Self { skip: 0, take: 20 }
    }
}

/// One page of results plus the total count across all pages.
#[derive(Debug, Serialize, Deserialize)]
pub struct Paged<T: Serialize> {
    pub total: i64,
    pub items: Vec<T>,
}

impl<T: Serialize> Paged<T> {
    pub fn new(items: Vec<T>, total: i64) -> Self {
        Self { total, items }
    }

    pub fn empty() -> Self {
        Self { total: 0, items: vec![] }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_take_beyond_limit() {
        assert!(PageParams::new(0, 101).validate().is_err());
        assert!(PageParams::new(0, 100).validate().is_ok());
    }

    #[test]
    fn rejects_non_positive_take_and_negative_skip() {
        assert!(PageParams::new(0, 0).validate().is_err());
        assert!(PageParams::new(-1, 20).validate().is_err());
    }

    #[test]
    fn next_advances_by_take() {
        let page = PageParams::new(50, 50).next();
        assert_eq!(page.skip, 100);
        assert_eq!(page.take, 50);
    }
}
