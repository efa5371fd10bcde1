use chrono::NaiveDate;
use crumb_core::report::parse_date;

use crate::error::AppError;

/// Numeric path segment, e.g. a product id.
pub fn parse_id(raw: &str, what: &str) -> Result<i64, AppError> {
    raw.parse::<i64>()
        .map_err(|_| AppError::ValidationError(format!("invalid {}: {}", what, raw)))
}

/// Row offset of a 1-based page.
pub fn page_offset(page: i64, limit: i64) -> Result<i64, AppError> {
    (page - 1)
        .checked_mul(limit)
        .ok_or_else(|| AppError::ValidationError("page is out of range".to_string()))
}

pub fn optional_date(raw: Option<&str>) -> Result<Option<NaiveDate>, AppError> {
    raw.filter(|s| !s.is_empty())
        .map(|s| parse_date(s).map_err(AppError::from))
        .transpose()
}

pub fn required_date(raw: Option<&str>, name: &str) -> Result<NaiveDate, AppError> {
    optional_date(raw)?.ok_or_else(|| AppError::ValidationError(format!("{} is required", name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("42", "product id").unwrap(), 42);
        assert!(matches!(parse_id("abc", "product id"), Err(AppError::ValidationError(_))));
    }

    #[test]
    fn test_page_offset() {
        assert_eq!(page_offset(1, 20).unwrap(), 0);
        assert_eq!(page_offset(3, 20).unwrap(), 40);
        assert!(matches!(page_offset(i64::MAX, 2), Err(AppError::ValidationError(_))));
    }

    #[test]
    fn test_dates() {
        assert!(optional_date(None).unwrap().is_none());
        assert!(optional_date(Some("2024-02-29")).unwrap().is_some());
        assert!(required_date(None, "start").is_err());
    }
}
