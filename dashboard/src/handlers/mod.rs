//! Request handlers

mod chart;
mod index;
mod ip_info;

pub use chart::{chart_data_handler, results_handler};
pub use index::index_handler;
pub use ip_info::ip_info_handler;
pub use run_test::run_test_handler;

use crate::error::ApiError;

/// Parse an optional `limit` query value; zero and garbage are rejected
pub(crate) fn parse_limit(raw: Option<&str>) -> Result<Option<usize>, ApiError> {
    let Some(raw) = raw else {
        return Ok(None);
    };

    match raw.trim().parse::<usize>() {
        Ok(0) => Err(ApiError::BadRequest("limit must be at least 1".to_string())),
        Ok(limit) => Ok(Some(limit)),
        Err(_) => Err(ApiError::BadRequest(format!("invalid limit: {}", raw))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_limit() {
        assert_eq!(parse_limit(None).unwrap(), None);
        assert_eq!(parse_limit(Some("25")).unwrap(), Some(25));
        assert_eq!(parse_limit(Some(" 7 ")).unwrap(), Some(7));
        assert!(parse_limit(Some("0")).is_err());
        assert!(parse_limit(Some("-3")).is_err());
        assert!(parse_limit(Some("ten")).is_err());
    }
}
