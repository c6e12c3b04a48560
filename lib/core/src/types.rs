use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

/// Parameters for list/feed operations. A missing `limit` means the
/// service's configured page size.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    /// Maximum number of results to return.
    #[serde(default)]
    pub limit: Option<usize>,

    /// Offset for pagination.
    #[serde(default)]
    pub offset: usize,
}

/// Result wrapper for list operations.
#[derive(Debug, Clone, Serialize)]
pub struct ListResult<T: Serialize> {
    pub items: Vec<T>,
    pub total: usize,
}

/// Current UTC time as RFC 3339 with fixed microsecond precision.
///
/// The fixed fraction width makes lexicographic order on the stored
/// string identical to chronological order, so `ORDER BY timestamp`
/// on a TEXT column is correct.
pub fn now_utc() -> String {
    chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_utc_shape() {
        let ts = now_utc();
        assert!(ts.ends_with('Z'));
        // 2026-08-29T12:34:56.123456Z
        assert_eq!(ts.len(), "2026-08-29T12:34:56.123456Z".len());
    }

    #[test]
    fn test_now_utc_sorts() {
        let a = now_utc();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = now_utc();
        assert!(a < b);
    }
}
