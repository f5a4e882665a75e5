//! JSON bodies exchanged between replicas and the server.

use crate::expense::Expense;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body of `POST /api/expenses/sync`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushRequest {
    /// Records to upsert.
    pub expenses: Vec<Expense>,
}

/// Response to a push: the stored state of each submitted record, in
/// submission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushResponse {
    /// Echoed records.
    pub expenses: Vec<Expense>,
}

/// Response to `GET /api/expenses`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchResponse {
    /// Records changed after the requested watermark, tombstones included.
    pub expenses: Vec<Expense>,
    /// High-water change stamp covered by `expenses`. Pass it back as
    /// `since` on the next pull.
    pub server_time: DateTime<Utc>,
}

/// Response to `DELETE /api/expenses/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResponse {
    /// The tombstoned record.
    pub expense: Expense,
}

/// Body of every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable message.
    pub error: String,
}

impl ErrorBody {
    /// Creates an error body.
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn fetch_response_uses_camel_case() {
        let response = FetchResponse {
            expenses: Vec::new(),
            server_time: Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap(),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["serverTime"], "2024-05-10T12:00:00Z");
        assert!(json["expenses"].as_array().unwrap().is_empty());
    }

    #[test]
    fn error_body_shape() {
        let json = serde_json::to_string(&ErrorBody::new("not found")).unwrap();
        assert_eq!(json, r#"{"error":"not found"}"#);
    }
}
