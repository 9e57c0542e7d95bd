//! Error types for OpenSearch operations.

use serde_json::Value;
use thiserror::Error;

/// Status code the cluster uses to reject work under load.
pub const REJECTED_STATUS: u16 = 429;

/// Failure reported by the transport before any per-item response exists.
///
/// Carries the HTTP status when the cluster answered, `None` when the
/// request never got a response (connection refused, timeout, ...).
#[derive(Debug, Clone, PartialEq, Error)]
#[error("TransportError({}, '{}')", status_label(.status), .error)]
pub struct TransportError {
    /// HTTP status code, if the cluster answered.
    pub status: Option<u16>,
    /// Short error label (`error.type` from the response or a description).
    pub error: String,
    /// Full response body, when there was one.
    pub info: Option<Value>,
}

impl TransportError {
    /// Create a transport error for an HTTP status.
    pub fn new(status: u16, error: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            error: error.into(),
            info: None,
        }
    }

    /// Create a transport error for a request that got no response.
    pub fn connection(error: impl Into<String>) -> Self {
        Self {
            status: None,
            error: error.into(),
            info: None,
        }
    }

    /// Attach the response body.
    pub fn with_info(mut self, info: Value) -> Self {
        self.info = Some(info);
        self
    }

    /// Whether the cluster rejected the request under load.
    pub fn is_rejection(&self) -> bool {
        self.status == Some(REJECTED_STATUS)
    }

    /// Status as a JSON value; `"N/A"` when there is no HTTP status.
    pub fn status_value(&self) -> Value {
        match self.status {
            Some(status) => Value::from(status),
            None => Value::from("N/A"),
        }
    }
}

fn status_label(status: &Option<u16>) -> String {
    status.map_or_else(|| "N/A".to_string(), |status| status.to_string())
}

/// One or more documents in a bulk batch failed.
///
/// Raised only after every item of the batch has a final outcome, retries
/// included. `errors` holds the failure records in input order, each shaped
/// `{"<op_type>": {"_index", "_id", "status", "error", "data"?}}`.
#[derive(Debug, Clone, Error)]
#[error("{} document(s) failed to index.", .errors.len())]
pub struct BulkIndexError {
    /// Failure records in input order.
    pub errors: Vec<Value>,
}

/// A scroll page was served by fewer shards than the index has.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ScanError {
    /// Scroll or point-in-time id in use when the failure was seen.
    pub scroll_id: String,
    /// Human readable shard summary.
    pub message: String,
}

/// OpenSearch error type.
#[derive(Error, Debug)]
pub enum OpenSearchError {
    /// Connection error.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Transport-level failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Bulk batch finished with failed documents.
    #[error(transparent)]
    BulkIndex(#[from] BulkIndexError),

    /// Partial shard failure during a scan.
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// The cluster answered with something the helpers cannot interpret.
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// The blocking runtime could not be started.
    #[error("Runtime error: {0}")]
    Runtime(#[from] std::io::Error),

    /// Client error from opensearch crate.
    #[error("Client error: {0}")]
    Client(#[from] opensearch::Error),
}

impl OpenSearchError {
    /// HTTP status behind this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Transport(e) => e.status,
            Self::Client(e) => e.status_code().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Result type alias for OpenSearch operations.
pub type Result<T> = std::result::Result<T, OpenSearchError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::new(599, "Error!");
        assert_eq!(err.to_string(), "TransportError(599, 'Error!')");

        let err = TransportError::connection("connection refused");
        assert_eq!(err.to_string(), "TransportError(N/A, 'connection refused')");
        assert_eq!(err.status_value(), json!("N/A"));
    }

    #[test]
    fn test_rejection() {
        assert!(TransportError::new(429, "Rejected!").is_rejection());
        assert!(!TransportError::new(503, "unavailable").is_rejection());
        assert!(!TransportError::connection("reset").is_rejection());
    }

    #[test]
    fn test_bulk_index_error_message() {
        let err = BulkIndexError {
            errors: vec![json!({"index": {"status": 400}}), json!({"index": {"status": 400}})],
        };
        assert_eq!(err.to_string(), "2 document(s) failed to index.");
    }

    #[test]
    fn test_status_code_passthrough() {
        let err: OpenSearchError = TransportError::new(404, "index_not_found_exception").into();
        assert_eq!(err.status_code(), Some(404));
        assert_eq!(OpenSearchError::Validation("x".into()).status_code(), None);
    }
}
