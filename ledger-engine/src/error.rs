//! Error types for the ledger engine

use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
///
/// Every failure is scoped to a single event and surfaces to the caller
/// as a typed result; nothing here is fatal to the process.
#[derive(Error, Debug)]
pub enum Error {
    /// Caller input malformed (rejected before any read)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Invoice not found
    #[error("Invoice not found: {0}")]
    InvoiceNotFound(String),

    /// Stock item not found
    #[error("Stock item not found: {0}")]
    StockItemNotFound(String),

    /// Purchase order not found
    #[error("Purchase order not found: {0}")]
    PurchaseOrderNotFound(String),

    /// Sales return not found
    #[error("Sales return not found: {0}")]
    SalesReturnNotFound(String),

    /// Business-logic conflict (rejected before any mutation)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// The atomic batch failed a version check; no partial state change
    /// occurred and the whole event is safe to retry from scratch
    #[error("Commit conflict: {0}")]
    CommitConflict(String),

    /// Storage error (RocksDB); no partial state change occurred
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::StoreUnavailable(err.to_string())
    }
}

impl Error {
    /// Whether retrying the whole event from scratch is safe and may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::CommitConflict(_) | Error::StoreUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::CommitConflict("stale".into()).is_retryable());
        assert!(Error::StoreUnavailable("down".into()).is_retryable());
        assert!(!Error::Validation("bad input".into()).is_retryable());
        assert!(!Error::InvariantViolation("too many".into()).is_retryable());
        assert!(!Error::InvoiceNotFound("missing".into()).is_retryable());
    }
}
