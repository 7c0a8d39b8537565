//! Client error types.

use crate::broker::BrokerError;
use crate::coordination::CoordError;
use thiserror::Error;

/// Result type for client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Client errors
#[derive(Debug, Error)]
pub enum Error {
    // ==================== Session Errors ====================
    #[error("session expired for consumer {consumer_id}")]
    SessionExpired { consumer_id: String },

    #[error("consumer is closed")]
    Closed,

    // ==================== Rebalance Errors ====================
    #[error("rebalance failed after {attempts} attempts: ownership claims kept conflicting")]
    RebalanceFailed { attempts: u32 },

    #[error("consumer id already registered: {consumer_id}")]
    MemberExists { consumer_id: String },

    // ==================== Routing Errors ====================
    #[error("broker unreachable: {0}")]
    BrokerUnreachable(String),

    #[error("partition index {index} out of range: topology has {available} partitions")]
    PartitionOutOfRange { index: usize, available: usize },

    // ==================== External Collaborators ====================
    #[error("coordination service error: {0}")]
    Coordination(String),

    #[error("broker error: {0}")]
    Broker(String),
}

impl Error {
    /// Whether the operation may succeed if retried as-is.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Error::BrokerUnreachable(_) | Error::Coordination(_) | Error::Broker(_)
        )
    }

    /// Whether the member instance is beyond local recovery, where the only
    /// way forward is a full re-join (or giving up).
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::SessionExpired { .. } | Error::Closed)
    }
}

impl Error {
    /// Map a coordination error observed by consumer `consumer_id`.
    ///
    /// Session expiry keeps its identity; everything else collapses into
    /// the generic coordination condition.
    pub(crate) fn from_coord(err: CoordError, consumer_id: &str) -> Self {
        match err {
            CoordError::SessionExpired => Error::SessionExpired {
                consumer_id: consumer_id.to_string(),
            },
            other => Error::Coordination(other.to_string()),
        }
    }
}

impl From<BrokerError> for Error {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::Unreachable(detail) => Error::BrokerUnreachable(detail),
            other => Error::Broker(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retriable_errors() {
        assert!(Error::BrokerUnreachable("b1".into()).is_retriable());
        assert!(Error::Coordination("timeout".into()).is_retriable());
        assert!(!Error::RebalanceFailed { attempts: 8 }.is_retriable());
        assert!(!Error::Closed.is_retriable());
    }

    #[test]
    fn test_fatal_errors() {
        assert!(Error::SessionExpired {
            consumer_id: "c1".into()
        }
        .is_fatal());
        assert!(Error::Closed.is_fatal());
        assert!(!Error::BrokerUnreachable("b1".into()).is_fatal());
    }

    #[test]
    fn test_session_expiry_keeps_identity() {
        let err = Error::from_coord(CoordError::SessionExpired, "c-42");
        assert!(matches!(err, Error::SessionExpired { consumer_id } if consumer_id == "c-42"));

        let err = Error::from_coord(CoordError::Unavailable("down".into()), "c-42");
        assert!(matches!(err, Error::Coordination(_)));
    }
}
