//! Error types and result types for collection browsing operations.
//!
//! Malformed caller input (a bad filter shape, an undecodable cursor) is degraded
//! gracefully wherever the contract allows it and never reaches this module. What
//! remains are failures the core cannot recover from: a store that rejects the
//! query, a store that cannot be reached, a timeout or a cancellation.
//! Use [`BrowseResult<T>`] as the return type for fallible operations.

use std::time::Duration;

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

use crate::schema::SchemaSource;

/// Represents all possible errors that can occur while browsing a collection.
///
/// The variants split into two families so that an HTTP layer can pick a status
/// code: input errors ([`BrowseError::is_input_error`]) and backend errors
/// ([`BrowseError::is_backend_error`]).
#[derive(Error, Debug)]
pub enum BrowseError {
    /// The request is invalid: a forbidden operator, an unknown filter operator,
    /// or a query the store refused to parse.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// The store could not be reached (network failure, server selection timeout).
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    /// The store failed while executing an otherwise valid request.
    #[error("Backend error: {0}")]
    Backend(String),
    /// The caller-supplied (or configured) deadline elapsed before the store answered.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
    /// The caller cancelled the operation while a store round trip was outstanding.
    #[error("Operation cancelled")]
    Cancelled,
    /// Serialization/deserialization error when converting between BSON and JSON.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Invalid configuration values or an unreadable configuration file.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BrowseError {
    /// Returns `true` when the failure was caused by the request itself.
    pub fn is_input_error(&self) -> bool {
        matches!(self, BrowseError::InvalidInput(_) | BrowseError::Serialization(_))
    }

    /// Returns `true` when the failure originates from the store or its transport.
    pub fn is_backend_error(&self) -> bool {
        matches!(
            self,
            BrowseError::Unavailable(_) | BrowseError::Backend(_) | BrowseError::Timeout(_)
        )
    }
}

/// A specialized `Result` type for browsing operations.
pub type BrowseResult<T> = Result<T, BrowseError>;

impl From<BsonError> for BrowseError {
    fn from(err: BsonError) -> Self {
        BrowseError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for BrowseError {
    fn from(err: SerdeJsonError) -> Self {
        BrowseError::Serialization(err.to_string())
    }
}

/// Failure of a single schema source.
///
/// These never escape [`crate::schema::SchemaInferencer::infer`]; the inferencer
/// logs them and moves on to the next source. Only a failing store round trip
/// (wrapped in [`SchemaSourceError::Store`]) is propagated.
#[derive(Error, Debug)]
pub enum SchemaSourceError {
    /// The source exists but its description could not be interpreted.
    #[error("Malformed {origin} schema: {reason}")]
    Malformed {
        origin: SchemaSource,
        reason: String,
    },
    /// The store failed while the source was reading documents.
    #[error(transparent)]
    Store(#[from] BrowseError),
}

impl SchemaSourceError {
    pub(crate) fn malformed(origin: SchemaSource, reason: impl Into<String>) -> Self {
        SchemaSourceError::Malformed {
            origin,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_input_and_backend_failures() {
        assert!(BrowseError::InvalidInput("bad".into()).is_input_error());
        assert!(!BrowseError::InvalidInput("bad".into()).is_backend_error());
        assert!(BrowseError::Unavailable("down".into()).is_backend_error());
        assert!(BrowseError::Timeout(Duration::from_millis(5)).is_backend_error());
        assert!(!BrowseError::Cancelled.is_backend_error());
        assert!(!BrowseError::Cancelled.is_input_error());
    }

    #[test]
    fn malformed_source_message_names_the_source() {
        let err = SchemaSourceError::malformed(SchemaSource::Registry, "properties is not an object");
        assert_eq!(
            err.to_string(),
            "Malformed registry schema: properties is not an object"
        );
    }
}
