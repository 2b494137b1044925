//! Error types for the laboratory core

use thiserror::Error;

use crate::domain::EntityKind;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the laboratory core
#[derive(Error, Debug)]
pub enum Error {
    /// Record with the given id does not exist
    #[error("{kind} with id {id} not found")]
    NotFound { kind: EntityKind, id: i64 },

    /// Listing or search produced no records
    #[error("No {kind} records found: {criteria}")]
    NoMatches { kind: EntityKind, criteria: String },

    /// Caller supplied an argument that cannot be served
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Store I/O or constraint failure
    #[error("Store failure: {0}")]
    Store(String),

    /// Store failure after a delete cascade already evicted or deleted part of the graph
    #[error("Delete cascade for {kind} {id} left the entity graph partially deleted: {source}")]
    CascadeIncomplete {
        kind: EntityKind,
        id: i64,
        #[source]
        source: Box<Error>,
    },

    /// Notification delivery failed
    #[error("Notification delivery failed: {0}")]
    Notification(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification used by outer layers to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    NotFound,
    InvalidArgument,
    StoreFailure,
    Internal,
}

impl ErrorClass {
    /// HTTP status an outer transport would answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorClass::NotFound => 404,
            ErrorClass::InvalidArgument => 400,
            ErrorClass::StoreFailure | ErrorClass::Internal => 500,
        }
    }
}

impl Error {
    pub fn not_found(kind: EntityKind, id: i64) -> Self {
        Error::NotFound { kind, id }
    }

    pub fn no_matches(kind: EntityKind, criteria: impl Into<String>) -> Self {
        Error::NoMatches {
            kind,
            criteria: criteria.into(),
        }
    }

    /// Classify this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::NotFound { .. } | Error::NoMatches { .. } => ErrorClass::NotFound,
            Error::InvalidArgument(_) | Error::Config(_) => ErrorClass::InvalidArgument,
            Error::Store(_) | Error::CascadeIncomplete { .. } | Error::Io(_) => {
                ErrorClass::StoreFailure
            }
            Error::Notification(_) | Error::Internal(_) => ErrorClass::Internal,
        }
    }

    /// True for `NotFound` of any kind.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Kind carried by a not-found error, if any.
    pub fn not_found_kind(&self) -> Option<EntityKind> {
        match self {
            Error::NotFound { kind, .. } | Error::NoMatches { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
