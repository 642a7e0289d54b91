/// Unified error types for the crosswalk subsystem
use serde::Serialize;
use thiserror::Error;

/// Uniqueness axis violated by an attempted creation.
///
/// Callers must be able to tell which field collided, so the axis is carried
/// on the error rather than flattened into a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateField {
    SubjectId,
    FallbackHash,
    PrimaryHash,
    ExternalRecordId,
}

impl DuplicateField {
    pub fn as_str(&self) -> &'static str {
        match self {
            DuplicateField::SubjectId => "subject_id",
            DuplicateField::FallbackHash => "fallback_hash",
            DuplicateField::PrimaryHash => "primary_hash",
            DuplicateField::ExternalRecordId => "external_record_id",
        }
    }
}

impl std::fmt::Display for DuplicateField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for crosswalk resolution and reconciliation
#[derive(Error, Debug)]
pub enum LinkError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Network or non-2xx failure while querying the record directory.
    /// Recoverable by caller retry; never swallowed here.
    #[error("Directory transport error: {0}")]
    Transport(String),

    /// The directory holds more than one record for a single identifier.
    /// Non-retryable: retrying will not change the backend's state.
    #[error("Ambiguous identity: {0}")]
    AmbiguousIdentity(String),

    /// No directory record matched either identifier
    #[error("Identity not found: {0}")]
    IdentityNotFound(String),

    /// Malformed identity input, detected before any write
    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    /// A uniqueness invariant would be violated by the requested creation
    #[error("Duplicate record: {field} already linked")]
    DuplicateRecord { field: DuplicateField },

    /// Stored linkage disagrees with a fresh resolution (strict mode only)
    #[error("Consistency violation on {field}: stored {stored}, observed {observed}")]
    ConsistencyViolation {
        field: &'static str,
        stored: String,
        observed: String,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for crosswalk operations
pub type LinkResult<T> = Result<T, LinkError>;
