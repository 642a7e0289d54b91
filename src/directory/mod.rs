/// Directory lookup layer
///
/// Issues identifier-scoped searches against the remote patient directory
/// and classifies the raw response. One search per call, no retries here:
/// retry policy belongs to the caller.

pub mod client;

pub use client::{DirectoryClient, HttpDirectoryClient};

/// Classified result of one identifier search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// Exactly one record matched; carries the directory's opaque record id
    SingleMatch { record_id: String },
    /// A well-formed empty result. A legitimate negative, not a fault.
    NoMatch,
    /// More than one record matched a single identifier. Irrecoverable:
    /// retrying cannot resolve duplicated backend state.
    Ambiguous { detail: String },
}
