/// Identity resolution
///
/// Orchestrates directory lookups in priority order (primary identifier,
/// then fallback) and produces one resolved external record id together
/// with the provenance of which identifier resolved it.

pub mod resolver;

pub use resolver::IdentityResolver;

use crate::hash::HashKind;

/// Result of a successful resolution. Transient, produced fresh on every
/// authentication event; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionOutcome {
    /// Id of the matched record in the remote directory
    pub external_record_id: String,
    /// Which identifier produced the match
    pub provenance: HashKind,
}
