/// Configuration for the crosswalk subsystem
use crate::error::{LinkError, LinkResult};
use serde::{Deserialize, Serialize};
use std::env;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    pub directory: DirectoryConfig,
    pub reconcile: ReconcileConfig,
}

/// Remote patient directory configuration.
///
/// The response field names are owned by the remote service and therefore
/// configurable rather than hard-coded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Base URL of the directory search API
    pub base_url: String,
    /// Identifier system URI paired with primary-hash searches
    pub primary_system: String,
    /// Identifier system URI paired with fallback-hash searches
    pub fallback_system: String,
    /// Response field holding the declared result count
    pub total_field: String,
    /// Response field holding the list of result entries
    pub entry_field: String,
    /// Entry field wrapping the matched record
    pub resource_field: String,
    /// Record field holding the opaque record id
    pub id_field: String,
    /// Per-request timeout in seconds; expiry surfaces as a transport error
    pub timeout_secs: u64,
    /// User-Agent header for directory requests
    pub user_agent: String,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/fhir".to_string(),
            primary_system: "https://carelink.example/resources/identifier/primary-hash".to_string(),
            fallback_system: "https://carelink.example/resources/identifier/fallback-hash".to_string(),
            total_field: "total".to_string(),
            entry_field: "entry".to_string(),
            resource_field: "resource".to_string(),
            id_field: "id".to_string(),
            timeout_secs: 10,
            user_agent: "CareLink/0.1".to_string(),
        }
    }
}

/// Reconciliation policy configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// When true, a stored fallback hash or external record id that disagrees
    /// with a fresh resolution fails the attempt instead of only logging a
    /// consistency anomaly. Default is log-and-continue, which tolerates
    /// provider-side identifier rotation.
    pub strict_fallback_match: bool,
}

impl LinkConfig {
    /// Load configuration from environment variables.
    ///
    /// `CARELINK_DIRECTORY_URL` is required; everything else falls back to
    /// defaults.
    pub fn from_env() -> LinkResult<Self> {
        dotenv::dotenv().ok();

        let defaults = DirectoryConfig::default();

        let base_url = env::var("CARELINK_DIRECTORY_URL")
            .map_err(|_| LinkError::Configuration("CARELINK_DIRECTORY_URL is required".to_string()))?;

        let directory = DirectoryConfig {
            base_url,
            primary_system: env::var("CARELINK_PRIMARY_SYSTEM").unwrap_or(defaults.primary_system),
            fallback_system: env::var("CARELINK_FALLBACK_SYSTEM").unwrap_or(defaults.fallback_system),
            total_field: env::var("CARELINK_TOTAL_FIELD").unwrap_or(defaults.total_field),
            entry_field: env::var("CARELINK_ENTRY_FIELD").unwrap_or(defaults.entry_field),
            resource_field: env::var("CARELINK_RESOURCE_FIELD").unwrap_or(defaults.resource_field),
            id_field: env::var("CARELINK_ID_FIELD").unwrap_or(defaults.id_field),
            timeout_secs: env::var("CARELINK_DIRECTORY_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.timeout_secs),
            user_agent: env::var("CARELINK_USER_AGENT").unwrap_or(defaults.user_agent),
        };

        let reconcile = ReconcileConfig {
            strict_fallback_match: env::var("CARELINK_STRICT_FALLBACK_MATCH")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        };

        Ok(Self { directory, reconcile })
    }
}
