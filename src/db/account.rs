/// Account and crosswalk database models
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Local account created for a matched beneficiary.
///
/// Display fields are captured at creation for the surrounding system; only
/// `subject_id` is ever used for matching.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LocalAccount {
    pub id: String,
    /// The identity provider's stable subject claim
    pub subject_id: String,
    pub given_name: String,
    pub family_name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// Durable linkage between a local account and a directory record.
///
/// Owned 1:1 by its account; created with it and deleted with it. Mutated
/// only by the reconciler, to backfill a previously-null primary hash or to
/// update resolution provenance.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Crosswalk {
    pub account_id: String,
    /// Hash of the provider's primary identifier; unique when present
    pub primary_hash: Option<String>,
    /// Hash of the provider's fallback identifier; always present, unique
    pub fallback_hash: String,
    /// Id of the matched record in the remote directory; unique
    pub external_record_id: String,
    /// Which identifier last resolved the record: "P" (primary) or "F" (fallback)
    pub provenance: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
