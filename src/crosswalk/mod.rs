/// Crosswalk reconciliation
///
/// Finds or creates the local account and crosswalk for a resolved
/// beneficiary identity, enforcing the linkage uniqueness invariants.

pub mod reconciler;

pub use reconciler::{CrosswalkReconciler, EntitlementHook, NoopEntitlementHook};

use crate::{
    error::{LinkError, LinkResult},
    hash,
};

/// Inbound identity claims for one reconciliation attempt.
///
/// Display fields are used only for new-account creation, never for
/// matching.
#[derive(Debug, Clone)]
pub struct SubjectClaims {
    /// The identity provider's stable subject claim
    pub subject_id: String,
    /// Hash of the provider's primary identifier, when one was supplied
    pub primary_hash: Option<String>,
    /// Hash of the provider's fallback identifier
    pub fallback_hash: String,
    pub given_name: String,
    pub family_name: String,
    pub email: String,
}

impl SubjectClaims {
    /// Build claims from the provider's raw identity response, normalizing
    /// and digesting the raw identifiers. Raw values are not retained.
    pub fn from_provider(
        subject_id: &str,
        primary_raw: &str,
        fallback_raw: &str,
        given_name: &str,
        family_name: &str,
        email: &str,
    ) -> LinkResult<Self> {
        let subject_id = subject_id.trim().to_string();
        if subject_id.is_empty() {
            return Err(LinkError::InvalidIdentity(
                "subject id cannot be empty".to_string(),
            ));
        }

        let fallback_hash = hash::normalize_fallback(fallback_raw).ok_or_else(|| {
            LinkError::InvalidIdentity("fallback identifier cannot be empty".to_string())
        })?;

        Ok(Self {
            subject_id,
            primary_hash: hash::normalize_primary(primary_raw),
            fallback_hash,
            given_name: given_name.to_string(),
            family_name: family_name.to_string(),
            email: email.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_provider_hashes_identifiers() {
        let claims = SubjectClaims::from_provider(
            "subject-1",
            "1eg4-te5-mk72",
            "123456789A",
            "Jane",
            "Doe",
            "jane@example.com",
        )
        .unwrap();

        assert_eq!(claims.subject_id, "subject-1");
        assert_eq!(claims.primary_hash, hash::normalize_primary("1EG4-TE5-MK72"));
        assert_eq!(claims.fallback_hash, hash::normalize_fallback("123456789A").unwrap());
    }

    #[test]
    fn test_from_provider_empty_primary_is_absent() {
        let claims =
            SubjectClaims::from_provider("subject-1", "", "123456789A", "", "", "").unwrap();
        assert_eq!(claims.primary_hash, None);
    }

    #[test]
    fn test_from_provider_rejects_empty_subject() {
        let err = SubjectClaims::from_provider("  ", "x", "123456789A", "", "", "").unwrap_err();
        assert!(matches!(err, LinkError::InvalidIdentity(_)));
    }

    #[test]
    fn test_from_provider_rejects_empty_fallback() {
        let err = SubjectClaims::from_provider("subject-1", "x", "", "", "", "").unwrap_err();
        assert!(matches!(err, LinkError::InvalidIdentity(_)));
    }
}
