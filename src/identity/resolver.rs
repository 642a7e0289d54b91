/// Identifier resolver
use crate::{
    audit::{AuditEvent, AuditSink},
    directory::{DirectoryClient, SearchOutcome},
    error::{LinkError, LinkResult},
    hash::HashKind,
    identity::ResolutionOutcome,
};
use std::sync::Arc;

const EVENT_TYPE: &str = "identifier_resolution";

/// Resolves a beneficiary's external record id from identifier hashes.
///
/// Lookup order is strict: the primary identifier is preferred when present
/// because it is less likely to have been issued to more than one legacy
/// record; the fallback exists because the provider may not yet hold a
/// primary identifier for every subject. An ambiguous primary match fails
/// the whole resolution and never falls through to the fallback.
pub struct IdentityResolver {
    client: Arc<dyn DirectoryClient>,
    audit: Arc<dyn AuditSink>,
}

impl IdentityResolver {
    pub fn new(client: Arc<dyn DirectoryClient>, audit: Arc<dyn AuditSink>) -> Self {
        Self { client, audit }
    }

    /// Resolve one external record id, with provenance.
    ///
    /// Fails with `AmbiguousIdentity` when either lookup returns duplicates,
    /// `IdentityNotFound` when neither identifier matches, or `Transport`
    /// when the directory cannot be reached. Every branch emits exactly one
    /// audit event before returning.
    pub async fn resolve(
        &self,
        primary_hash: Option<&str>,
        fallback_hash: &str,
    ) -> LinkResult<ResolutionOutcome> {
        if let Some(primary) = primary_hash {
            match self.search(HashKind::Primary, primary, primary_hash, fallback_hash).await? {
                SearchOutcome::SingleMatch { record_id } => {
                    self.emit(
                        "matched",
                        HashKind::Primary,
                        primary_hash,
                        fallback_hash,
                        Some(&record_id),
                        "found record via primary hash",
                    );
                    return Ok(ResolutionOutcome {
                        external_record_id: record_id,
                        provenance: HashKind::Primary,
                    });
                }
                SearchOutcome::Ambiguous { detail } => {
                    // A duplicated primary identifier is a backend data
                    // integrity fault, not a "try something else" condition.
                    self.emit(
                        "ambiguous",
                        HashKind::Primary,
                        primary_hash,
                        fallback_hash,
                        None,
                        &detail,
                    );
                    return Err(LinkError::AmbiguousIdentity(detail));
                }
                SearchOutcome::NoMatch => {
                    self.emit(
                        "no_match",
                        HashKind::Primary,
                        primary_hash,
                        fallback_hash,
                        None,
                        "no record matched the primary hash",
                    );
                }
            }
        }

        match self.search(HashKind::Fallback, fallback_hash, primary_hash, fallback_hash).await? {
            SearchOutcome::SingleMatch { record_id } => {
                self.emit(
                    "matched",
                    HashKind::Fallback,
                    primary_hash,
                    fallback_hash,
                    Some(&record_id),
                    "found record via fallback hash",
                );
                Ok(ResolutionOutcome {
                    external_record_id: record_id,
                    provenance: HashKind::Fallback,
                })
            }
            SearchOutcome::Ambiguous { detail } => {
                self.emit(
                    "ambiguous",
                    HashKind::Fallback,
                    primary_hash,
                    fallback_hash,
                    None,
                    &detail,
                );
                Err(LinkError::AmbiguousIdentity(detail))
            }
            SearchOutcome::NoMatch => {
                let reason = "no record matched either identifier";
                self.emit(
                    "not_found",
                    HashKind::Fallback,
                    primary_hash,
                    fallback_hash,
                    None,
                    reason,
                );
                Err(LinkError::IdentityNotFound(reason.to_string()))
            }
        }
    }

    /// One directory search, with a transport failure audited before it
    /// propagates.
    async fn search(
        &self,
        kind: HashKind,
        hash: &str,
        primary_hash: Option<&str>,
        fallback_hash: &str,
    ) -> LinkResult<SearchOutcome> {
        match self.client.search_by_identifier(kind, hash).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.emit(
                    "transport_error",
                    kind,
                    primary_hash,
                    fallback_hash,
                    None,
                    &e.to_string(),
                );
                Err(e)
            }
        }
    }

    fn emit(
        &self,
        outcome: &'static str,
        kind: HashKind,
        primary_hash: Option<&str>,
        fallback_hash: &str,
        external_record_id: Option<&str>,
        reason: &str,
    ) {
        let mut event =
            AuditEvent::new(EVENT_TYPE, outcome, primary_hash, fallback_hash, reason).with_kind(kind);
        if let Some(id) = external_record_id {
            event = event.with_external_id(id);
        }
        self.audit.emit(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::RecordingAuditSink;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Directory fake scripted per hash kind; `None` means transport failure.
    struct FakeDirectory {
        primary: Option<SearchOutcome>,
        fallback: Option<SearchOutcome>,
        calls: Mutex<Vec<HashKind>>,
    }

    impl FakeDirectory {
        fn new(primary: Option<SearchOutcome>, fallback: Option<SearchOutcome>) -> Self {
            Self {
                primary,
                fallback,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<HashKind> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DirectoryClient for FakeDirectory {
        async fn search_by_identifier(
            &self,
            kind: HashKind,
            _hash: &str,
        ) -> LinkResult<SearchOutcome> {
            self.calls.lock().unwrap().push(kind);
            let scripted = match kind {
                HashKind::Primary => &self.primary,
                HashKind::Fallback => &self.fallback,
            };
            scripted
                .clone()
                .ok_or_else(|| LinkError::Transport("scripted transport failure".to_string()))
        }
    }

    fn single(record_id: &str) -> Option<SearchOutcome> {
        Some(SearchOutcome::SingleMatch {
            record_id: record_id.to_string(),
        })
    }

    fn ambiguous() -> Option<SearchOutcome> {
        Some(SearchOutcome::Ambiguous {
            detail: "duplicate records in declared result total".to_string(),
        })
    }

    fn resolver(client: Arc<FakeDirectory>) -> (IdentityResolver, Arc<RecordingAuditSink>) {
        let sink = Arc::new(RecordingAuditSink::new());
        (IdentityResolver::new(client, sink.clone()), sink)
    }

    #[tokio::test]
    async fn test_primary_match_wins() {
        let client = Arc::new(FakeDirectory::new(single("ext-1"), single("ext-2")));
        let (resolver, sink) = resolver(client.clone());

        let outcome = resolver.resolve(Some(&"b".repeat(64)), &"a".repeat(64)).await.unwrap();
        assert_eq!(outcome.external_record_id, "ext-1");
        assert_eq!(outcome.provenance, HashKind::Primary);
        assert_eq!(client.calls(), vec![HashKind::Primary]);

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].outcome, "matched");
        assert_eq!(events[0].hash_kind, Some(HashKind::Primary));
    }

    #[tokio::test]
    async fn test_absent_primary_skips_primary_lookup() {
        let client = Arc::new(FakeDirectory::new(single("ext-1"), single("ext-2")));
        let (resolver, _sink) = resolver(client.clone());

        let outcome = resolver.resolve(None, &"a".repeat(64)).await.unwrap();
        assert_eq!(outcome.external_record_id, "ext-2");
        assert_eq!(outcome.provenance, HashKind::Fallback);
        assert_eq!(client.calls(), vec![HashKind::Fallback]);
    }

    #[tokio::test]
    async fn test_primary_no_match_falls_back() {
        let client = Arc::new(FakeDirectory::new(Some(SearchOutcome::NoMatch), single("ext-2")));
        let (resolver, sink) = resolver(client.clone());

        let outcome = resolver.resolve(Some(&"b".repeat(64)), &"a".repeat(64)).await.unwrap();
        assert_eq!(outcome.provenance, HashKind::Fallback);
        assert_eq!(client.calls(), vec![HashKind::Primary, HashKind::Fallback]);

        // One event per branch: primary miss, then fallback match.
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].outcome, "no_match");
        assert_eq!(events[1].outcome, "matched");
    }

    #[tokio::test]
    async fn test_ambiguous_primary_short_circuits() {
        let client = Arc::new(FakeDirectory::new(ambiguous(), single("ext-2")));
        let (resolver, sink) = resolver(client.clone());

        let err = resolver.resolve(Some(&"b".repeat(64)), &"a".repeat(64)).await.unwrap_err();
        assert!(matches!(err, LinkError::AmbiguousIdentity(_)));
        // The fallback lookup must never run after an ambiguous primary.
        assert_eq!(client.calls(), vec![HashKind::Primary]);

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].outcome, "ambiguous");
    }

    #[tokio::test]
    async fn test_ambiguous_fallback_fails() {
        let client = Arc::new(FakeDirectory::new(None, ambiguous()));
        let (resolver, _sink) = resolver(client.clone());

        let err = resolver.resolve(None, &"a".repeat(64)).await.unwrap_err();
        assert!(matches!(err, LinkError::AmbiguousIdentity(_)));
    }

    #[tokio::test]
    async fn test_no_match_anywhere_is_not_found() {
        let client = Arc::new(FakeDirectory::new(
            Some(SearchOutcome::NoMatch),
            Some(SearchOutcome::NoMatch),
        ));
        let (resolver, sink) = resolver(client.clone());

        let err = resolver.resolve(Some(&"b".repeat(64)), &"a".repeat(64)).await.unwrap_err();
        assert!(matches!(err, LinkError::IdentityNotFound(_)));
        assert_eq!(client.calls(), vec![HashKind::Primary, HashKind::Fallback]);

        let events = sink.events();
        assert_eq!(events.last().unwrap().outcome, "not_found");
    }

    #[tokio::test]
    async fn test_transport_error_propagates_and_is_audited() {
        let client = Arc::new(FakeDirectory::new(None, single("ext-2")));
        let (resolver, sink) = resolver(client.clone());

        let err = resolver.resolve(Some(&"b".repeat(64)), &"a".repeat(64)).await.unwrap_err();
        assert!(matches!(err, LinkError::Transport(_)));

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].outcome, "transport_error");
    }

    #[tokio::test]
    async fn test_events_carry_both_hashes() {
        let client = Arc::new(FakeDirectory::new(single("ext-1"), None));
        let (resolver, sink) = resolver(client);

        let primary = "b".repeat(64);
        let fallback = "a".repeat(64);
        resolver.resolve(Some(&primary), &fallback).await.unwrap();

        let events = sink.events();
        assert_eq!(events[0].primary_hash.as_deref(), Some(primary.as_str()));
        assert_eq!(events[0].fallback_hash, fallback);
        assert_eq!(events[0].external_record_id.as_deref(), Some("ext-1"));
    }
}
