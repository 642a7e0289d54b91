/// Audit event emission
///
/// Every resolution and reconciliation branch emits one structured event
/// through an injected sink. Events carry identifier hashes only, never raw
/// identifiers: once the raw values are discarded these events are the sole
/// forensic trail for a linkage decision.
use crate::hash::HashKind;
use serde::Serialize;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// A stored linkage field that disagrees with a freshly resolved value.
///
/// Modeled as data rather than an assertion so the mismatch flows through the
/// normal observability channel instead of crashing the attempt.
#[derive(Debug, Clone, Serialize)]
pub struct ConsistencyAnomaly {
    pub field: &'static str,
    pub stored: String,
    pub observed: String,
}

/// One structured audit event.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    #[serde(rename = "type")]
    pub event_type: &'static str,
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    pub primary_hash: Option<String>,
    pub fallback_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash_kind: Option<HashKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_record_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anomaly: Option<ConsistencyAnomaly>,
    pub reason: String,
}

impl AuditEvent {
    pub fn new(
        event_type: &'static str,
        outcome: &'static str,
        primary_hash: Option<&str>,
        fallback_hash: &str,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            event_type,
            outcome,
            subject_id: None,
            primary_hash: primary_hash.map(str::to_string),
            fallback_hash: fallback_hash.to_string(),
            hash_kind: None,
            external_record_id: None,
            anomaly: None,
            reason: reason.into(),
        }
    }

    pub fn with_kind(mut self, kind: HashKind) -> Self {
        self.hash_kind = Some(kind);
        self
    }

    pub fn with_subject(mut self, subject_id: &str) -> Self {
        self.subject_id = Some(subject_id.to_string());
        self
    }

    pub fn with_external_id(mut self, external_record_id: &str) -> Self {
        self.external_record_id = Some(external_record_id.to_string());
        self
    }

    pub fn with_anomaly(mut self, anomaly: ConsistencyAnomaly) -> Self {
        self.anomaly = Some(anomaly);
        self
    }
}

/// Write-only audit sink held by the resolver and reconciler.
///
/// An explicit injected collaborator rather than a global dispatch registry,
/// so tests can substitute a recording fake.
pub trait AuditSink: Send + Sync {
    fn emit(&self, event: AuditEvent);
}

/// Emits audit events as JSON lines through `tracing`.
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        match serde_json::to_string(&event) {
            Ok(json) => tracing::info!(target: "carelink::audit", "{}", json),
            Err(e) => {
                tracing::warn!(target: "carelink::audit", error = %e, "failed to serialize audit event")
            }
        }
    }
}

/// Sink that retains events in memory for later inspection.
#[derive(Default)]
pub struct RecordingAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl RecordingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl AuditSink for RecordingAuditSink {
    fn emit(&self, event: AuditEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}

/// Install a JSON-formatted tracing subscriber for audit output.
///
/// Intended for binaries embedding this subsystem; safe to call more than
/// once (later calls are no-ops).
pub fn init_logging(filter: &str) {
    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::new(filter))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_hashes_and_kind() {
        let event = AuditEvent::new(
            "identifier_resolution",
            "matched",
            Some("aa11"),
            "bb22",
            "found record via primary hash",
        )
        .with_kind(HashKind::Primary)
        .with_external_id("ext-1");

        let json: serde_json::Value = serde_json::from_str(&serde_json::to_string(&event).unwrap()).unwrap();
        assert_eq!(json["type"], "identifier_resolution");
        assert_eq!(json["primary_hash"], "aa11");
        assert_eq!(json["fallback_hash"], "bb22");
        assert_eq!(json["hash_kind"], "primary");
        assert_eq!(json["external_record_id"], "ext-1");
        assert!(json.get("anomaly").is_none());
    }

    #[test]
    fn test_absent_primary_serializes_as_null() {
        let event = AuditEvent::new("identifier_resolution", "no_match", None, "bb22", "no record");
        let json: serde_json::Value = serde_json::from_str(&serde_json::to_string(&event).unwrap()).unwrap();
        assert!(json["primary_hash"].is_null());
    }

    #[test]
    fn test_recording_sink_collects() {
        let sink = RecordingAuditSink::new();
        sink.emit(AuditEvent::new("t", "o", None, "f", "r"));
        sink.emit(AuditEvent::new("t", "o2", None, "f", "r2"));
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].outcome, "o2");
    }
}
