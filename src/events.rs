// Event types and payload structures for observers of engine state changes

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::models::{ConflictSeverity, SectionId, SourceKind};

// Event name constants
pub const EVENT_SESSION_CREATED: &str = "session:created";
pub const EVENT_SESSION_ACTIVATED: &str = "session:activated";
pub const EVENT_SESSION_PATCHED: &str = "session:patched";
pub const EVENT_SESSION_REMOVED: &str = "session:removed";

// Section lifecycle events
pub const EVENT_SECTION_CONTENT_UPDATED: &str = "section:content_updated";
pub const EVENT_SECTION_CITATION_APPENDED: &str = "section:citation_appended";
pub const EVENT_SECTION_CITATIONS_REPLACED: &str = "section:citations_replaced";
pub const EVENT_GENERATION_STARTED: &str = "section:generation_started";
pub const EVENT_GENERATION_COMPLETED: &str = "section:generation_completed";
pub const EVENT_GENERATION_FAILED: &str = "section:generation_failed";
pub const EVENT_GENERATION_CANCELLED: &str = "section:generation_cancelled";

// Conflict ledger events
pub const EVENT_CONFLICT_DETECTED: &str = "conflict:detected";
pub const EVENT_CONFLICT_RESOLVED: &str = "conflict:resolved";

// Source ingestion events
pub const EVENT_SOURCE_ADDED: &str = "source:added";

/// Payload for session created events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreatedPayload {
    pub session_id: String,
    pub name: String,
}

/// Payload for session activated events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionActivatedPayload {
    pub session_id: String,
}

/// Payload for session patched events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPatchedPayload {
    pub session_id: String,
}

/// Payload for session removed events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRemovedPayload {
    pub session_id: String,
    /// Session the active pointer fell back to, if any
    pub new_active_session_id: Option<String>,
}

/// Payload for manual content update events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionContentUpdatedPayload {
    pub session_id: String,
    pub section: SectionId,
}

/// Payload for citation append events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionCitationAppendedPayload {
    pub session_id: String,
    pub section: SectionId,
    pub source_id: String,
    pub locator: String,
}

/// Payload for citation replacement events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionCitationsReplacedPayload {
    pub session_id: String,
    pub section: SectionId,
    pub citation_count: usize,
}

/// Payload for generation started events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationStartedPayload {
    pub session_id: String,
    pub section: SectionId,
}

/// Payload for generation completed events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationCompletedPayload {
    pub session_id: String,
    pub section: SectionId,
    pub citation_count: usize,
    pub new_conflicts: usize,
}

/// Payload for generation failed events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationFailedPayload {
    pub session_id: String,
    pub section: SectionId,
    pub error: String,
}

/// Payload for generation cancelled events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationCancelledPayload {
    pub session_id: String,
    pub section: SectionId,
}

/// Payload for conflict detected events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictDetectedPayload {
    pub session_id: String,
    pub conflict_id: String,
    pub section: SectionId,
    pub severity: ConflictSeverity,
}

/// Payload for conflict resolved events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictResolvedPayload {
    pub session_id: String,
    pub conflict_id: String,
}

/// Payload for source fragment ingestion events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceAddedPayload {
    pub session_id: String,
    pub source_id: String,
    pub locator: String,
    pub kind: SourceKind,
    pub label: String,
}

/// An engine event delivered to subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineEvent {
    /// Event type (e.g., "section:generation_completed", "conflict:detected")
    pub event: String,
    /// Event payload as JSON value
    pub payload: serde_json::Value,
}

/// Broadcasts engine events to all subscribers
pub struct EventBroadcaster {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBroadcaster {
    /// Create a new event broadcaster with a channel capacity of 1000 events
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1000);
        Self { tx }
    }

    /// Broadcast an event to all subscribers
    pub fn broadcast(&self, event_type: &str, payload: impl Serialize) {
        let event = EngineEvent {
            event: event_type.to_string(),
            payload: serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
        };

        // Ignore send errors (no receivers)
        let _ = self.tx.send(event);
    }

    /// Subscribe to events (returns a receiver)
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_constants() {
        assert_eq!(EVENT_SESSION_CREATED, "session:created");
        assert_eq!(EVENT_GENERATION_STARTED, "section:generation_started");
        assert_eq!(EVENT_GENERATION_COMPLETED, "section:generation_completed");
        assert_eq!(EVENT_GENERATION_FAILED, "section:generation_failed");
        assert_eq!(EVENT_GENERATION_CANCELLED, "section:generation_cancelled");
        assert_eq!(EVENT_CONFLICT_DETECTED, "conflict:detected");
        assert_eq!(EVENT_CONFLICT_RESOLVED, "conflict:resolved");
        assert_eq!(EVENT_SOURCE_ADDED, "source:added");
    }

    #[test]
    fn test_generation_completed_payload_serialization() {
        let payload = GenerationCompletedPayload {
            session_id: "sess_02a9fe3c".to_string(),
            section: SectionId::ExecSummary,
            citation_count: 2,
            new_conflicts: 1,
        };

        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"sessionId\":\"sess_02a9fe3c\""));
        assert!(json.contains("\"section\":\"exec-summary\""));
        assert!(json.contains("\"citationCount\":2"));
        assert!(json.contains("\"newConflicts\":1"));
    }

    #[test]
    fn test_conflict_detected_payload_serialization() {
        let payload = ConflictDetectedPayload {
            session_id: "sess_02a9fe3c".to_string(),
            conflict_id: "conflict-8faf7c1e".to_string(),
            section: SectionId::Functional,
            severity: ConflictSeverity::Medium,
        };

        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"conflictId\":\"conflict-8faf7c1e\""));
        assert!(json.contains("\"severity\":\"medium\""));
        assert!(json.contains("\"section\":\"functional\""));
    }

    #[test]
    fn test_broadcaster_delivers_to_subscriber() {
        let broadcaster = EventBroadcaster::new();
        let mut rx = broadcaster.subscribe();

        broadcaster.broadcast(
            EVENT_SESSION_CREATED,
            SessionCreatedPayload {
                session_id: "sess_11112222".to_string(),
                name: "Alpha".to_string(),
            },
        );

        let event = rx.try_recv().unwrap();
        assert_eq!(event.event, EVENT_SESSION_CREATED);
        assert_eq!(event.payload["sessionId"], "sess_11112222");
    }

    #[test]
    fn test_broadcast_without_subscribers_is_silent() {
        let broadcaster = EventBroadcaster::new();
        broadcaster.broadcast(
            EVENT_SESSION_ACTIVATED,
            SessionActivatedPayload {
                session_id: "sess_deadbeef".to_string(),
            },
        );
    }
}
