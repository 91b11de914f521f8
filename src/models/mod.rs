// Core data models for sessions, sections, citations, and conflicts

pub mod corpus;
pub mod section;

pub use corpus::{SourceCorpus, SourceFragment, SourceKind};
pub use section::{
    can_transition, is_generating, transition_state, GenerationState, Section, SectionId,
    StateTransitionError,
};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Provenance pointer from drafted content back to an ingested source.
/// Two citations are the same reference when all fields match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    pub source_id: String,
    pub locator: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

impl Citation {
    pub fn new(source_id: impl Into<String>, locator: impl Into<String>) -> Self {
        Citation {
            source_id: source_id.into(),
            locator: locator.into(),
            snippet: None,
        }
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }

    /// The `(source_id, locator)` address, ignoring the snippet
    pub fn address(&self) -> (String, String) {
        (self.source_id.clone(), self.locator.clone())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConflictSeverity {
    Low,
    Medium,
    High,
}

impl ConflictSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictSeverity::Low => "low",
            ConflictSeverity::Medium => "medium",
            ConflictSeverity::High => "high",
        }
    }
}

impl std::fmt::Display for ConflictSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ConflictSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(ConflictSeverity::Low),
            "medium" => Ok(ConflictSeverity::Medium),
            "high" => Ok(ConflictSeverity::High),
            _ => Err(format!(
                "Unknown conflict severity: '{}'. Expected one of: low, medium, high",
                s
            )),
        }
    }
}

/// A detected contradiction between two requirement statements drawn from
/// different places in the document. Conflicts are never deleted; `resolved`
/// only ever moves from `false` to `true`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub id: String,
    pub statement_a: String,
    pub statement_b: String,
    pub source_ref_a: Citation,
    pub source_ref_b: Citation,
    pub severity: ConflictSeverity,
    pub resolved: bool,
    pub detected_at: DateTime<Utc>,
}

impl Conflict {
    pub fn new(
        statement_a: impl Into<String>,
        statement_b: impl Into<String>,
        source_ref_a: Citation,
        source_ref_b: Citation,
        severity: ConflictSeverity,
    ) -> Self {
        Conflict {
            id: Conflict::generate_id(),
            statement_a: statement_a.into(),
            statement_b: statement_b.into(),
            source_ref_a,
            source_ref_b,
            severity,
            resolved: false,
            detected_at: Utc::now(),
        }
    }

    /// Generates the `conflict-` prefixed identifier for a new conflict
    pub fn generate_id() -> String {
        format!("conflict-{}", uuid::Uuid::new_v4())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Draft,
    Active,
    Complete,
}

impl Default for SessionStatus {
    fn default() -> Self {
        SessionStatus::Draft
    }
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Draft => "draft",
            SessionStatus::Active => "active",
            SessionStatus::Complete => "complete",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Aggregate counters derived from a session's document. Never edited
/// directly; always recomputed from the owning store.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionCounters {
    pub section_count: u32,
    pub citation_count: u32,
    pub word_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub name: String,
    pub description: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub counters: SessionCounters,
}

impl Session {
    /// Creates a fresh draft session with a generated id
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Session {
            id: generate_session_id(),
            name: name.into(),
            description: description.into(),
            status: SessionStatus::Draft,
            created_at: Utc::now(),
            counters: SessionCounters::default(),
        }
    }
}

/// Partial update for session metadata. `id`, `created_at`, and counters
/// are not patchable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<SessionStatus>,
}

impl SessionPatch {
    pub fn apply_to(&self, session: &mut Session) {
        if let Some(name) = &self.name {
            session.name = name.clone();
        }
        if let Some(description) = &self.description {
            session.description = description.clone();
        }
        if let Some(status) = self.status {
            session.status = status;
        }
    }
}

/// Generates a `sess_` prefixed id with 8 hex characters of entropy
pub fn generate_session_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..8)
        .map(|_| {
            let n: u8 = rng.gen_range(0..16);
            char::from_digit(n as u32, 16).unwrap_or('0')
        })
        .collect();
    format!("sess_{}", suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_citation_value_equality() {
        let a = Citation::new("slack-1", "msg-42").with_snippet("modernize");
        let b = Citation::new("slack-1", "msg-42").with_snippet("modernize");
        let c = Citation::new("slack-1", "msg-43").with_snippet("modernize");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.address(), ("slack-1".to_string(), "msg-42".to_string()));
    }

    #[test]
    fn test_citation_serde_shape() {
        let citation = Citation::new("kickoff.pdf", "p3");
        let json = serde_json::to_string(&citation).unwrap();
        assert!(json.contains("\"sourceId\":\"kickoff.pdf\""));
        assert!(json.contains("\"locator\":\"p3\""));
        // Absent snippet is omitted, not null
        assert!(!json.contains("snippet"));
    }

    #[test]
    fn test_severity_ordering_and_parse() {
        assert!(ConflictSeverity::High > ConflictSeverity::Medium);
        assert!(ConflictSeverity::Medium > ConflictSeverity::Low);
        assert_eq!(
            "medium".parse::<ConflictSeverity>().unwrap(),
            ConflictSeverity::Medium
        );
        assert!("critical".parse::<ConflictSeverity>().is_err());
    }

    #[test]
    fn test_conflict_id_format() {
        let id = Conflict::generate_id();
        assert!(id.starts_with("conflict-"));
        assert_eq!(id.len(), "conflict-".len() + 36);
    }

    #[test]
    fn test_session_id_format() {
        let id = generate_session_id();
        assert!(id.starts_with("sess_"));
        let suffix = &id["sess_".len()..];
        assert_eq!(suffix.len(), 8);
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_new_session_defaults() {
        let session = Session::new("Project Alpha", "Portal modernization");
        assert_eq!(session.status, SessionStatus::Draft);
        assert_eq!(session.counters, SessionCounters::default());
        assert_eq!(session.name, "Project Alpha");
    }

    #[test]
    fn test_patch_leaves_unset_fields_alone() {
        let mut session = Session::new("Alpha", "first pass");
        let created = session.created_at;
        let id = session.id.clone();

        let patch = SessionPatch {
            name: Some("Alpha v2".to_string()),
            description: None,
            status: Some(SessionStatus::Active),
        };
        patch.apply_to(&mut session);

        assert_eq!(session.name, "Alpha v2");
        assert_eq!(session.description, "first pass");
        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(session.created_at, created);
        assert_eq!(session.id, id);
    }
}
