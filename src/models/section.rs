// BRD section identity, content, and the per-section generation state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::Citation;

/// The fixed set of sections every BRD document carries, in template order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum SectionId {
    ExecSummary,
    Objectives,
    Stakeholders,
    Functional,
    NonFunctional,
    Assumptions,
    Metrics,
    Timeline,
}

impl SectionId {
    /// Returns all section ids in template order
    pub fn all() -> &'static [SectionId] {
        &[
            SectionId::ExecSummary,
            SectionId::Objectives,
            SectionId::Stakeholders,
            SectionId::Functional,
            SectionId::NonFunctional,
            SectionId::Assumptions,
            SectionId::Metrics,
            SectionId::Timeline,
        ]
    }

    /// Returns the wire/storage identifier for this section
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionId::ExecSummary => "exec-summary",
            SectionId::Objectives => "objectives",
            SectionId::Stakeholders => "stakeholders",
            SectionId::Functional => "functional",
            SectionId::NonFunctional => "non-functional",
            SectionId::Assumptions => "assumptions",
            SectionId::Metrics => "metrics",
            SectionId::Timeline => "timeline",
        }
    }

    /// Returns the human-readable heading used in exports
    pub fn title(&self) -> &'static str {
        match self {
            SectionId::ExecSummary => "Executive Summary",
            SectionId::Objectives => "Business Objectives",
            SectionId::Stakeholders => "Stakeholders",
            SectionId::Functional => "Functional Requirements",
            SectionId::NonFunctional => "Non-Functional Requirements",
            SectionId::Assumptions => "Assumptions & Constraints",
            SectionId::Metrics => "Success Metrics",
            SectionId::Timeline => "Timeline & Milestones",
        }
    }

    /// Position of this section in template order
    pub fn index(&self) -> usize {
        SectionId::all()
            .iter()
            .position(|s| s == self)
            .unwrap_or(0)
    }
}

impl std::fmt::Display for SectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SectionId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exec-summary" => Ok(SectionId::ExecSummary),
            "objectives" => Ok(SectionId::Objectives),
            "stakeholders" => Ok(SectionId::Stakeholders),
            "functional" => Ok(SectionId::Functional),
            "non-functional" => Ok(SectionId::NonFunctional),
            "assumptions" => Ok(SectionId::Assumptions),
            "metrics" => Ok(SectionId::Metrics),
            "timeline" => Ok(SectionId::Timeline),
            _ => Err(format!(
                "Unknown section id: '{}'. Expected one of: exec-summary, objectives, stakeholders, functional, non-functional, assumptions, metrics, timeline",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GenerationState {
    Idle,
    Generating,
    Error,
}

impl Default for GenerationState {
    fn default() -> Self {
        GenerationState::Idle
    }
}

/// Validates if a section can move from one generation state to another.
/// `generating -> generating` is deliberately absent: a second request for
/// a section that is already generating must be rejected, never stacked.
pub fn can_transition(from: GenerationState, to: GenerationState) -> bool {
    match (from, to) {
        // Starting a generation; error sections retry directly
        (GenerationState::Idle, GenerationState::Generating) => true,
        (GenerationState::Error, GenerationState::Generating) => true,

        // Settling a generation: success/cancel land on idle, failure on error
        (GenerationState::Generating, GenerationState::Idle) => true,
        (GenerationState::Generating, GenerationState::Error) => true,

        // All other transitions are invalid
        _ => false,
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateTransitionError {
    #[error("Invalid generation state transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: GenerationState,
        to: GenerationState,
    },
}

/// Validates and performs a state transition
pub fn transition_state(
    current: GenerationState,
    target: GenerationState,
) -> Result<GenerationState, StateTransitionError> {
    if !can_transition(current, target) {
        return Err(StateTransitionError::InvalidTransition {
            from: current,
            to: target,
        });
    }

    Ok(target)
}

/// Check if a state means a generation task currently owns the section
pub fn is_generating(state: GenerationState) -> bool {
    matches!(state, GenerationState::Generating)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: SectionId,
    pub title: String,
    pub content: String,
    pub citations: Vec<Citation>,
    pub generation_state: GenerationState,
    pub last_edited_at: Option<DateTime<Utc>>,
}

impl Section {
    /// Creates an empty section for the given id
    pub fn new(id: SectionId) -> Self {
        Section {
            id,
            title: id.title().to_string(),
            content: String::new(),
            citations: Vec::new(),
            generation_state: GenerationState::Idle,
            last_edited_at: None,
        }
    }

    /// Whitespace-separated word count of the current content
    pub fn word_count(&self) -> usize {
        self.content.split_whitespace().count()
    }

    pub fn has_content(&self) -> bool {
        !self.content.is_empty()
    }
}
