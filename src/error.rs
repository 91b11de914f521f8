// Error taxonomy for the engine surface

use thiserror::Error;

use crate::models::{GenerationState, SectionId};

/// Failure of an asynchronous generation task. Carries the section so
/// callers and event consumers can attribute the failure without extra
/// bookkeeping.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("Generation backend failed for section '{section}': {reason}")]
    Backend { section: SectionId, reason: String },

    #[error("Generation for section '{section}' timed out after {seconds}s")]
    Timeout { section: SectionId, seconds: u64 },

    #[error("Generation for section '{section}' was cancelled")]
    Cancelled { section: SectionId },
}

impl GenerationError {
    pub fn section(&self) -> SectionId {
        match self {
            GenerationError::Backend { section, .. } => *section,
            GenerationError::Timeout { section, .. } => *section,
            GenerationError::Cancelled { section } => *section,
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Unknown section id: '{0}'")]
    SectionNotFound(String),

    #[error("Unknown session id: '{0}'")]
    SessionNotFound(String),

    #[error("Unknown conflict id: '{0}'")]
    ConflictNotFound(String),

    #[error("Section '{section}' already has a generation in flight")]
    Busy { section: SectionId },

    #[error("Section '{section}' cannot be modified while in state {state:?}")]
    InvalidState {
        section: SectionId,
        state: GenerationState,
    },

    #[error("No active session")]
    NoActiveSession,

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl EngineError {
    /// True for the errors a caller can retry after the in-flight work
    /// settles
    pub fn is_busy(&self) -> bool {
        matches!(self, EngineError::Busy { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_error_carries_section() {
        let err = GenerationError::Timeout {
            section: SectionId::Metrics,
            seconds: 120,
        };
        assert_eq!(err.section(), SectionId::Metrics);
        assert!(err.to_string().contains("metrics"));
        assert!(err.to_string().contains("120"));
    }

    #[test]
    fn test_generation_error_converts_to_engine_error() {
        let err: EngineError = GenerationError::Cancelled {
            section: SectionId::ExecSummary,
        }
        .into();
        assert!(matches!(err, EngineError::Generation(_)));
        assert!(err.to_string().contains("exec-summary"));
    }

    #[test]
    fn test_busy_classification() {
        let busy = EngineError::Busy {
            section: SectionId::Objectives,
        };
        assert!(busy.is_busy());
        assert!(!EngineError::NoActiveSession.is_busy());
    }
}
