//! BRD synthesis engine: multi-session requirements documents assembled
//! from ingested source material, with per-section draft generation,
//! citation tracking, and cross-section conflict detection.
//!
//! [`BrdEngine`] is the entry point; everything else hangs off it.

#![allow(clippy::new_without_default)] // Default not always appropriate for stateful types

// Module declarations
pub mod config;
pub mod conflicts;
pub mod document;
pub mod engine;
pub mod error;
pub mod events;
pub mod export;
pub mod file_storage;
pub mod generation;
pub mod models;
pub mod registry;
pub mod state;

// Re-export the working surface at the crate root
pub use config::EngineConfig;
pub use conflicts::{
    ConflictAnalyzer, ConflictFilter, ConflictLedger, FlaggedPair, NoopConflictAnalyzer, Statement,
};
pub use document::DocumentStore;
pub use engine::BrdEngine;
pub use error::{EngineError, GenerationError};
pub use events::{EngineEvent, EventBroadcaster};
pub use generation::{
    BackendError, GeneratedDraft, GenerationBackend, GenerationHandle, GenerationReceipt,
};
pub use models::*;
pub use registry::{RegistryStats, SessionRegistry};
pub use state::SessionState;
