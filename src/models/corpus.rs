// Ingested source material a session synthesizes from

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Chat,
    Document,
    Transcript,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Chat => "chat",
            SourceKind::Document => "document",
            SourceKind::Transcript => "transcript",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chat" => Ok(SourceKind::Chat),
            "document" => Ok(SourceKind::Document),
            "transcript" => Ok(SourceKind::Transcript),
            _ => Err(format!(
                "Unknown source kind: '{}'. Expected one of: chat, document, transcript",
                s
            )),
        }
    }
}

/// One addressable piece of ingested material (a message, a document
/// passage, a transcript turn). `source_id` plus `locator` is the address
/// citations point back at.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SourceFragment {
    pub source_id: String,
    pub locator: String,
    pub kind: SourceKind,
    /// Human-readable origin, e.g. a channel or file name
    pub label: String,
    pub text: String,
    pub ingested_at: DateTime<Utc>,
}

impl SourceFragment {
    pub fn new(
        source_id: impl Into<String>,
        locator: impl Into<String>,
        kind: SourceKind,
        label: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        SourceFragment {
            source_id: source_id.into(),
            locator: locator.into(),
            kind,
            label: label.into(),
            text: text.into(),
            ingested_at: Utc::now(),
        }
    }
}

/// The session's ingested material in arrival order. Generation backends
/// receive a snapshot of this corpus with every request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SourceCorpus {
    fragments: Vec<SourceFragment>,
}

impl SourceCorpus {
    pub fn new() -> Self {
        SourceCorpus::default()
    }

    pub fn from_fragments(fragments: Vec<SourceFragment>) -> Self {
        SourceCorpus { fragments }
    }

    pub fn add(&mut self, fragment: SourceFragment) {
        log::debug!(
            "Corpus: added {} fragment {}#{}",
            fragment.kind,
            fragment.source_id,
            fragment.locator
        );
        self.fragments.push(fragment);
    }

    pub fn fragments(&self) -> &[SourceFragment] {
        &self.fragments
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}
