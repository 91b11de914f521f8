// Conflict ledger: requirement statement extraction, conflict identity,
// and de-duplication across regenerations

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::document::DocumentStore;
use crate::error::EngineError;
use crate::models::section::{Section, SectionId};
use crate::models::{Citation, Conflict, ConflictSeverity};

/// A requirement-like statement pulled out of section content, tagged with
/// the citation it is attributed to
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub section: SectionId,
    pub text: String,
    pub source_ref: Citation,
}

/// A contradictory pairing flagged by the comparison backend. Indices point
/// into the two statement slices handed to `compare`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlaggedPair {
    pub index_a: usize,
    pub index_b: usize,
    pub severity: ConflictSeverity,
}

/// Pluggable semantic comparison capability. The ledger owns storage,
/// identity, and de-duplication; deciding that two statements actually
/// contradict each other is the analyzer's job.
pub trait ConflictAnalyzer: Send + Sync {
    /// Compares fresh statements (`statements_a`) against statements already
    /// present elsewhere in the document (`statements_b`)
    fn compare(&self, statements_a: &[Statement], statements_b: &[Statement]) -> Vec<FlaggedPair>;
}

/// Analyzer that never flags anything. Useful when conflict tracking is
/// wired up but no comparison backend is available.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopConflictAnalyzer;

impl ConflictAnalyzer for NoopConflictAnalyzer {
    fn compare(&self, _statements_a: &[Statement], _statements_b: &[Statement]) -> Vec<FlaggedPair> {
        Vec::new()
    }
}

static REQUIREMENT_PATTERN: OnceLock<Regex> = OnceLock::new();

fn requirement_pattern() -> &'static Regex {
    REQUIREMENT_PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)\b(must|shall|should|cannot|may not|require[sd]?|limit(?:ed)?(?:\s+to)?|support[s]?|at least|at most|no more than|only|fr-\d+)\b",
        )
        .unwrap()
    })
}

/// Splits section content into sentences and keeps the ones that read like
/// requirements. The nth extracted statement is attributed to the section's
/// nth citation, falling back to the first citation, then to a synthetic
/// reference at the section itself for uncited manual content.
pub fn extract_statements(section: &Section) -> Vec<Statement> {
    let mut statements = Vec::new();
    for raw in section
        .content
        .split(|c: char| matches!(c, '.' | ';' | '\n'))
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        if requirement_pattern().is_match(raw) {
            let source_ref = statement_ref(section, statements.len());
            statements.push(Statement {
                section: section.id,
                text: raw.to_string(),
                source_ref,
            });
        }
    }
    statements
}

fn statement_ref(section: &Section, index: usize) -> Citation {
    section
        .citations
        .get(index)
        .or_else(|| section.citations.first())
        .cloned()
        .unwrap_or_else(|| Citation::new("section", section.id.as_str()))
}

// Unordered pair of citation addresses identifying one logical conflict
type PairingKey = ((String, String), (String, String));

fn pairing_key(a: &Citation, b: &Citation) -> PairingKey {
    let a = a.address();
    let b = b.address();
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Filter for [ConflictLedger::list]. The default keeps everything; the
/// severity filter matches exactly.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictFilter {
    pub only_unresolved: bool,
    pub severity: Option<ConflictSeverity>,
}

/// Append-only record of detected conflicts for one session. Conflicts are
/// never deleted and `resolved` never flips back to false; a statement
/// pairing that was flagged once is never recorded a second time, so a
/// resolved conflict stays resolved across regenerations.
#[derive(Debug, Clone, Default)]
pub struct ConflictLedger {
    conflicts: Vec<Conflict>,
    seen_pairings: HashSet<PairingKey>,
}

impl ConflictLedger {
    pub fn new() -> Self {
        ConflictLedger::default()
    }

    /// Rebuilds the ledger (including the pairing index) from persisted
    /// conflicts
    pub fn from_conflicts(conflicts: Vec<Conflict>) -> Self {
        let seen_pairings = conflicts
            .iter()
            .map(|c| pairing_key(&c.source_ref_a, &c.source_ref_b))
            .collect();
        ConflictLedger {
            conflicts,
            seen_pairings,
        }
    }

    pub fn conflicts(&self) -> &[Conflict] {
        &self.conflicts
    }

    pub fn len(&self) -> usize {
        self.conflicts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn unresolved_count(&self) -> usize {
        self.conflicts.iter().filter(|c| !c.resolved).count()
    }

    pub fn get(&self, id: &str) -> Option<&Conflict> {
        self.conflicts.iter().find(|c| c.id == id)
    }

    /// Runs detection for a section whose content just changed: extracts its
    /// requirement statements, compares them against every other section's
    /// statements, and records whatever the analyzer flags. Pairings already
    /// on the ledger are skipped. Returns only the newly recorded conflicts.
    pub fn detect(
        &mut self,
        section_id: SectionId,
        document: &DocumentStore,
        analyzer: &dyn ConflictAnalyzer,
    ) -> Vec<Conflict> {
        let new_statements = extract_statements(document.section(section_id));
        if new_statements.is_empty() {
            return Vec::new();
        }

        let mut existing = Vec::new();
        for section in document.sections() {
            if section.id == section_id {
                continue;
            }
            existing.extend(extract_statements(section));
        }
        if existing.is_empty() {
            return Vec::new();
        }

        let mut recorded = Vec::new();
        for pair in analyzer.compare(&new_statements, &existing) {
            let (a, b) = match (new_statements.get(pair.index_a), existing.get(pair.index_b)) {
                (Some(a), Some(b)) => (a, b),
                _ => {
                    log::warn!(
                        "Analyzer flagged out-of-range statement pair ({}, {}); ignoring",
                        pair.index_a,
                        pair.index_b
                    );
                    continue;
                }
            };

            let key = pairing_key(&a.source_ref, &b.source_ref);
            if self.seen_pairings.contains(&key) {
                log::debug!(
                    "Conflict pairing {}#{} / {}#{} already on the ledger; skipping",
                    a.source_ref.source_id,
                    a.source_ref.locator,
                    b.source_ref.source_id,
                    b.source_ref.locator
                );
                continue;
            }
            self.seen_pairings.insert(key);

            let conflict = Conflict::new(
                a.text.clone(),
                b.text.clone(),
                a.source_ref.clone(),
                b.source_ref.clone(),
                pair.severity,
            );
            log::info!(
                "Detected {} conflict {} between '{}' and '{}'",
                conflict.severity,
                conflict.id,
                section_id,
                b.section
            );
            self.conflicts.push(conflict.clone());
            recorded.push(conflict);
        }
        recorded
    }

    /// Marks a conflict resolved. Resolving an already-resolved conflict is
    /// a no-op; unknown ids fail with NotFound.
    pub fn resolve(&mut self, id: &str) -> Result<(), EngineError> {
        let conflict = self
            .conflicts
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| EngineError::ConflictNotFound(id.to_string()))?;
        if !conflict.resolved {
            conflict.resolved = true;
            log::info!("Conflict {} resolved", id);
        }
        Ok(())
    }

    /// Conflicts in detection order, restartable and lazily filtered
    pub fn iter_filtered(&self, filter: ConflictFilter) -> impl Iterator<Item = &Conflict> + '_ {
        self.conflicts.iter().filter(move |c| {
            if filter.only_unresolved && c.resolved {
                return false;
            }
            if let Some(severity) = filter.severity {
                if c.severity != severity {
                    return false;
                }
            }
            true
        })
    }

    pub fn list(&self, filter: ConflictFilter) -> Vec<Conflict> {
        self.iter_filtered(filter).cloned().collect()
    }
}
