// Markdown rendering of a session's BRD

use crate::models::{Citation, Section, Session};
use crate::state::SessionState;

/// Renders the full BRD as Markdown: metadata header, every section in
/// template order, numbered source footnotes per section, and an appendix
/// of unresolved conflicts.
pub fn render_markdown(session: &Session, state: &SessionState) -> String {
    let mut md = String::new();

    md.push_str(&format!("# {}\n\n", session.name));
    if !session.description.is_empty() {
        md.push_str(&format!("{}\n\n", session.description));
    }
    md.push_str(&format!("**Status:** {}\n\n", session.status));

    for section in state.document.sections() {
        md.push_str(&format!("## {}\n\n", section.title));
        if section.has_content() {
            md.push_str(&format!("{}\n\n", section.content));
        } else {
            md.push_str("_Not yet drafted._\n\n");
        }
        push_citations(&mut md, section);
    }

    // Appendix only when something is still open
    let open: Vec<_> = state
        .conflicts
        .conflicts()
        .iter()
        .filter(|c| !c.resolved)
        .collect();
    if !open.is_empty() {
        md.push_str("## Unresolved Conflicts\n\n");
        for conflict in open {
            md.push_str(&format!(
                "- **{}**: \"{}\" ({}) vs \"{}\" ({})\n",
                conflict.severity,
                conflict.statement_a,
                cite(&conflict.source_ref_a),
                conflict.statement_b,
                cite(&conflict.source_ref_b),
            ));
        }
        md.push('\n');
    }

    md
}

fn push_citations(md: &mut String, section: &Section) {
    if section.citations.is_empty() {
        return;
    }
    md.push_str("**Sources:**\n");
    for (i, citation) in section.citations.iter().enumerate() {
        match &citation.snippet {
            Some(snippet) => {
                md.push_str(&format!("{}. {}: \"{}\"\n", i + 1, cite(citation), snippet))
            }
            None => md.push_str(&format!("{}. {}\n", i + 1, cite(citation))),
        }
    }
    md.push('\n');
}

fn cite(citation: &Citation) -> String {
    format!("{}#{}", citation.source_id, citation.locator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConflictSeverity, SectionId};

    fn sample() -> (Session, SessionState) {
        let session = Session::new("Alpha", "Portal redesign");
        let mut state = SessionState::new(false);
        state
            .document
            .update_content(SectionId::ExecSummary, "Modernize the portal.")
            .unwrap();
        state
            .document
            .append_citation(
                SectionId::ExecSummary,
                Citation::new("slack-1", "msg-42").with_snippet("we should modernize"),
            )
            .unwrap();
        (session, state)
    }

    #[test]
    fn test_sections_render_in_template_order() {
        let (session, state) = sample();
        let md = render_markdown(&session, &state);

        let exec = md.find("## Executive Summary").unwrap();
        let objectives = md.find("## Business Objectives").unwrap();
        let timeline = md.find("## Timeline & Milestones").unwrap();
        assert!(exec < objectives && objectives < timeline);
        assert!(md.starts_with("# Alpha\n"));
        assert!(md.contains("**Status:** draft"));
    }

    #[test]
    fn test_empty_sections_get_placeholder() {
        let (session, state) = sample();
        let md = render_markdown(&session, &state);

        assert!(md.contains("Modernize the portal."));
        // Seven untouched sections, seven placeholders
        assert_eq!(md.matches("_Not yet drafted._").count(), 7);
    }

    #[test]
    fn test_citations_render_numbered_with_snippet() {
        let (session, mut state) = sample();
        state
            .document
            .append_citation(SectionId::ExecSummary, Citation::new("kickoff.pdf", "p3"))
            .unwrap();
        let md = render_markdown(&session, &state);

        assert!(md.contains("1. slack-1#msg-42: \"we should modernize\""));
        assert!(md.contains("2. kickoff.pdf#p3"));
        // Only the exec summary has sources
        assert_eq!(md.matches("**Sources:**").count(), 1);
    }

    #[test]
    fn test_unresolved_conflicts_appendix() {
        let (session, mut state) = sample();
        let md = render_markdown(&session, &state);
        assert!(!md.contains("## Unresolved Conflicts"));

        let conflict = crate::models::Conflict::new(
            "support 100 concurrent users",
            "limit to 50 users for beta",
            Citation::new("slack-1", "msg-42"),
            Citation::new("email-7", "p2"),
            ConflictSeverity::Medium,
        );
        state.conflicts = crate::conflicts::ConflictLedger::from_conflicts(vec![conflict]);

        let md = render_markdown(&session, &state);
        assert!(md.contains("## Unresolved Conflicts"));
        assert!(md.contains("- **medium**: \"support 100 concurrent users\" (slack-1#msg-42) vs \"limit to 50 users for beta\" (email-7#p2)"));
    }
}
