//! Terminal presentation of conversation snapshots.

use colored::Colorize;

use crate::models::{Author, ConversationTurn, EvidenceBundle, LocationState};
use crate::persona::LOCATION_HINT;

pub fn render_turn(turn: &ConversationTurn) -> String {
    let time = turn.created_at.format("%H:%M");
    let header = match turn.author {
        Author::User => format!("You · {time}").green().bold(),
        Author::Assistant => format!("EarthGuard · {time}").cyan().bold(),
    };

    let mut out = format!("{header}\n{}\n", turn.text);
    if turn.author == Author::Assistant {
        if let Some(evidence) = &turn.evidence {
            out.push_str(&render_evidence(evidence));
        }
    }
    out
}

pub fn render_evidence(evidence: &EvidenceBundle) -> String {
    let mut out = String::new();

    if !evidence.map_results.is_empty() {
        out.push_str(&format!("{}\n", "LOCATIONS FOUND".dimmed().bold()));
        for place in &evidence.map_results {
            out.push_str(&format!(
                "  {} {}\n     Open in Maps: {}\n",
                "📍".red(),
                place.title.bold(),
                place.uri.underline()
            ));
        }
    }

    if !evidence.web_citations.is_empty() {
        let links: Vec<String> = evidence
            .web_citations
            .iter()
            .map(|c| format!("{} <{}>", c.title, c.uri))
            .collect();
        out.push_str(&format!("{} {}\n", "Sources:".dimmed(), links.join(", ")));
    }

    out
}

/// Hint shown while answers cannot carry map grounding, with the failure reason if any.
pub fn render_location_hint(location: &LocationState) -> String {
    let detail = match location.error() {
        Some(err) => format!(" ({err})"),
        None => String::new(),
    };
    format!("⚠ {LOCATION_HINT}{detail}").yellow().to_string()
}

pub fn render_status(summary: &str) -> String {
    format!("{}\n{}\n", "CURRENT STATUS".blue().bold(), summary)
}
