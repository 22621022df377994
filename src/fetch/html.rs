//! Last-resort keyword scan over a page's visible text.

use super::{Classification, mentions};
use crate::models::StatusLevel;
use scraper::{ElementRef, Html};

pub const NO_KEYWORDS_NOTE: &str = "Could not find status keywords in HTML";

const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Ordered rules; the first match wins.
const RULES: &[(StatusLevel, &str, &[&str])] = &[
    (
        StatusLevel::MajorDisruption,
        "Major Disruption Detected",
        &["major outage", "major disruption"],
    ),
    (
        StatusLevel::Degraded,
        "Degraded Performance Detected",
        &["partial outage", "degraded"],
    ),
    (
        StatusLevel::PlannedMaintenance,
        "Maintenance Detected",
        &["maintenance", "scheduled"],
    ),
];

pub fn classify(body: &str) -> Classification {
    let text = visible_text(body).to_lowercase();

    let all_clear = text.contains("all systems operational")
        || (text.contains("operational") && !text.contains("not operational"));
    let matched = if all_clear {
        Some((StatusLevel::Operational, "All Systems Operational"))
    } else {
        RULES
            .iter()
            .find(|(_, _, words)| mentions(&text, words))
            .map(|(level, label, _)| (*level, *label))
    };

    match matched {
        Some((level, label)) => Classification {
            level,
            label: label.to_string(),
            incidents: Vec::new(),
            maintenances: Vec::new(),
            note: "Parsed HTML fallback".to_string(),
        },
        None => Classification {
            level: StatusLevel::ParseError,
            label: "Unable to determine status".to_string(),
            incidents: Vec::new(),
            maintenances: Vec::new(),
            note: NO_KEYWORDS_NOTE.to_string(),
        },
    }
}

/// Depth-first concatenation of text nodes, siblings separated by a space.
fn visible_text(body: &str) -> String {
    let document = Html::parse_document(body);
    let mut out = String::new();
    collect_text(document.root_element(), &mut out);
    out
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    if HIDDEN_ELEMENTS.contains(&element.value().name()) {
        return;
    }
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
            out.push(' ');
        } else if let Some(child) = ElementRef::wrap(child) {
            collect_text(child, out);
            out.push(' ');
        }
    }
}
