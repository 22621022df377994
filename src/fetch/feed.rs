//! RSS/Atom incident feeds.
//!
//! The current level comes from the newest item alone. Older items only feed
//! the incident history.

use super::{Classification, mentions};
use crate::models::{Incident, Maintenance, StatusLevel};
use chrono::{DateTime, Duration, Utc};
use rocket::serde::Deserialize;
use thiserror::Error;

const RESOLVED_WORDS: &[&str] = &["resolved", "operating normally"];
const MAJOR_WORDS: &[&str] = &["major", "outage", "disruption"];
const DEGRADED_WORDS: &[&str] = &["degraded", "degradation", "impact", "latenc", "error"];
const MAINTENANCE_WORDS: &[&str] = &["maintenance", "scheduled"];
const HISTORY_DAYS: i64 = 7;
const MAINTENANCE_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("failed to parse as RSS or Atom feed")]
    NoEntries,
}

#[derive(Debug, Default, Deserialize)]
struct TextNode {
    #[serde(rename = "$text", default)]
    value: String,
}

fn text(node: Option<TextNode>) -> String {
    node.map(|node| node.value.trim().to_string())
        .unwrap_or_default()
}

#[derive(Debug, Deserialize)]
struct RssDocument {
    channel: RssChannel,
}

#[derive(Debug, Deserialize)]
struct RssChannel {
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<TextNode>,
    description: Option<TextNode>,
    link: Option<TextNode>,
    #[serde(rename = "pubDate")]
    pub_date: Option<TextNode>,
}

#[derive(Debug, Deserialize)]
struct AtomDocument {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<TextNode>,
    summary: Option<TextNode>,
    content: Option<TextNode>,
    updated: Option<TextNode>,
    published: Option<TextNode>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href", default)]
    href: String,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

/// One feed entry normalized to the RSS item shape.
#[derive(Debug, Clone, PartialEq)]
struct FeedItem {
    title: String,
    description: String,
    link: String,
    published: String,
}

impl From<RssItem> for FeedItem {
    fn from(item: RssItem) -> Self {
        FeedItem {
            title: text(item.title),
            description: text(item.description),
            link: text(item.link),
            published: text(item.pub_date),
        }
    }
}

impl From<AtomEntry> for FeedItem {
    fn from(entry: AtomEntry) -> Self {
        let link = entry
            .links
            .iter()
            .find(|link| link.rel.as_deref().is_none_or(|rel| rel == "alternate"))
            .or(entry.links.first())
            .map(|link| link.href.clone())
            .unwrap_or_default();
        let summary = text(entry.summary);
        FeedItem {
            title: text(entry.title),
            description: if summary.is_empty() {
                text(entry.content)
            } else {
                summary
            },
            link,
            published: match text(entry.updated) {
                updated if updated.is_empty() => text(entry.published),
                updated => updated,
            },
        }
    }
}

/// Parses `body` as RSS, then as Atom, and classifies the result.
pub fn classify(body: &[u8], now: DateTime<Utc>) -> Result<Classification, FeedError> {
    let raw = String::from_utf8_lossy(body);

    if let Ok(rss) = quick_xml::de::from_str::<RssDocument>(&raw)
        && !rss.channel.items.is_empty()
    {
        let items: Vec<FeedItem> = rss.channel.items.into_iter().map(FeedItem::from).collect();
        return Ok(classify_items(&items, now, "Parsed RSS feed"));
    }

    if let Ok(atom) = quick_xml::de::from_str::<AtomDocument>(&raw)
        && let Some(entry) = atom.entries.into_iter().next()
    {
        let items = [FeedItem::from(entry)];
        return Ok(classify_items(&items, now, "Parsed Atom feed"));
    }

    Err(FeedError::NoEntries)
}

/// `items` must be newest first and non-empty.
fn classify_items(items: &[FeedItem], now: DateTime<Utc>, note: &str) -> Classification {
    let Some(latest) = items.first() else {
        return Classification {
            level: StatusLevel::Unknown,
            label: "No feed items found".to_string(),
            incidents: Vec::new(),
            maintenances: Vec::new(),
            note: note.to_string(),
        };
    };

    let latest_text = format!("{} {}", latest.title, latest.description).to_lowercase();
    let level = if mentions(&latest_text, RESOLVED_WORDS) {
        StatusLevel::Operational
    } else if mentions(&latest_text, MAJOR_WORDS) {
        StatusLevel::MajorDisruption
    } else if mentions(&latest_text, DEGRADED_WORDS) {
        StatusLevel::Degraded
    } else if mentions(&latest_text, MAINTENANCE_WORDS) {
        StatusLevel::PlannedMaintenance
    } else {
        StatusLevel::Operational
    };
    let label = match level {
        StatusLevel::Operational => "All Systems Operational".to_string(),
        _ => latest.title.clone(),
    };

    let maintenances = if level == StatusLevel::PlannedMaintenance {
        let start_at = parse_published(&latest.published).unwrap_or(now);
        vec![Maintenance {
            id: latest.link.clone(),
            title: latest.title.clone(),
            status: "scheduled".to_string(),
            impact: "maintenance".to_string(),
            start_at,
            end_at: start_at + Duration::hours(MAINTENANCE_WINDOW_HOURS),
            updates: Vec::new(),
        }]
    } else {
        Vec::new()
    };

    Classification {
        level,
        label,
        incidents: recent_incidents(items, now),
        maintenances,
        note: note.to_string(),
    }
}

fn recent_incidents(items: &[FeedItem], now: DateTime<Utc>) -> Vec<Incident> {
    let cutoff = now - Duration::days(HISTORY_DAYS);
    let mut incidents = Vec::new();

    for item in items {
        let published = parse_published(&item.published).unwrap_or(now);
        if published < cutoff {
            continue;
        }

        let combined = format!("{} {}", item.title, item.description).to_lowercase();
        if mentions(&combined, MAINTENANCE_WORDS) {
            continue;
        }

        let resolved = mentions(&combined, RESOLVED_WORDS);
        let impact = if mentions(&combined, MAJOR_WORDS) {
            "major"
        } else if mentions(&combined, DEGRADED_WORDS) || resolved {
            "minor"
        } else {
            continue;
        };

        incidents.push(Incident {
            id: item.link.clone(),
            title: item.title.clone(),
            status: if resolved { "resolved" } else { "investigating" }.to_string(),
            impact: impact.to_string(),
            started_at: published,
            updated_at: published,
            resolved_at: resolved.then_some(published),
            updates: Vec::new(),
        });
    }

    incidents
}

/// RFC 2822 dates (with named zones such as `PDT`), falling back to RFC 3339.
fn parse_published(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|date| date.with_timezone(&Utc))
        .ok()
}
