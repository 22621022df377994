//! Statuspage-style `summary.json` documents.

use super::Classification;
use crate::models::{Incident, IncidentUpdate, Maintenance, StatusLevel};
use chrono::{DateTime, Utc};
use rocket::serde::{Deserialize, Deserializer};

#[derive(Debug, Deserialize)]
struct Summary {
    status: SummaryStatus,
    #[serde(default, deserialize_with = "null_as_empty")]
    incidents: Vec<WireIncident>,
    #[serde(default, deserialize_with = "null_as_empty")]
    scheduled_maintenances: Vec<WireMaintenance>,
}

/// Lists may be sent as `null`; read that as empty.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Deserialize)]
struct SummaryStatus {
    #[serde(default)]
    indicator: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUpdate {
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct WireIncident {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    impact: Option<String>,
    #[serde(default)]
    started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_empty")]
    incident_updates: Vec<WireUpdate>,
}

#[derive(Debug, Deserialize)]
struct WireMaintenance {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    impact: Option<String>,
    #[serde(default)]
    scheduled_for: Option<DateTime<Utc>>,
    #[serde(default)]
    scheduled_until: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_empty")]
    incident_updates: Vec<WireUpdate>,
}

fn convert_updates(updates: Vec<WireUpdate>, now: DateTime<Utc>) -> Vec<IncidentUpdate> {
    updates
        .into_iter()
        .map(|update| IncidentUpdate {
            body: update.body.unwrap_or_default(),
            status: update.status.unwrap_or_default(),
            created_at: update.created_at.unwrap_or(now),
        })
        .collect()
}

impl WireIncident {
    fn into_incident(self, now: DateTime<Utc>) -> Incident {
        let updates = convert_updates(self.incident_updates, now);
        let oldest = updates.iter().map(|update| update.created_at).min();
        let newest = updates.iter().map(|update| update.created_at).max();
        let started_at = oldest
            .or(self.started_at)
            .or(self.created_at)
            .unwrap_or(now);
        let updated_at = newest.or(self.updated_at).unwrap_or(started_at);
        let status = self.status.unwrap_or_default();
        let resolved_at = matches!(status.to_lowercase().as_str(), "resolved" | "completed")
            .then_some(updated_at);

        Incident {
            id: self.id.unwrap_or_default(),
            title: self.name.unwrap_or_default(),
            status,
            impact: self.impact.unwrap_or_default(),
            started_at,
            updated_at,
            resolved_at,
            updates,
        }
    }
}

impl WireMaintenance {
    fn into_maintenance(self, now: DateTime<Utc>) -> Maintenance {
        let start_at = self.scheduled_for.unwrap_or(now);
        Maintenance {
            id: self.id.unwrap_or_default(),
            title: self.name.unwrap_or_default(),
            status: self.status.unwrap_or_default(),
            impact: self.impact.unwrap_or_default(),
            start_at,
            end_at: self.scheduled_until.unwrap_or(start_at),
            updates: convert_updates(self.incident_updates, now),
        }
    }
}

/// A maintenance that still matters: not completed and not yet over.
fn is_pending(maintenance: &Maintenance, now: DateTime<Utc>) -> bool {
    !maintenance.status.eq_ignore_ascii_case("completed") && maintenance.end_at > now
}

pub fn classify(body: &[u8], now: DateTime<Utc>) -> Result<Classification, serde_json::Error> {
    let summary: Summary = serde_json::from_slice(body)?;
    let incidents: Vec<Incident> = summary
        .incidents
        .into_iter()
        .map(|incident| incident.into_incident(now))
        .collect();
    let maintenances: Vec<Maintenance> = summary
        .scheduled_maintenances
        .into_iter()
        .map(|maintenance| maintenance.into_maintenance(now))
        .collect();

    let indicator = summary.status.indicator.unwrap_or_default().to_lowercase();
    let description = summary.status.description.unwrap_or_default();
    let level = match indicator.as_str() {
        "none" => StatusLevel::Operational,
        "minor" => StatusLevel::Degraded,
        "major" | "critical" => StatusLevel::MajorDisruption,
        "maintenance" => StatusLevel::PlannedMaintenance,
        _ => StatusLevel::Unknown,
    };
    let mut label = match level {
        StatusLevel::Operational => "All Systems Operational".to_string(),
        _ if description.is_empty() => level.label().to_string(),
        _ => description,
    };

    let mut level = level;
    if level == StatusLevel::Operational
        && maintenances.iter().any(|maintenance| is_pending(maintenance, now))
    {
        level = StatusLevel::PlannedMaintenance;
        label = "Scheduled Maintenance".to_string();
    }

    Ok(Classification {
        level,
        label,
        incidents,
        maintenances,
        note: "Parsed Statuspage JSON API".to_string(),
    })
}
