use chrono::{DateTime, Utc};
use reqwest::Url;
use rocket::serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub const MIN_REFRESH_INTERVAL_SECS: u32 = 5;
pub const MAX_REFRESH_INTERVAL_SECS: u32 = 86_400;
pub const DEFAULT_REFRESH_INTERVAL_SECS: u32 = 30;

/// Runtime identity of a monitored service. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceId(Uuid);

impl ServiceId {
    pub fn new() -> Self {
        ServiceId(Uuid::new_v4())
    }
}

impl Default for ServiceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ServiceId {
    type Err = uuid::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(raw).map(ServiceId)
    }
}

/// Normalized severity. Declaration order is display priority: worst first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusLevel {
    MajorDisruption,
    ConnectionError,
    ParseError,
    Degraded,
    PlannedMaintenance,
    Unknown,
    Operational,
}

impl StatusLevel {
    pub fn priority(self) -> u8 {
        match self {
            StatusLevel::MajorDisruption => 0,
            StatusLevel::ConnectionError => 1,
            StatusLevel::ParseError => 2,
            StatusLevel::Degraded => 3,
            StatusLevel::PlannedMaintenance => 4,
            StatusLevel::Unknown => 5,
            StatusLevel::Operational => 6,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            StatusLevel::MajorDisruption => "Major Disruption",
            StatusLevel::ConnectionError => "Connection Error",
            StatusLevel::ParseError => "Parse Error",
            StatusLevel::Degraded => "Degraded Performance",
            StatusLevel::PlannedMaintenance => "Planned Maintenance",
            StatusLevel::Unknown => "Unknown",
            StatusLevel::Operational => "Operational",
        }
    }
}

impl fmt::Display for StatusLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentUpdate {
    pub body: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// An incident as reported by a status page. `resolved_at` of `None` means ongoing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub title: String,
    pub status: String,
    pub impact: String,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub updates: Vec<IncidentUpdate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Maintenance {
    pub id: String,
    pub title: String,
    pub status: String,
    pub impact: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub updates: Vec<IncidentUpdate>,
}

/// User-authored service entry, persisted in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub url: String,
    #[serde(rename = "refresh_interval", default)]
    pub refresh_interval_secs: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub current_status: String,
}

impl ServiceConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>, refresh_interval_secs: u32) -> Self {
        ServiceConfig {
            name: name.into(),
            url: url.into(),
            refresh_interval_secs,
            last_checked: None,
            current_status: String::new(),
        }
    }

    /// Checks user input. An interval of zero is accepted and means "use the default".
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name cannot be empty".to_string());
        }
        let raw = self.url.trim();
        if raw.is_empty() {
            return Err("URL cannot be empty".to_string());
        }
        let parsed = Url::parse(raw).map_err(|err| format!("invalid URL: {err}"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err("URL must start with http:// or https://".to_string());
        }
        if parsed.host_str().is_none_or(str::is_empty) {
            return Err("URL must include a host".to_string());
        }
        let interval = self.refresh_interval_secs;
        if interval != 0 && !is_valid_interval(interval) {
            return Err(format!(
                "interval must be between {MIN_REFRESH_INTERVAL_SECS} and {MAX_REFRESH_INTERVAL_SECS} seconds"
            ));
        }
        Ok(())
    }
}

pub fn is_valid_interval(secs: u32) -> bool {
    (MIN_REFRESH_INTERVAL_SECS..=MAX_REFRESH_INTERVAL_SECS).contains(&secs)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(rename = "default_refresh_interval")]
    pub default_refresh_interval_secs: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            default_refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
        }
    }
}

/// The whole persisted document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
    #[serde(default)]
    pub settings: Settings,
}

/// Derived per-service state. Rebuilt at start-up, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceRuntime {
    pub status_level: StatusLevel,
    pub next_refresh_at: DateTime<Utc>,
    pub in_flight: bool,
    pub incidents: Vec<Incident>,
    pub maintenances: Vec<Maintenance>,
    pub parse_note: String,
    pub last_error: String,
}

impl ServiceRuntime {
    pub fn fresh(now: DateTime<Utc>) -> Self {
        ServiceRuntime {
            status_level: StatusLevel::Unknown,
            next_refresh_at: now,
            in_flight: false,
            incidents: Vec::new(),
            maintenances: Vec::new(),
            parse_note: String::new(),
            last_error: String::new(),
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.in_flight && now >= self.next_refresh_at
    }
}

/// Copy of one service handed to readers.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceSnapshot {
    pub id: ServiceId,
    pub config: ServiceConfig,
    #[serde(flatten)]
    pub runtime: ServiceRuntime,
}

/// Stable sort by display priority, worst first.
pub fn sort_worst_first(services: &mut [ServiceSnapshot]) {
    services.sort_by_key(|svc| svc.runtime.status_level.priority());
}

/// Classified output of one fetch. Never an error: failures are levels.
#[derive(Debug, Clone, Serialize)]
pub struct FetchOutcome {
    pub level: StatusLevel,
    pub label: String,
    pub checked_at: DateTime<Utc>,
    pub incidents: Vec<Incident>,
    pub maintenances: Vec<Maintenance>,
    pub source_url: String,
    pub parse_note: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FetchOutcome {
    pub fn failure(level: StatusLevel, source_url: &str, note: String, error: String) -> Self {
        FetchOutcome {
            level,
            label: level.label().to_string(),
            checked_at: Utc::now(),
            incidents: Vec::new(),
            maintenances: Vec::new(),
            source_url: source_url.to_string(),
            parse_note: note,
            error: Some(error),
        }
    }
}
