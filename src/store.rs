use crate::error::StoreError;
use crate::models::{
    ConfigFile, FetchOutcome, Incident, Maintenance, ServiceConfig, ServiceId, ServiceRuntime,
    ServiceSnapshot, Settings, StatusLevel,
};
use crate::storage::Storage;
use chrono::{DateTime, Duration, Utc};
use std::sync::{Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

/// Owner of the monitored service list.
///
/// Reads take the shared lock, mutations the exclusive one. The lock is only
/// held for in-memory field updates, never across network I/O.
#[derive(Debug)]
pub struct ServiceStore {
    inner: RwLock<StoreInner>,
    storage: Storage,
    save_lock: Mutex<()>,
}

#[derive(Debug)]
struct StoreInner {
    settings: Settings,
    entries: Vec<ServiceEntry>,
}

/// Config and runtime state of one service, kept together so they can never
/// drift out of step.
#[derive(Debug, Clone)]
struct ServiceEntry {
    id: ServiceId,
    config: ServiceConfig,
    runtime: ServiceRuntime,
}

impl ServiceEntry {
    fn snapshot(&self) -> ServiceSnapshot {
        ServiceSnapshot {
            id: self.id,
            config: self.config.clone(),
            runtime: self.runtime.clone(),
        }
    }

    fn claim(&mut self) -> DueService {
        self.runtime.in_flight = true;
        DueService {
            id: self.id,
            name: self.config.name.clone(),
            url: self.config.url.clone(),
        }
    }

    fn record(&mut self, update: StatusUpdate, default_interval: u32) {
        let now = Utc::now();
        let interval = match self.config.refresh_interval_secs {
            0 => default_interval,
            secs => secs,
        };

        self.runtime.status_level = update.level;
        self.runtime.incidents = update.incidents;
        self.runtime.maintenances = update.maintenances;
        self.runtime.parse_note = update.parse_note;
        self.runtime.last_error = update.error;
        self.runtime.in_flight = false;
        self.runtime.next_refresh_at = now + Duration::seconds(i64::from(interval));
        self.config.last_checked = Some(now);
        self.config.current_status = update.level.label().to_string();
        debug!(
            "{} is {} (next check in {interval}s)",
            self.config.name, update.level
        );
    }
}

/// A service that has been marked in flight and should be fetched now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueService {
    pub id: ServiceId,
    pub name: String,
    pub url: String,
}

/// What [`ServiceStore::complete`] did with a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Recorded,
    Stale,
}

/// Result of a fetch, as applied to a service.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub level: StatusLevel,
    pub incidents: Vec<Incident>,
    pub maintenances: Vec<Maintenance>,
    pub parse_note: String,
    pub error: String,
}

impl From<FetchOutcome> for StatusUpdate {
    fn from(outcome: FetchOutcome) -> Self {
        StatusUpdate {
            level: outcome.level,
            incidents: outcome.incidents,
            maintenances: outcome.maintenances,
            parse_note: outcome.parse_note,
            error: outcome.error.unwrap_or_default(),
        }
    }
}

impl ServiceStore {
    /// Loads the config file and rebuilds runtime state. Every service starts
    /// `Unknown` and due immediately.
    pub fn open(storage: Storage) -> Result<Self, StoreError> {
        let file = storage.load()?;
        info!(
            "Loaded {} services from {}",
            file.services.len(),
            storage.path().display()
        );
        Ok(Self::from_config(storage, file))
    }

    pub fn from_config(storage: Storage, file: ConfigFile) -> Self {
        let now = Utc::now();
        let entries = file
            .services
            .into_iter()
            .map(|config| ServiceEntry {
                id: ServiceId::new(),
                config,
                runtime: ServiceRuntime::fresh(now),
            })
            .collect();

        ServiceStore {
            inner: RwLock::new(StoreInner {
                settings: file.settings,
                entries,
            }),
            storage,
            save_lock: Mutex::new(()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of every service in insertion order.
    pub fn list(&self) -> Vec<ServiceSnapshot> {
        self.read().entries.iter().map(ServiceEntry::snapshot).collect()
    }

    pub fn get(&self, id: ServiceId) -> Option<ServiceSnapshot> {
        self.read()
            .entries
            .iter()
            .find(|entry| entry.id == id)
            .map(ServiceEntry::snapshot)
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn default_interval(&self) -> u32 {
        self.read().settings.default_refresh_interval_secs
    }

    pub fn next_refresh_at(&self, id: ServiceId) -> Result<DateTime<Utc>, StoreError> {
        let inner = self.read();
        let entry = find(&inner.entries, id)?;
        Ok(inner.entries[entry].runtime.next_refresh_at)
    }

    /// Resolves a display position to the service's id.
    pub fn id_at(&self, index: usize) -> Result<ServiceId, StoreError> {
        self.read()
            .entries
            .get(index)
            .map(|entry| entry.id)
            .ok_or(StoreError::IndexOutOfRange(index))
    }

    pub fn position(&self, id: ServiceId) -> Option<usize> {
        self.read().entries.iter().position(|entry| entry.id == id)
    }

    /// Appends a service. An interval of zero takes the global default.
    pub fn add(&self, config: ServiceConfig) -> Result<ServiceId, StoreError> {
        config.validate().map_err(StoreError::Validation)?;
        let mut inner = self.write();
        let config = normalize(config, inner.settings.default_refresh_interval_secs);
        let id = ServiceId::new();
        info!("Adding service {} ({})", config.name, config.url);
        inner.entries.push(ServiceEntry {
            id,
            config,
            runtime: ServiceRuntime::fresh(Utc::now()),
        });
        Ok(id)
    }

    /// Replaces a service's config in place. Runtime state and schedule are
    /// untouched; callers that want a refresh must ask for one.
    pub fn update(&self, id: ServiceId, config: ServiceConfig) -> Result<(), StoreError> {
        config.validate().map_err(StoreError::Validation)?;
        let mut inner = self.write();
        let default_interval = inner.settings.default_refresh_interval_secs;
        let index = find(&inner.entries, id)?;
        let entry = &mut inner.entries[index];
        let mut config = normalize(config, default_interval);
        config.last_checked = entry.config.last_checked;
        config.current_status = std::mem::take(&mut entry.config.current_status);
        entry.config = config;
        Ok(())
    }

    /// Removes a service. Later services shift down one position.
    pub fn remove(&self, id: ServiceId) -> Result<ServiceConfig, StoreError> {
        let mut inner = self.write();
        let index = find(&inner.entries, id)?;
        let entry = inner.entries.remove(index);
        info!("Removed service {}", entry.config.name);
        Ok(entry.config)
    }

    pub fn set_in_flight(&self, id: ServiceId, in_flight: bool) -> Result<(), StoreError> {
        let mut inner = self.write();
        let index = find(&inner.entries, id)?;
        inner.entries[index].runtime.in_flight = in_flight;
        Ok(())
    }

    /// Applies a fetch result: sets all runtime fields, clears the in-flight
    /// guard, stamps `last_checked` and schedules the next check.
    pub fn update_status(&self, id: ServiceId, update: StatusUpdate) -> Result<(), StoreError> {
        let mut inner = self.write();
        let default_interval = inner.settings.default_refresh_interval_secs;
        let index = find(&inner.entries, id)?;
        inner.entries[index].record(update, default_interval);
        Ok(())
    }

    /// Applies the result of a claim. If the service was pointed at another
    /// URL while the fetch ran, the result is discarded and the service is
    /// made due again.
    pub fn complete(
        &self,
        claimed: &DueService,
        update: StatusUpdate,
    ) -> Result<Applied, StoreError> {
        let mut inner = self.write();
        let default_interval = inner.settings.default_refresh_interval_secs;
        let index = find(&inner.entries, claimed.id)?;
        let entry = &mut inner.entries[index];
        if entry.config.url != claimed.url {
            debug!(
                "{} moved from {} to {}; discarding result",
                entry.config.name, claimed.url, entry.config.url
            );
            entry.runtime.in_flight = false;
            entry.runtime.next_refresh_at = Utc::now();
            return Ok(Applied::Stale);
        }
        entry.record(update, default_interval);
        Ok(Applied::Recorded)
    }

    /// Ids of services that are due: not in flight and past their next check.
    pub fn due_services(&self, now: DateTime<Utc>) -> Vec<ServiceId> {
        self.read()
            .entries
            .iter()
            .filter(|entry| entry.runtime.is_due(now))
            .map(|entry| entry.id)
            .collect()
    }

    /// Marks every due service in flight and returns them, in one exclusive
    /// section so no service can be claimed twice.
    pub fn claim_due(&self, now: DateTime<Utc>) -> Vec<DueService> {
        self.write()
            .entries
            .iter_mut()
            .filter(|entry| entry.runtime.is_due(now))
            .map(ServiceEntry::claim)
            .collect()
    }

    /// Claims every service that is not already in flight, ignoring schedules.
    pub fn claim_all(&self) -> Vec<DueService> {
        self.write()
            .entries
            .iter_mut()
            .filter(|entry| !entry.runtime.in_flight)
            .map(ServiceEntry::claim)
            .collect()
    }

    /// Claims one service regardless of schedule. `None` if it is already in
    /// flight.
    pub fn claim(&self, id: ServiceId) -> Result<Option<DueService>, StoreError> {
        let mut inner = self.write();
        let index = find(&inner.entries, id)?;
        let entry = &mut inner.entries[index];
        if entry.runtime.in_flight {
            return Ok(None);
        }
        Ok(Some(entry.claim()))
    }

    /// Persists the config list and settings. Runtime state is never written.
    pub fn save(&self) -> Result<(), StoreError> {
        let _guard = self.save_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let file = {
            let inner = self.read();
            ConfigFile {
                services: inner
                    .entries
                    .iter()
                    .map(|entry| entry.config.clone())
                    .collect(),
                settings: inner.settings.clone(),
            }
        };
        self.storage.save(&file)?;
        Ok(())
    }
}

fn find(entries: &[ServiceEntry], id: ServiceId) -> Result<usize, StoreError> {
    entries
        .iter()
        .position(|entry| entry.id == id)
        .ok_or(StoreError::NotFound(id))
}

fn normalize(mut config: ServiceConfig, default_interval: u32) -> ServiceConfig {
    config.name = config.name.trim().to_string();
    config.url = config.url.trim().to_string();
    if config.refresh_interval_secs == 0 {
        config.refresh_interval_secs = default_interval;
    }
    config
}
