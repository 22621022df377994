use crate::error::StorageError;
use crate::models::{ConfigFile, DEFAULT_REFRESH_INTERVAL_SECS, is_valid_interval};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

const CONFIG_DIR_NAME: &str = "statusboard";
const CONFIG_FILE_NAME: &str = "config.json";

/// JSON config file holding the service list and global settings.
#[derive(Debug, Clone)]
pub struct Storage {
    path: PathBuf,
}

impl Storage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Storage { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the config file. A missing file yields defaults.
    pub fn load(&self) -> Result<ConfigFile, StorageError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("No config at {}; starting empty", self.path.display());
                return Ok(ConfigFile::default());
            }
            Err(err) => return Err(self.io_error(err)),
        };

        let mut file: ConfigFile = serde_json::from_str(&contents)?;
        let interval = file.settings.default_refresh_interval_secs;
        if !is_valid_interval(interval) {
            warn!(
                "Default refresh interval {interval}s out of range; using {DEFAULT_REFRESH_INTERVAL_SECS}s"
            );
            file.settings.default_refresh_interval_secs = DEFAULT_REFRESH_INTERVAL_SECS;
        }
        let default_interval = file.settings.default_refresh_interval_secs;
        for service in &mut file.services {
            let interval = service.refresh_interval_secs;
            if !is_valid_interval(interval) {
                if interval != 0 {
                    warn!(
                        "{}: refresh interval {interval}s out of range; using {default_interval}s",
                        service.name
                    );
                }
                service.refresh_interval_secs = default_interval;
            }
        }
        Ok(file)
    }

    /// Writes the config file via a sibling temp file and an atomic rename.
    pub fn save(&self, file: &ConfigFile) -> Result<(), StorageError> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(|err| self.io_error(err))?;

        let payload = serde_json::to_vec_pretty(file)?;
        let mut tmp = NamedTempFile::new_in(&parent).map_err(|err| self.io_error(err))?;
        tmp.write_all(&payload).map_err(|err| self.io_error(err))?;
        tmp.as_file().sync_all().map_err(|err| self.io_error(err))?;
        tmp.persist(&self.path)?;
        debug!(
            "Saved {} services to {}",
            file.services.len(),
            self.path.display()
        );
        Ok(())
    }

    fn io_error(&self, source: io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

/// `STATUSBOARD_CONFIG` if set, otherwise `<config dir>/statusboard/config.json`.
pub fn config_path() -> Result<PathBuf, StorageError> {
    if let Ok(raw) = std::env::var("STATUSBOARD_CONFIG")
        && !raw.trim().is_empty()
    {
        return Ok(PathBuf::from(raw));
    }
    dirs::config_dir()
        .map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
        .ok_or(StorageError::NoConfigDir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ServiceConfig, Settings};
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    #[test]
    fn missing_file_loads_defaults() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path().join("nested/config.json"));
        let file = storage.load().unwrap();
        assert!(file.services.is_empty());
        assert_eq!(file.settings, Settings::default());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path().join("nested/config.json"));
        let mut checked = ServiceConfig::new("GitHub", "https://www.githubstatus.com", 60);
        checked.last_checked = Some(Utc.with_ymd_and_hms(2025, 10, 20, 15, 53, 0).unwrap());
        checked.current_status = "Operational".to_string();
        let file = ConfigFile {
            services: vec![
                checked,
                ServiceConfig::new("Slack", "https://status.slack.com/feed/rss", 300),
            ],
            settings: Settings {
                default_refresh_interval_secs: 45,
            },
        };

        storage.save(&file).unwrap();
        assert_eq!(storage.load().unwrap(), file);

        // Saving twice leaves no stray temp files behind.
        storage.save(&file).unwrap();
        let entries = fs::read_dir(dir.path().join("nested")).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        let err = Storage::new(&path).load().unwrap_err();
        assert!(matches!(err, StorageError::Json(_)));
    }

    #[test]
    fn out_of_range_default_interval_is_replaced() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"services": [], "settings": {"default_refresh_interval": 0}}"#,
        )
        .unwrap();
        let file = Storage::new(&path).load().unwrap();
        assert_eq!(
            file.settings.default_refresh_interval_secs,
            DEFAULT_REFRESH_INTERVAL_SECS
        );
    }

    #[test]
    fn out_of_range_service_intervals_take_the_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{
                "services": [
                    {"name": "fast", "url": "https://a.example.com", "refresh_interval": 1},
                    {"name": "slow", "url": "https://b.example.com", "refresh_interval": 100000},
                    {"name": "unset", "url": "https://c.example.com"},
                    {"name": "fine", "url": "https://d.example.com", "refresh_interval": 120}
                ],
                "settings": {"default_refresh_interval": 45}
            }"#,
        )
        .unwrap();
        let file = Storage::new(&path).load().unwrap();
        let intervals: Vec<_> = file
            .services
            .iter()
            .map(|svc| svc.refresh_interval_secs)
            .collect();
        assert_eq!(intervals, [45, 45, 45, 120]);
    }
}
