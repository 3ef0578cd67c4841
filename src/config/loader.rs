use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::types::MonitorError;

use super::{Settings, SettingsChange, SettingsPatch, SettingsProvider};

const CHANGE_CHANNEL_CAPACITY: usize = 16;

/// Persistent key-value settings backed by a JSON file.
///
/// The file is re-read on every [`SettingsProvider::settings`] call so edits
/// made behind the backend's back are picked up; any difference against the
/// cached copy is broadcast as a [`SettingsChange`].
pub struct SettingsStore {
    path: Option<PathBuf>,
    current: RwLock<Settings>,
    // Serializes disk reads against writes so a read never resurrects a
    // value an in-progress update is replacing.
    io: Mutex<()>,
    changes: broadcast::Sender<SettingsChange>,
}

impl SettingsStore {
    /// Load settings from `path`.
    /// Falls back to defaults if the file doesn't exist or can't be parsed.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let settings = match read_settings(&path).await {
            Ok(Some(settings)) => {
                info!(
                    path = %path.display(),
                    host = %settings.host,
                    interval_ms = settings.refresh_interval,
                    "Loaded settings"
                );
                settings
            }
            Ok(None) => {
                warn!(path = %path.display(), "Settings file not found, using defaults");
                Settings::default()
            }
            Err(err) => {
                warn!(error = ?err, "Failed to load settings.json, using defaults");
                Settings::default()
            }
        };
        Self::from_parts(Some(path), settings)
    }

    /// Store without a backing file, for tests and embedding.
    pub fn in_memory(settings: Settings) -> Self {
        Self::from_parts(None, settings)
    }

    fn from_parts(path: Option<PathBuf>, settings: Settings) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            path,
            current: RwLock::new(settings),
            io: Mutex::new(()),
            changes,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SettingsChange> {
        self.changes.subscribe()
    }

    /// Last known settings without touching the disk.
    pub fn current(&self) -> Settings {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Apply `patch`, persist it and notify subscribers.
    pub async fn update(&self, patch: SettingsPatch) -> Result<SettingsChange, MonitorError> {
        let _io = self.io.lock().await;
        let previous = self.current();
        let mut next = previous.clone();
        next.apply(patch);

        if let Some(path) = &self.path {
            write_settings(path, &next).await?;
        }

        let change = previous.diff(&next);
        self.replace(next);
        self.notify(change);
        Ok(change)
    }

    fn replace(&self, settings: Settings) {
        match self.current.write() {
            Ok(mut guard) => *guard = settings,
            Err(poisoned) => *poisoned.into_inner() = settings,
        }
    }

    fn notify(&self, change: SettingsChange) {
        if change.is_empty() {
            return;
        }
        debug!(
            credentials = change.credentials_changed,
            interval = change.interval_changed,
            "Settings changed"
        );
        // No subscribers is fine; nobody needs to react.
        let _ = self.changes.send(change);
    }
}

#[async_trait]
impl SettingsProvider for SettingsStore {
    async fn settings(&self) -> Result<Settings, MonitorError> {
        let Some(path) = &self.path else {
            return Ok(self.current());
        };

        let _io = self.io.lock().await;
        match read_settings(path).await {
            Ok(Some(on_disk)) => {
                let previous = self.current();
                if previous != on_disk {
                    info!(path = %path.display(), "Settings file changed on disk");
                    self.replace(on_disk.clone());
                    self.notify(previous.diff(&on_disk));
                }
                Ok(on_disk)
            }
            Ok(None) => Ok(self.current()),
            Err(err) => {
                warn!(error = ?err, "Failed to re-read settings, keeping last known values");
                Ok(self.current())
            }
        }
    }
}

async fn read_settings(path: &Path) -> Result<Option<Settings>, MonitorError> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path)
        .await
        .map_err(|err| MonitorError::Config(format!("Failed to read settings file: {err}")))?;

    let settings = serde_json::from_str(&contents)
        .map_err(|err| MonitorError::Config(format!("Failed to parse settings.json: {err}")))?;

    Ok(Some(settings))
}

async fn write_settings(path: &Path, settings: &Settings) -> Result<(), MonitorError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }

    let contents = serde_json::to_string_pretty(settings)
        .map_err(|err| MonitorError::Config(format!("Failed to serialize settings: {err}")))?;
    fs::write(path, contents).await?;
    Ok(())
}
