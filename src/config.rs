mod loader;
pub mod paths;
mod types;

use async_trait::async_trait;

use crate::types::MonitorError;

pub use loader::SettingsStore;
pub use types::{
    RetryPolicy, Settings, SettingsChange, SettingsPatch, DEFAULT_REFRESH_INTERVAL_MS,
    MIN_REFRESH_INTERVAL_MS,
};

/// Source of connection settings for the Download Station client.
///
/// Implementations must hand out a fresh snapshot on every call; the user can
/// change the NAS host or credentials at any time.
#[async_trait]
pub trait SettingsProvider: Send + Sync {
    async fn settings(&self) -> Result<Settings, MonitorError>;
}

#[async_trait]
impl SettingsProvider for Settings {
    async fn settings(&self) -> Result<Settings, MonitorError> {
        Ok(self.clone())
    }
}
