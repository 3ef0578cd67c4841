use std::env;
use std::path::PathBuf;

use tracing::{debug, warn};

pub const SETTINGS_ENV: &str = "DSM_MONITOR_SETTINGS";
const SETTINGS_FILE: &str = "settings.json";

/// Get the path to the settings.json file.
/// Honors `DSM_MONITOR_SETTINGS`, then looks in the app directory (parent of
/// the backend folder), then the current directory.
pub fn settings_path() -> PathBuf {
    if let Ok(custom) = env::var(SETTINGS_ENV) {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            debug!(path = %trimmed, "Using settings path from environment");
            return PathBuf::from(trimmed);
        }
    }

    // Executable is at: app_root/backend/entry
    // Settings should be at: app_root/settings.json
    if let Ok(exe_path) = env::current_exe() {
        debug!(path = %exe_path.display(), "Executable path detected");

        if let Some(app_root) = exe_path.parent().and_then(|backend| backend.parent()) {
            let path = app_root.join(SETTINGS_FILE);
            debug!(path = %path.display(), "Looking for settings");
            return path;
        }
    }

    warn!("Using fallback: looking for settings.json in current directory");
    PathBuf::from(SETTINGS_FILE)
}
