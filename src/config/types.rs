use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 3000;
pub const MIN_REFRESH_INTERVAL_MS: u64 = 1000;

/// Connection settings for the NAS, as stored on disk.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub host: String,

    #[serde(default)]
    pub account: String,

    #[serde(default)]
    pub password: String,

    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: String::new(),
            account: String::new(),
            password: String::new(),
            refresh_interval: default_refresh_interval(),
        }
    }
}

fn default_refresh_interval() -> u64 {
    DEFAULT_REFRESH_INTERVAL_MS
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("host", &self.host)
            .field("account", &self.account)
            .field("password", &"<redacted>")
            .field("refresh_interval", &self.refresh_interval)
            .finish()
    }
}

impl Settings {
    pub fn new(
        host: impl Into<String>,
        account: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            account: account.into(),
            password: password.into(),
            ..Self::default()
        }
    }

    pub fn with_refresh_interval(mut self, millis: u64) -> Self {
        self.refresh_interval = millis;
        self
    }

    /// Poll interval, never shorter than [`MIN_REFRESH_INTERVAL_MS`].
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval.max(MIN_REFRESH_INTERVAL_MS))
    }

    pub fn has_host(&self) -> bool {
        !self.host.trim().is_empty()
    }

    /// Which groups of settings differ between `self` and `next`.
    pub fn diff(&self, next: &Settings) -> SettingsChange {
        SettingsChange {
            credentials_changed: self.host != next.host
                || self.account != next.account
                || self.password != next.password,
            interval_changed: self.refresh_interval != next.refresh_interval,
        }
    }

    pub fn apply(&mut self, patch: SettingsPatch) {
        if let Some(host) = patch.host {
            self.host = host.trim().to_string();
        }
        if let Some(account) = patch.account {
            self.account = account.trim().to_string();
        }
        if let Some(password) = patch.password {
            self.password = password;
        }
        if let Some(interval) = patch.refresh_interval {
            self.refresh_interval = interval.max(MIN_REFRESH_INTERVAL_MS);
        }
    }
}

/// Partial update written by the options page.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_interval: Option<u64>,
}

impl fmt::Debug for SettingsPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingsPatch")
            .field("host", &self.host)
            .field("account", &self.account)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("refresh_interval", &self.refresh_interval)
            .finish()
    }
}

/// Storage-change notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsChange {
    /// Host, account or password changed; the current session is stale.
    pub credentials_changed: bool,
    /// Poll interval changed; the timer must be re-armed.
    pub interval_changed: bool,
}

impl SettingsChange {
    pub fn is_empty(&self) -> bool {
        !self.credentials_changed && !self.interval_changed
    }
}

/// Optional connectivity-aware retry applied to explicit logins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::disabled()
    }
}

impl RetryPolicy {
    pub const DEFAULT_DELAY: Duration = Duration::from_secs(2);

    pub fn disabled() -> Self {
        Self {
            attempts: 0,
            delay: Self::DEFAULT_DELAY,
        }
    }

    pub fn with_attempts(attempts: u32) -> Self {
        Self {
            attempts,
            delay: Self::DEFAULT_DELAY,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.attempts > 0
    }
}
