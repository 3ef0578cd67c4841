use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Download Station task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Waiting,
    Downloading,
    Paused,
    Finishing,
    Finished,
    HashChecking,
    Seeding,
    FilehostingWaiting,
    Extracting,
    Error,
    #[serde(other)]
    Unknown,
}

impl TaskStatus {
    pub fn is_complete(self) -> bool {
        matches!(self, TaskStatus::Finished | TaskStatus::Seeding)
    }
}

/// A task as returned by `SYNO.DownloadStation.Task` `list`.
///
/// Fields the backend does not look at are kept in `extra` and serialized
/// back out unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional: Option<TaskAdditional>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskAdditional {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer: Option<TaskTransfer>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskTransfer {
    #[serde(default)]
    pub size_downloaded: u64,
    #[serde(default)]
    pub size_uploaded: u64,
    #[serde(default)]
    pub speed_download: u64,
    #[serde(default)]
    pub speed_upload: u64,
}

impl Task {
    pub fn transfer(&self) -> Option<&TaskTransfer> {
        self.additional.as_ref().and_then(|a| a.transfer.as_ref())
    }

    /// Completion percentage, 0..=100.
    pub fn progress(&self) -> u8 {
        if self.status.is_complete() {
            return 100;
        }
        let downloaded = self.transfer().map(|t| t.size_downloaded).unwrap_or(0);
        compute_progress(downloaded, self.size)
    }

    /// Upload/download ratio, `None` until something was downloaded.
    pub fn ratio(&self) -> Option<f64> {
        let transfer = self.transfer()?;
        if transfer.size_downloaded == 0 {
            return None;
        }
        Some(transfer.size_uploaded as f64 / transfer.size_downloaded as f64)
    }
}

fn compute_progress(downloaded: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let percent = downloaded.saturating_mul(100) / total;
    percent.min(100) as u8
}
