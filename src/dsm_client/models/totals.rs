use serde::Serialize;

use super::Task;

/// Aggregate transfer speed across all tasks, in bytes per second.
#[derive(Debug, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransferTotals {
    pub total_down: u64,
    pub total_up: u64,
}

impl TransferTotals {
    pub fn from_tasks(tasks: &[Task]) -> Self {
        tasks
            .iter()
            .filter_map(Task::transfer)
            .fold(Self::default(), |acc, transfer| Self {
                total_down: acc.total_down.saturating_add(transfer.speed_download),
                total_up: acc.total_up.saturating_add(transfer.speed_upload),
            })
    }
}
