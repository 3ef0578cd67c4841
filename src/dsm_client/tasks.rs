use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::MonitorError;

use super::api::{
    TaskCreateQuery, TaskDeleteQuery, TaskListData, TaskListQuery, TaskStatusQuery, TASK_PATH,
};
use super::client::DsmClient;
use super::helpers::format_size;
use super::models::Task;

/// Status change requested for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskAction {
    Resume,
    Pause,
}

impl TaskAction {
    pub fn as_method(self) -> &'static str {
        match self {
            TaskAction::Resume => "resume",
            TaskAction::Pause => "pause",
        }
    }
}

impl DsmClient {
    /// All tasks in the order the NAS returns them, with transfer details.
    pub async fn list_tasks(&self) -> Result<Vec<Task>, MonitorError> {
        let data = self
            .call(TASK_PATH, &TaskListQuery::default(), Method::GET)
            .await?;
        if data.is_null() {
            return Ok(Vec::new());
        }

        let list: TaskListData = serde_json::from_value(data)
            .map_err(|err| MonitorError::InvalidResponse(format!("Malformed task list: {err}")))?;
        let queued: u64 = list.tasks.iter().map(|task| task.size).sum();
        debug!(
            count = list.tasks.len(),
            total = ?list.total,
            size = %format_size(queued),
            "Fetched task list"
        );
        Ok(list.tasks)
    }

    /// Queue a download for a magnet link or URL.
    pub async fn create_task(&self, uri: &str) -> Result<(), MonitorError> {
        self.call(TASK_PATH, &TaskCreateQuery::new(uri), Method::GET)
            .await?;
        Ok(())
    }

    pub async fn set_task_status(&self, id: &str, action: TaskAction) -> Result<(), MonitorError> {
        self.call(
            TASK_PATH,
            &TaskStatusQuery::new(id, action.as_method()),
            Method::GET,
        )
        .await?;
        Ok(())
    }

    /// Remove a task; `remove_files` also deletes what it downloaded.
    pub async fn delete_task(&self, id: &str, remove_files: bool) -> Result<(), MonitorError> {
        self.call(
            TASK_PATH,
            &TaskDeleteQuery::new(id, remove_files),
            Method::GET,
        )
        .await?;
        Ok(())
    }
}
