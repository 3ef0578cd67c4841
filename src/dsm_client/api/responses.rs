use serde::Deserialize;
use serde_json::Value;

use crate::dsm_client::models::Task;

/// Envelope wrapping every DSM Web API response.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope {
    pub success: bool,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    pub code: i64,
}

#[derive(Debug, Deserialize)]
pub struct LoginData {
    pub sid: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct TaskListData {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub total: Option<u64>,
}
