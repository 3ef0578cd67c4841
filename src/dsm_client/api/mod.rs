mod queries;
mod responses;

pub use queries::{
    LoginQuery, LogoutQuery, TaskCreateQuery, TaskDeleteQuery, TaskListQuery, TaskStatusQuery,
};
pub use responses::{ApiEnvelope, ApiErrorBody, LoginData, TaskListData};

use super::codes::ApiKind;

pub const AUTH_PATH: &str = "/webapi/auth.cgi";
pub const TASK_PATH: &str = "/webapi/DownloadStation/task.cgi";

pub const AUTH_API: &str = "SYNO.API.Auth";
pub const TASK_API: &str = "SYNO.DownloadStation.Task";
pub const SESSION_NAME: &str = "DownloadStation";

pub fn is_login_path(path: &str) -> bool {
    path == AUTH_PATH
}

pub fn api_kind(path: &str) -> ApiKind {
    match path {
        AUTH_PATH => ApiKind::Auth,
        TASK_PATH => ApiKind::Task,
        _ => ApiKind::Other,
    }
}
