use serde::Serialize;

use super::{AUTH_API, SESSION_NAME, TASK_API};

#[derive(Serialize)]
pub struct LoginQuery<'a> {
    api: &'static str,
    version: u32,
    method: &'static str,
    account: &'a str,
    passwd: &'a str,
    session: &'static str,
    format: &'static str,
}

impl<'a> LoginQuery<'a> {
    pub fn new(account: &'a str, passwd: &'a str) -> Self {
        Self {
            api: AUTH_API,
            version: 6,
            method: "login",
            account,
            passwd,
            session: SESSION_NAME,
            format: "sid",
        }
    }
}

#[derive(Serialize)]
pub struct LogoutQuery {
    api: &'static str,
    version: u32,
    method: &'static str,
    session: &'static str,
}

impl Default for LogoutQuery {
    fn default() -> Self {
        Self {
            api: AUTH_API,
            version: 6,
            method: "logout",
            session: SESSION_NAME,
        }
    }
}

#[derive(Serialize)]
pub struct TaskListQuery {
    api: &'static str,
    version: u32,
    method: &'static str,
    additional: &'static str,
}

impl Default for TaskListQuery {
    fn default() -> Self {
        Self {
            api: TASK_API,
            version: 3,
            method: "list",
            additional: "transfer",
        }
    }
}

#[derive(Serialize)]
pub struct TaskCreateQuery<'a> {
    api: &'static str,
    version: u32,
    method: &'static str,
    uri: &'a str,
}

impl<'a> TaskCreateQuery<'a> {
    pub fn new(uri: &'a str) -> Self {
        Self {
            api: TASK_API,
            version: 3,
            method: "create",
            uri,
        }
    }
}

#[derive(Serialize)]
pub struct TaskStatusQuery<'a> {
    api: &'static str,
    version: u32,
    method: &'static str,
    id: &'a str,
}

impl<'a> TaskStatusQuery<'a> {
    pub fn new(id: &'a str, method: &'static str) -> Self {
        Self {
            api: TASK_API,
            version: 1,
            method,
            id,
        }
    }
}

#[derive(Serialize)]
pub struct TaskDeleteQuery<'a> {
    api: &'static str,
    version: u32,
    method: &'static str,
    id: &'a str,
    force_clean: bool,
}

impl<'a> TaskDeleteQuery<'a> {
    pub fn new(id: &'a str, force_clean: bool) -> Self {
        Self {
            api: TASK_API,
            version: 1,
            method: "delete",
            id,
            force_clean,
        }
    }
}
