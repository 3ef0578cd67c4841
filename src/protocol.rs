//! Messages exchanged with the UI over newline-delimited JSON on stdin/stdout.

use std::io;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::config::SettingsPatch;
use crate::dsm_client::Task;
use crate::poller::TasksUpdated;
use crate::types::MonitorError;

/// Requests sent by the popup and options page, keyed by `action`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
    Ping,
    Login,
    GetLatestTasks,
    StartTask {
        #[serde(rename = "taskId")]
        task_id: String,
    },
    PauseTask {
        #[serde(rename = "taskId")]
        task_id: String,
    },
    DeleteTask {
        #[serde(rename = "taskId")]
        task_id: String,
        /// Also remove the downloaded files
        #[serde(rename = "deleteFile", default)]
        delete_file: bool,
    },
    CreateTask {
        url: String,
    },
    SaveSettings(SettingsPatch),
}

#[derive(Debug, Clone, Deserialize)]
struct RequestEnvelope {
    #[serde(default)]
    id: Option<u64>,
    #[serde(flatten)]
    request: Request,
}

/// Events from the host environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SignalKind {
    Startup,
    Installed,
    IdleActive,
    Online,
}

#[derive(Debug, Deserialize)]
struct SignalMessage {
    signal: SignalKind,
}

/// One parsed line from stdin.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Request { id: Option<u64>, request: Request },
    Signal(SignalKind),
}

impl Inbound {
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(line)?;
        if value.get("signal").is_some() {
            let message: SignalMessage = serde_json::from_value(value)?;
            return Ok(Inbound::Signal(message.signal));
        }
        let envelope: RequestEnvelope = serde_json::from_value(value)?;
        Ok(Inbound::Request {
            id: envelope.id,
            request: envelope.request,
        })
    }
}

/// Reply to a single [`Request`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks: Option<Vec<Task>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alive: Option<bool>,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn failure(err: &MonitorError) -> Self {
        Self::failure_message(err.to_string())
    }

    pub fn failure_message(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn alive() -> Self {
        Self {
            success: true,
            alive: Some(true),
            ..Self::default()
        }
    }

    pub fn tasks(success: bool, tasks: Vec<Task>) -> Self {
        Self {
            success,
            tasks: Some(tasks),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: Option<u64>) -> Self {
        self.id = id;
        self
    }
}

/// Unsolicited messages pushed to the UI.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Notification {
    TasksUpdated(TasksUpdated),
}

/// Serialize a message to JSON bytes with newline delimiter
pub fn serialize_message<T: Serialize>(msg: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut bytes = serde_json::to_vec(msg)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Deserialize a message from JSON bytes, ignoring the trailing newline
pub fn deserialize_message<T: for<'de> Deserialize<'de>>(
    bytes: &[u8],
) -> Result<T, serde_json::Error> {
    let trimmed = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    serde_json::from_slice(trimmed)
}

/// Splits an input stream into message lines.
///
/// Bytes that are not valid UTF-8 are replaced rather than rejected, so a
/// garbled line fails to parse like any other malformed message. A partial
/// line stays buffered when `next_line` is cancelled inside `select!`.
pub struct LineReader<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: AsyncBufRead + Unpin> LineReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }

    /// Next line without its terminator, or `None` at end of input.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        let read = self.reader.read_until(b'\n', &mut self.buf).await?;
        if read == 0 && self.buf.is_empty() {
            return Ok(None);
        }
        let line = String::from_utf8_lossy(&self.buf)
            .trim_end_matches(['\r', '\n'])
            .to_string();
        self.buf.clear();
        Ok(Some(line))
    }
}
