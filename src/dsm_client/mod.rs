pub mod api;
mod client;
pub mod codes;
mod helpers;
mod models;
mod session;
mod tasks;

pub use client::{ClientOptions, DsmClient, DEFAULT_TIMEOUT};
pub use helpers::{base_url, format_size, format_speed};
pub use models::{Task, TaskAdditional, TaskStatus, TaskTransfer, TransferTotals};
pub use session::{Session, SessionState};
pub use tasks::TaskAction;
