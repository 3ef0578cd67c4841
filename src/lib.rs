pub mod backend;
pub mod config;
pub mod dsm_client;
pub mod poller;
pub mod protocol;
pub mod types;

pub use types::MonitorError;
