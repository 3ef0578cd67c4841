mod task;
mod totals;

pub use task::{Task, TaskAdditional, TaskStatus, TaskTransfer};
pub use totals::TransferTotals;
