use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{SettingsProvider, DEFAULT_REFRESH_INTERVAL_MS};
use crate::dsm_client::{format_speed, DsmClient, Task, TransferTotals};
use crate::types::MonitorError;

const UPDATE_CHANNEL_CAPACITY: usize = 32;

/// Where the poller gets its task list from.
#[async_trait]
pub trait TaskSource: Send + Sync + 'static {
    async fn fetch_tasks(&self) -> Result<Vec<Task>, MonitorError>;
}

#[async_trait]
impl TaskSource for DsmClient {
    async fn fetch_tasks(&self) -> Result<Vec<Task>, MonitorError> {
        self.list_tasks().await
    }
}

/// Last task list fetched from the NAS.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSnapshot {
    pub tasks: Vec<Task>,
    /// Whether the most recent refresh succeeded.
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Published after every refresh, successful or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TasksUpdated {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub tasks: Vec<Task>,
    #[serde(skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub totals: Option<TransferTotals>,
}

/// Periodically refreshes the task list and publishes the result.
///
/// Holds at most one timer. [`Poller::arm`] always aborts the previous timer
/// before spawning a new one, and a failed refresh never stops the timer.
pub struct Poller<S: TaskSource> {
    source: Arc<S>,
    settings: Arc<dyn SettingsProvider>,
    snapshot: RwLock<TaskSnapshot>,
    updates: broadcast::Sender<TasksUpdated>,
    timer: Mutex<Option<JoinHandle<()>>>,
    busy: AtomicBool,
    // Set by a refresh that found another one running.
    pending: AtomicBool,
    generation: AtomicU64,
}

impl<S: TaskSource> Poller<S> {
    pub fn new(source: Arc<S>, settings: Arc<dyn SettingsProvider>) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            source,
            settings,
            snapshot: RwLock::new(TaskSnapshot::default()),
            updates,
            timer: Mutex::new(None),
            busy: AtomicBool::new(false),
            pending: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TasksUpdated> {
        self.updates.subscribe()
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        match self.snapshot.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Number of timers started so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn is_armed(&self) -> bool {
        self.lock_timer()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Fetch the task list and publish the outcome.
    ///
    /// When another refresh is still running this returns `None` right away
    /// and the running refresh fetches once more after it finishes, so the
    /// request is never lost.
    pub async fn refresh(&self) -> Option<TasksUpdated> {
        let mut last = None;
        loop {
            self.pending.store(true, Ordering::SeqCst);
            let Some(busy) = BusyGuard::acquire(&self.busy) else {
                debug!("Refresh in flight, queued a follow-up");
                return last;
            };
            self.pending.store(false, Ordering::SeqCst);
            last = Some(self.fetch_and_publish().await);
            drop(busy);

            if !self.pending.load(Ordering::SeqCst) {
                return last;
            }
        }
    }

    async fn fetch_and_publish(&self) -> TasksUpdated {
        let update = match self.source.fetch_tasks().await {
            Ok(tasks) => {
                let totals = TransferTotals::from_tasks(&tasks);
                debug!(
                    count = tasks.len(),
                    down = %format_speed(totals.total_down),
                    up = %format_speed(totals.total_up),
                    "Task snapshot refreshed"
                );
                self.store(TaskSnapshot {
                    tasks: tasks.clone(),
                    connected: true,
                    error: None,
                    updated_at: Some(Utc::now()),
                });
                TasksUpdated {
                    success: true,
                    error: None,
                    tasks,
                    totals: Some(totals),
                }
            }
            Err(err) => {
                warn!(error = %err, "Task refresh failed");
                let message = err.to_string();
                self.mark_disconnected(message.clone());
                TasksUpdated {
                    success: false,
                    error: Some(message),
                    tasks: Vec::new(),
                    totals: None,
                }
            }
        };

        // Nobody listening just means no UI is open.
        let _ = self.updates.send(update.clone());
        update
    }

    /// (Re)start the refresh timer at the currently configured interval.
    pub async fn arm(self: &Arc<Self>) {
        let period = match self.settings.settings().await {
            Ok(settings) => settings.refresh_interval(),
            Err(err) => {
                warn!(error = ?err, "Failed to read refresh interval, using default");
                Duration::from_millis(DEFAULT_REFRESH_INTERVAL_MS)
            }
        };

        let weak = Arc::downgrade(self);
        let mut timer = self.lock_timer();
        if let Some(previous) = timer.take() {
            previous.abort();
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            interval_ms = period.as_millis() as u64,
            generation, "Refresh timer armed"
        );
        *timer = Some(tokio::spawn(run_timer(weak, period)));
    }

    pub fn disarm(&self) {
        if let Some(handle) = self.lock_timer().take() {
            debug!("Refresh timer stopped");
            handle.abort();
        }
    }

    fn store(&self, snapshot: TaskSnapshot) {
        match self.snapshot.write() {
            Ok(mut guard) => *guard = snapshot,
            Err(poisoned) => *poisoned.into_inner() = snapshot,
        }
    }

    // Keeps the cached tasks so the UI can still show the last known list.
    fn mark_disconnected(&self, error: String) {
        let mut guard = match self.snapshot.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.connected = false;
        guard.error = Some(error);
    }

    fn lock_timer(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        match self.timer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<S: TaskSource> Drop for Poller<S> {
    fn drop(&mut self) {
        self.disarm();
    }
}

async fn run_timer<S: TaskSource>(poller: Weak<Poller<S>>, period: Duration) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let Some(poller) = poller.upgrade() else {
            break;
        };
        poller.refresh().await;
    }
}

struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
