use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::{RetryPolicy, SettingsChange, SettingsProvider, SettingsStore};
use crate::dsm_client::{ClientOptions, DsmClient, TaskAction};
use crate::poller::{Poller, TasksUpdated};
use crate::protocol::{Request, Response, SignalKind};
use crate::types::MonitorError;

/// Something the backend must react to besides UI requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleSignal {
    Startup,
    Installed,
    IdleActive,
    Online,
    SettingsChanged(SettingsChange),
}

impl From<SignalKind> for LifecycleSignal {
    fn from(kind: SignalKind) -> Self {
        match kind {
            SignalKind::Startup => LifecycleSignal::Startup,
            SignalKind::Installed => LifecycleSignal::Installed,
            SignalKind::IdleActive => LifecycleSignal::IdleActive,
            SignalKind::Online => LifecycleSignal::Online,
        }
    }
}

/// Routes UI requests and lifecycle signals to the client, poller and
/// settings store.
pub struct Backend {
    client: Arc<DsmClient>,
    poller: Arc<Poller<DsmClient>>,
    store: Arc<SettingsStore>,
    login_retry: RetryPolicy,
}

impl Backend {
    pub fn new(store: Arc<SettingsStore>, options: ClientOptions) -> Result<Self, MonitorError> {
        let provider: Arc<dyn SettingsProvider> = store.clone();
        let client = Arc::new(DsmClient::new(Arc::clone(&provider), options)?);
        let poller = Arc::new(Poller::new(Arc::clone(&client), provider));
        Ok(Self {
            client,
            poller,
            store,
            login_retry: RetryPolicy::disabled(),
        })
    }

    pub fn with_login_retry(mut self, policy: RetryPolicy) -> Self {
        self.login_retry = policy;
        self
    }

    pub fn client(&self) -> &Arc<DsmClient> {
        &self.client
    }

    pub fn poller(&self) -> &Arc<Poller<DsmClient>> {
        &self.poller
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TasksUpdated> {
        self.poller.subscribe()
    }

    pub async fn handle(&self, request: Request) -> Response {
        debug!(?request, "Handling request");
        match request {
            Request::Ping => {
                self.refresh_in_background();
                Response::alive()
            }
            Request::Login => match self.login().await {
                Ok(_) => Response::ok(),
                Err(err) => Response::failure(&err),
            },
            Request::GetLatestTasks => {
                let snapshot = self.poller.snapshot();
                let online = snapshot.connected && self.client.is_authenticated();
                Response::tasks(online, snapshot.tasks)
            }
            Request::StartTask { task_id } => {
                self.mutate(self.client.set_task_status(&task_id, TaskAction::Resume))
                    .await
            }
            Request::PauseTask { task_id } => {
                self.mutate(self.client.set_task_status(&task_id, TaskAction::Pause))
                    .await
            }
            Request::DeleteTask {
                task_id,
                delete_file,
            } => {
                self.mutate(self.client.delete_task(&task_id, delete_file))
                    .await
            }
            Request::CreateTask { url } => self.mutate(self.client.create_task(&url)).await,
            Request::SaveSettings(patch) => match self.store.update(patch).await {
                Ok(_) => Response::ok(),
                Err(err) => {
                    warn!(error = %err, "Failed to save settings");
                    Response::failure(&err)
                }
            },
        }
    }

    /// Explicit login, retried on connectivity failures when a
    /// [`RetryPolicy`] is configured.
    pub async fn login(&self) -> Result<String, MonitorError> {
        let mut attempt = 0;
        loop {
            match self.client.login().await {
                Err(err) if err.is_transient() && attempt < self.login_retry.attempts => {
                    attempt += 1;
                    warn!(
                        attempt,
                        max = self.login_retry.attempts,
                        error = %err,
                        "Login failed, retrying"
                    );
                    tokio::time::sleep(self.login_retry.delay).await;
                }
                outcome => return outcome,
            }
        }
    }

    pub async fn handle_signal(&self, signal: LifecycleSignal) {
        info!(?signal, "Lifecycle signal");
        match signal {
            LifecycleSignal::Startup | LifecycleSignal::Installed | LifecycleSignal::IdleActive => {
                self.poller.refresh().await;
                self.poller.arm().await;
            }
            LifecycleSignal::Online => {
                self.poller.refresh().await;
            }
            LifecycleSignal::SettingsChanged(change) => {
                if change.credentials_changed {
                    self.client.reset_session();
                    self.poller.refresh().await;
                }
                if change.interval_changed {
                    self.poller.arm().await;
                }
            }
        }
    }

    /// Stop polling and end the NAS session.
    pub async fn shutdown(&self) {
        self.poller.disarm();
        if let Err(err) = self.client.logout().await {
            warn!(error = %err, "Logout failed");
        }
    }

    async fn mutate<F>(&self, operation: F) -> Response
    where
        F: Future<Output = Result<(), MonitorError>>,
    {
        match operation.await {
            Ok(()) => {
                self.refresh_in_background();
                Response::ok()
            }
            Err(err) => {
                warn!(error = %err, "Task operation failed");
                Response::failure(&err)
            }
        }
    }

    fn refresh_in_background(&self) {
        let poller = Arc::clone(&self.poller);
        tokio::spawn(async move {
            poller.refresh().await;
        });
    }
}
