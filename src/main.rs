use std::env;
use std::sync::Arc;

use serde::Serialize;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use dsm_monitor::backend::{Backend, LifecycleSignal};
use dsm_monitor::config::{paths, RetryPolicy, SettingsChange, SettingsStore};
use dsm_monitor::dsm_client::ClientOptions;
use dsm_monitor::protocol::{serialize_message, Inbound, LineReader, Notification, Response};
use dsm_monitor::MonitorError;

const LOGIN_RETRIES_ENV: &str = "DSM_LOGIN_RETRIES";

type Outbox = mpsc::UnboundedSender<Vec<u8>>;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        error!(error = %err, "Backend stopped");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout carries the message protocol
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<(), MonitorError> {
    let store = Arc::new(SettingsStore::load(paths::settings_path()).await);
    let backend = Arc::new(
        Backend::new(Arc::clone(&store), ClientOptions::default())?
            .with_login_retry(login_retry_from_env()),
    );

    let (outbox, outgoing) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_output(outgoing));

    let mut updates = backend.subscribe();
    let mut settings_changes = store.subscribe();
    spawn_signal(&backend, LifecycleSignal::Startup);

    let mut lines = LineReader::new(BufReader::new(tokio::io::stdin()));
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => dispatch_line(&backend, &outbox, &line),
                Ok(None) => {
                    info!("stdin closed, shutting down");
                    break;
                }
                Err(err) => {
                    error!(error = %err, "Failed to read stdin, shutting down");
                    break;
                }
            },
            update = updates.recv() => match update {
                Ok(update) => send(&outbox, &Notification::TasksUpdated(update)),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Dropped task updates"),
                Err(RecvError::Closed) => break,
            },
            change = settings_changes.recv() => match change {
                Ok(change) => spawn_signal(&backend, LifecycleSignal::SettingsChanged(change)),
                Err(RecvError::Lagged(_)) => spawn_signal(
                    &backend,
                    LifecycleSignal::SettingsChanged(SettingsChange {
                        credentials_changed: true,
                        interval_changed: true,
                    }),
                ),
                Err(RecvError::Closed) => break,
            },
        }
    }

    backend.shutdown().await;
    drop(outbox);
    if let Err(err) = writer.await {
        warn!(error = %err, "Output writer failed");
    }
    Ok(())
}

fn login_retry_from_env() -> RetryPolicy {
    let policy = match env::var(LOGIN_RETRIES_ENV) {
        Ok(value) => match value.trim().parse::<u32>() {
            Ok(attempts) => RetryPolicy::with_attempts(attempts),
            Err(_) => {
                warn!(value = %value, "Ignoring invalid {}", LOGIN_RETRIES_ENV);
                RetryPolicy::disabled()
            }
        },
        Err(_) => RetryPolicy::disabled(),
    };
    if policy.is_enabled() {
        info!(attempts = policy.attempts, "Login retry enabled");
    }
    policy
}

fn dispatch_line(backend: &Arc<Backend>, outbox: &Outbox, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }

    match Inbound::parse(line) {
        Ok(Inbound::Request { id, request }) => {
            let backend = Arc::clone(backend);
            let outbox = outbox.clone();
            tokio::spawn(async move {
                let response = backend.handle(request).await.with_id(id);
                send(&outbox, &response);
            });
        }
        Ok(Inbound::Signal(kind)) => spawn_signal(backend, kind.into()),
        Err(err) => {
            warn!(error = %err, "Ignoring malformed message");
            send(
                outbox,
                &Response::failure_message(format!("Malformed message: {err}")),
            );
        }
    }
}

fn spawn_signal(backend: &Arc<Backend>, signal: LifecycleSignal) {
    let backend = Arc::clone(backend);
    tokio::spawn(async move {
        backend.handle_signal(signal).await;
    });
}

fn send<T: Serialize>(outbox: &Outbox, message: &T) {
    match serialize_message(message) {
        Ok(bytes) => {
            // Receiver only goes away during shutdown.
            let _ = outbox.send(bytes);
        }
        Err(err) => warn!(error = %err, "Failed to serialize message"),
    }
}

async fn write_output(mut outgoing: mpsc::UnboundedReceiver<Vec<u8>>) {
    let mut stdout = tokio::io::stdout();
    while let Some(bytes) = outgoing.recv().await {
        if let Err(err) = stdout.write_all(&bytes).await {
            error!(error = %err, "Failed to write to stdout");
            break;
        }
        if let Err(err) = stdout.flush().await {
            error!(error = %err, "Failed to flush stdout");
            break;
        }
    }
}
