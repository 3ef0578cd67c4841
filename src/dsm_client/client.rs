use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use reqwest::{Client, Method};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::{Settings, SettingsProvider};
use crate::types::MonitorError;

use super::api::{
    api_kind, is_login_path, ApiEnvelope, LoginData, LoginQuery, LogoutQuery, AUTH_PATH,
};
use super::codes::{self, describe, is_session_error};
use super::helpers::base_url;
use super::session::{Session, SessionState};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Re-logins allowed per call after the NAS rejects the session.
const MAX_SESSION_RETRIES: u32 = 1;

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Upper bound for one request/response exchange.
    pub timeout: Duration,
    /// NAS boxes ship with self-signed certificates on 5001.
    pub accept_invalid_certs: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            accept_invalid_certs: true,
        }
    }
}

impl ClientOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// `None` until the leading login finishes.
type LoginOutcome = Option<Result<String, MonitorError>>;

#[derive(Default)]
struct SessionSlot {
    session: Session,
    login_in_flight: Option<watch::Receiver<LoginOutcome>>,
    // Bumped by `reset_session`; a login started under an older epoch must
    // not install its token.
    epoch: u64,
}

enum LoginRole {
    Leader(watch::Sender<LoginOutcome>, u64),
    Follower(watch::Receiver<LoginOutcome>),
}

/// Client for the Download Station Web API.
///
/// Owns the session: logs in on demand, shares one in-flight login between
/// concurrent callers and logs in again once when the NAS rejects the
/// session.
pub struct DsmClient {
    http: Client,
    settings: Arc<dyn SettingsProvider>,
    options: ClientOptions,
    state: Mutex<SessionSlot>,
}

impl DsmClient {
    pub fn new(
        settings: Arc<dyn SettingsProvider>,
        options: ClientOptions,
    ) -> Result<Self, MonitorError> {
        let http = Client::builder()
            .danger_accept_invalid_certs(options.accept_invalid_certs)
            .build()
            .map_err(|err| MonitorError::Config(format!("Failed to build HTTP client: {err}")))?;

        Ok(Self {
            http,
            settings,
            options,
            state: Mutex::new(SessionSlot::default()),
        })
    }

    pub fn session_state(&self) -> SessionState {
        self.lock_state().session.state()
    }

    pub fn is_authenticated(&self) -> bool {
        self.lock_state().session.is_authenticated()
    }

    /// Drop the current session without contacting the NAS, e.g. after the
    /// user changed host or credentials.
    pub fn reset_session(&self) {
        info!("Resetting DSM session");
        let mut state = self.lock_state();
        state.epoch = state.epoch.wrapping_add(1);
        state.session.clear();
    }

    fn token(&self) -> Option<String> {
        self.lock_state().session.token().map(str::to_string)
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionSlot> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Issue one API call, logging in first when needed.
    ///
    /// A session error on a non-login call drops the rejected session, logs
    /// in again and repeats the call once; a second rejection is returned as
    /// [`MonitorError::Api`]. When another caller already replaced the
    /// rejected session, the call is repeated with the new one instead.
    pub async fn call<Q>(&self, path: &str, query: &Q, method: Method) -> Result<Value, MonitorError>
    where
        Q: Serialize + ?Sized,
    {
        let mut retries_left = MAX_SESSION_RETRIES;
        loop {
            let (settings, token) = self.prepare(path).await?;
            match self
                .send_request(&settings, path, query, &method, token.as_deref())
                .await
            {
                Err(MonitorError::SessionExpired { code }) if retries_left > 0 => {
                    retries_left -= 1;
                    if self.invalidate(token.as_deref()) {
                        warn!(path, code, "Session rejected, logging in again");
                        self.login().await?;
                    } else {
                        debug!(path, code, "Rejected session already replaced, retrying");
                    }
                }
                Err(MonitorError::SessionExpired { code }) => {
                    warn!(path, code, "Session rejected again after re-login");
                    return Err(MonitorError::Api {
                        code,
                        message: describe(api_kind(path), code),
                    });
                }
                other => return other,
            }
        }
    }

    /// Settings for this attempt and the token to send, logging in first
    /// when a non-login call finds no session.
    async fn prepare(&self, path: &str) -> Result<(Settings, Option<String>), MonitorError> {
        let settings = self.settings.settings().await?;
        if !settings.has_host() {
            return Err(MonitorError::Config("NAS host not set".to_string()));
        }
        if is_login_path(path) {
            return Ok((settings, None));
        }

        if self.token().is_none() {
            debug!(path, "No session, logging in first");
            self.login().await?;
        }
        Ok((settings, self.token()))
    }

    /// Clear the session if it still holds `rejected`. Returns false when the
    /// session was already cleared or replaced by someone else.
    fn invalidate(&self, rejected: Option<&str>) -> bool {
        let mut state = self.lock_state();
        match rejected {
            Some(sid) if state.session.token() == Some(sid) => {
                state.session.clear();
                true
            }
            _ => false,
        }
    }

    /// Log in with the current settings.
    ///
    /// Only one login runs at a time; callers arriving while one is in
    /// flight wait for it and get the same outcome.
    pub async fn login(&self) -> Result<String, MonitorError> {
        let role = {
            let mut state = self.lock_state();
            match &state.login_in_flight {
                Some(rx) => LoginRole::Follower(rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    state.login_in_flight = Some(rx);
                    LoginRole::Leader(tx, state.epoch)
                }
            }
        };

        match role {
            LoginRole::Leader(tx, epoch) => {
                let mut guard = LoginSlotGuard {
                    client: self,
                    finished: false,
                };
                let outcome = self.perform_login().await;
                {
                    let mut state = self.lock_state();
                    match &outcome {
                        Ok(token) if state.epoch == epoch => {
                            state.session.establish(token.clone())
                        }
                        Ok(_) => debug!("Settings changed during login, discarding session"),
                        Err(_) => state.session.clear(),
                    }
                    state.login_in_flight = None;
                }
                guard.finished = true;
                let _ = tx.send(Some(outcome.clone()));
                outcome
            }
            LoginRole::Follower(mut rx) => {
                debug!("Joining in-flight login");
                let outcome = match rx.wait_for(Option::is_some).await {
                    Ok(value) => value.clone(),
                    Err(_) => None,
                };
                outcome.unwrap_or_else(|| {
                    Err(MonitorError::Network(
                        "Login was abandoned before completing".to_string(),
                    ))
                })
            }
        }
    }

    async fn perform_login(&self) -> Result<String, MonitorError> {
        let settings = self.settings.settings().await?;
        if !settings.has_host() {
            return Err(MonitorError::Config("NAS host not set".to_string()));
        }
        if settings.account.trim().is_empty() {
            return Err(MonitorError::Config("NAS account not set".to_string()));
        }

        info!(host = %settings.host, account = %settings.account, "Logging in to DSM");
        let query = LoginQuery::new(&settings.account, &settings.password);
        let data = self
            .send_request(&settings, AUTH_PATH, &query, &Method::GET, None)
            .await
            .inspect_err(|err| warn!(error = %err, "DSM login failed"))?;

        let login: LoginData = serde_json::from_value(data).map_err(|err| {
            MonitorError::InvalidResponse(format!("Login response without sid: {err}"))
        })?;
        Ok(login.sid)
    }

    /// End the session on the NAS. The local session is cleared even if the
    /// request fails.
    pub async fn logout(&self) -> Result<(), MonitorError> {
        let Some(token) = self.token() else {
            return Ok(());
        };
        self.lock_state().session.clear();

        let settings = self.settings.settings().await?;
        if !settings.has_host() {
            return Ok(());
        }
        self.send_request(
            &settings,
            AUTH_PATH,
            &LogoutQuery::default(),
            &Method::GET,
            Some(&token),
        )
        .await
        .map(|_| ())
    }

    async fn send_request<Q>(
        &self,
        settings: &Settings,
        path: &str,
        query: &Q,
        method: &Method,
        token: Option<&str>,
    ) -> Result<Value, MonitorError>
    where
        Q: Serialize + ?Sized,
    {
        let url = format!("{}{}", base_url(&settings.host), path);
        debug!(%method, path, "DSM request");

        let mut request = self.http.request(method.clone(), url);
        if let Some(sid) = token {
            request = request.query(&[("_sid", sid)]);
        }
        request = if *method == Method::GET {
            request.query(query)
        } else {
            request.form(query)
        };

        let exchange = async {
            let response = request
                .send()
                .await
                .map_err(|err| self.classify_transport_error(err))?;
            if !response.status().is_success() {
                return Err(MonitorError::Network(format!(
                    "{} returned {}",
                    path,
                    response.status()
                )));
            }
            response
                .json::<ApiEnvelope>()
                .await
                .map_err(|err| self.classify_transport_error(err))
        };

        let envelope = match tokio::time::timeout(self.options.timeout, exchange).await {
            Ok(Ok(envelope)) => envelope,
            Ok(Err(err)) => return Err(self.after_transport_failure(path, err)),
            Err(_) => {
                let err = MonitorError::Timeout(self.options.timeout);
                return Err(self.after_transport_failure(path, err));
            }
        };

        interpret(path, envelope)
    }

    fn classify_transport_error(&self, err: reqwest::Error) -> MonitorError {
        // Login URLs carry the password in the query string.
        let err = err.without_url();
        if err.is_timeout() {
            MonitorError::Timeout(self.options.timeout)
        } else if err.is_decode() {
            MonitorError::InvalidResponse(err.to_string())
        } else {
            MonitorError::Network(err.to_string())
        }
    }

    fn after_transport_failure(&self, path: &str, err: MonitorError) -> MonitorError {
        if err.is_transient() {
            warn!(path, error = %err, "DSM unreachable, dropping session");
            self.lock_state().session.clear();
        }
        err
    }
}

/// Clears the in-flight slot if the leading login is dropped midway, so the
/// next caller starts a fresh attempt.
struct LoginSlotGuard<'a> {
    client: &'a DsmClient,
    finished: bool,
}

impl Drop for LoginSlotGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let mut state = self.client.lock_state();
            state.session.clear();
            state.login_in_flight = None;
        }
    }
}

fn interpret(path: &str, envelope: ApiEnvelope) -> Result<Value, MonitorError> {
    if envelope.success {
        return Ok(envelope.data.unwrap_or(Value::Null));
    }

    let code = envelope
        .error
        .map(|error| error.code)
        .unwrap_or(codes::UNKNOWN_ERROR);
    let kind = api_kind(path);

    if is_login_path(path) {
        return Err(MonitorError::Auth {
            code,
            message: describe(kind, code),
        });
    }
    if is_session_error(code) {
        return Err(MonitorError::SessionExpired { code });
    }
    Err(MonitorError::Api {
        code,
        message: describe(kind, code),
    })
}
