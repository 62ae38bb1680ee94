//! High-level session operations.
//!
//! `AuthSession` wires the token store, interceptors, refresh coordinator and
//! session machine together and exposes login, second-factor verification,
//! logout and the authenticated verdict to the rest of the application.

use crate::broadcaster::{SessionListener, SessionStateBroadcaster};
use crate::claims;
use crate::client::ApiClient;
use crate::envelope::{locate_payload, opt_string_or_number};
use crate::error::{ApiError, AuthError, AuthResult};
use crate::refresh::RefreshCoordinator;
use crate::request::{ApiRequest, ApiResponse};
use crate::request_interceptor::RequestInterceptor;
use crate::response_interceptor::ResponseInterceptor;
use crate::session_machine::{SessionMachine, SessionMachineInput, SessionState};
use crate::token_store::{TokenPair, TokenStore, UserIdentity};
use chrono::{Duration, Utc};
use reqwest::cookie::Jar;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use session_config_and_utils::{Config, EndpointConfig, RouteConfig};
use session_storage::SessionStorage;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Email/password pair submitted to the login endpoint.
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Category of a failed login or verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    CredentialsInvalid,
    InvalidCode,
    Transport,
    MalformedResponse,
    Storage,
}

/// Structured failure returned instead of an error for expected outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl AuthFailure {
    fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Result of [`AuthSession::login`] and [`AuthSession::verify_two_factor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Authenticated {
        identity: Option<UserIdentity>,
        redirect_to: String,
    },
    TwoFactorRequired {
        user_id: String,
        redirect_to: String,
    },
    Failed(AuthFailure),
}

impl LoginOutcome {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, LoginOutcome::Authenticated { .. })
    }
}

/// Result of [`AuthSession::logout`]. Logout always succeeds locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogoutOutcome {
    /// The server confirmed the invalidation.
    pub server_acknowledged: bool,
    pub redirect_to: String,
}

/// Result of [`AuthSession::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub authenticated: bool,
    pub redirect_to: Option<String>,
}

/// How the caller should react to a failed API call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorVerdict {
    pub logout: bool,
    pub redirect_to: Option<String>,
}

/// Point-in-time view of the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub is_authenticated: bool,
    pub state: SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_two_factor_user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<UserIdentity>,
}

/// Login and second-factor grant, found at the envelope root or under `data`.
#[derive(Debug, Default, Deserialize)]
struct LoginGrant {
    #[serde(default)]
    requires_2fa: bool,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    id_users: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    user: Option<UserIdentity>,
}

const GRANT_MARKERS: [&str; 3] = ["access_token", "requires_2fa", "id_users"];

/// Session facade.
pub struct AuthSession {
    tokens: Arc<TokenStore>,
    machine: Arc<SessionMachine>,
    coordinator: Arc<RefreshCoordinator>,
    client: ApiClient,
    endpoints: EndpointConfig,
    routes: RouteConfig,
}

impl AuthSession {
    /// Build a session over `storage` and seed its state from whatever the
    /// storage already holds.
    pub fn new(config: &Config, storage: Box<dyn SessionStorage>) -> AuthResult<Self> {
        let api_url = config
            .api_url()
            .map_err(|e| AuthError::Config(e.to_string()))?;

        let jar = Arc::new(Jar::default());
        let http = reqwest::Client::builder()
            .cookie_provider(jar.clone())
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()?;

        let tokens = Arc::new(TokenStore::new(storage).with_cookie_mirror(
            jar,
            api_url.clone(),
            config.access_cookie_max_age_secs,
        ));
        let broadcaster = Arc::new(SessionStateBroadcaster::new(false));
        let machine = Arc::new(SessionMachine::new(broadcaster));
        let coordinator = Arc::new(RefreshCoordinator::new(
            http.clone(),
            &api_url,
            &config.endpoints.refresh,
            tokens.clone(),
            machine.clone(),
        )?);

        let request_interceptor = RequestInterceptor::new(tokens.clone(), &config.client_type);
        let response_interceptor = ResponseInterceptor::new(
            tokens.clone(),
            coordinator.clone(),
            machine.clone(),
            vec![
                config.endpoints.refresh.clone(),
                config.endpoints.logout.clone(),
            ],
        );
        let client = ApiClient::new(http, api_url, request_interceptor, response_interceptor);

        let session = Self {
            tokens,
            machine,
            coordinator,
            client,
            endpoints: config.endpoints.clone(),
            routes: config.routes.clone(),
        };
        session.restore();
        Ok(session)
    }

    /// Align the state machine with persisted storage.
    pub fn restore(&self) -> SessionState {
        if self.tokens.pending_two_factor_user_id().is_some() {
            self.machine.apply(SessionMachineInput::SecondFactorPending);
        } else if self.tokens.access_token().is_some() {
            self.machine.apply(SessionMachineInput::SessionRestored);
        }
        let state = self.machine.state();
        debug!(state = ?state, "Session restored from storage");
        state
    }

    /// Client for application requests.
    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    pub fn broadcaster(&self) -> &SessionStateBroadcaster {
        self.machine.broadcaster()
    }

    pub fn subscribe(&self, listener: SessionListener) -> bool {
        self.broadcaster().subscribe(listener)
    }

    pub fn state(&self) -> SessionState {
        self.machine.state()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.machine.state();
        SessionSnapshot {
            is_authenticated: state.is_authenticated(),
            state,
            pending_two_factor_user_id: self.tokens.pending_two_factor_user_id(),
            identity: self.tokens.identity(),
        }
    }

    /// Log in with email and password.
    ///
    /// Expected failures come back as [`LoginOutcome::Failed`]; this never
    /// returns an error.
    pub async fn login(&self, credentials: &Credentials) -> LoginOutcome {
        self.machine.apply(SessionMachineInput::LoginAttempt);
        debug!(email = %credentials.email, "Attempting login");

        let request = ApiRequest::post(&self.endpoints.login).with_json(json!({
            "email": credentials.email,
            "password": credentials.password,
        }));

        let outcome = match self.exchange(request, FailureKind::CredentialsInvalid).await {
            Ok(grant) if grant.requires_2fa => self.begin_two_factor(grant),
            Ok(grant) => self.complete_login(grant),
            Err(failure) => LoginOutcome::Failed(failure),
        };

        match &outcome {
            LoginOutcome::Authenticated { identity, .. } => {
                self.machine.apply(SessionMachineInput::LoginSucceeded);
                info!(user_id = ?identity.as_ref().map(|i| &i.id), "Login successful");
            }
            LoginOutcome::TwoFactorRequired { user_id, .. } => {
                self.machine
                    .apply_or_clear(SessionMachineInput::SecondFactorRequired);
                info!(user_id = %user_id, "Login requires second factor");
            }
            LoginOutcome::Failed(failure) => {
                self.machine.apply(SessionMachineInput::LoginFailed);
                warn!(kind = ?failure.kind, message = %failure.message, "Login failed");
            }
        }
        outcome
    }

    /// Complete a login that returned [`LoginOutcome::TwoFactorRequired`].
    pub async fn verify_two_factor(&self, code: &str) -> AuthResult<LoginOutcome> {
        let user_id = self
            .tokens
            .pending_two_factor_user_id()
            .ok_or(AuthError::NoPendingVerification)?;

        // Numeric ids go back as numbers, the way the server issued them.
        let id_users = user_id
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::from(user_id.clone()));
        let request = ApiRequest::post(&self.endpoints.verify_two_factor)
            .with_json(json!({ "id_users": id_users, "code": code }));

        let outcome = match self.exchange(request, FailureKind::InvalidCode).await {
            Ok(grant) => self.complete_login(grant),
            Err(failure) => LoginOutcome::Failed(failure),
        };

        match &outcome {
            LoginOutcome::Authenticated { .. } => {
                self.machine.apply(SessionMachineInput::SecondFactorVerified);
                info!(user_id = %user_id, "Second factor verified");
            }
            LoginOutcome::Failed(failure) => {
                self.machine.apply(SessionMachineInput::SecondFactorRejected);
                warn!(kind = ?failure.kind, "Second factor verification failed");
            }
            LoginOutcome::TwoFactorRequired { .. } => {}
        }
        Ok(outcome)
    }

    /// Invalidate the session on the server (best effort) and clear it locally.
    pub async fn logout(&self) -> LogoutOutcome {
        self.machine.apply(SessionMachineInput::LogoutRequested);

        let server_acknowledged = match self.tokens.refresh_token() {
            Some(refresh_token) => {
                let request = ApiRequest::post(&self.endpoints.logout)
                    .with_json(json!({ "refresh_token": refresh_token }));
                match self.client.execute(request).await {
                    Ok(_) => true,
                    Err(e) => {
                        warn!(error = %e, "Server logout failed, clearing local session anyway");
                        false
                    }
                }
            }
            None => {
                debug!("No refresh token, skipping server logout");
                false
            }
        };

        self.tokens.clear_all();
        self.machine
            .apply_or_clear(SessionMachineInput::LogoutComplete);
        info!(server_acknowledged, "Logged out");

        LogoutOutcome {
            server_acknowledged,
            redirect_to: self.routes.login.clone(),
        }
    }

    /// Local verdict; never touches the network.
    pub fn check(&self) -> CheckOutcome {
        if self.tokens.pending_two_factor_user_id().is_some() || self.tokens.access_token().is_none()
        {
            return CheckOutcome {
                authenticated: false,
                redirect_to: Some(self.routes.login.clone()),
            };
        }
        CheckOutcome {
            authenticated: true,
            redirect_to: None,
        }
    }

    /// Cached identity, or the identity returned by one refresh attempt.
    pub async fn identity(&self) -> Option<UserIdentity> {
        if let Some(identity) = self.tokens.identity() {
            return Some(identity);
        }
        self.tokens.refresh_token()?;

        match self.coordinator.acquire_token().await {
            Ok(_) => self.tokens.identity(),
            Err(e) => {
                debug!(error = %e, "Refresh did not yield an identity");
                None
            }
        }
    }

    /// Role claims of the current access token.
    pub fn permissions(&self) -> Option<Vec<String>> {
        claims::roles(&self.tokens.access_token()?)
    }

    /// Classify a failed API call. 401 and an unrecoverable session mean
    /// logout; 403 is a permission issue and keeps the session.
    pub fn on_error(&self, error: &ApiError) -> ErrorVerdict {
        let logout = match error {
            ApiError::SessionExpired(_) => true,
            other => other.status() == Some(StatusCode::UNAUTHORIZED),
        };
        ErrorVerdict {
            logout,
            redirect_to: logout.then(|| self.routes.login.clone()),
        }
    }

    /// Send a login-style request and decode its grant.
    async fn exchange(
        &self,
        request: ApiRequest,
        rejection: FailureKind,
    ) -> Result<LoginGrant, AuthFailure> {
        let response = match self.client.send_unguarded(request).await {
            Ok(response) => response,
            Err(ApiError::Status(response)) => {
                let kind = if response.status().is_client_error() {
                    rejection
                } else {
                    FailureKind::Transport
                };
                return Err(AuthFailure::new(kind, failure_message(&response)));
            }
            Err(e) => return Err(AuthFailure::new(FailureKind::Transport, e.to_string())),
        };

        let body: Value = response.json().map_err(|e| {
            AuthFailure::new(
                FailureKind::MalformedResponse,
                format!("Response was not JSON: {e}"),
            )
        })?;
        let grant: LoginGrant = serde_json::from_value(locate_payload(&body, &GRANT_MARKERS).clone())
            .map_err(|e| AuthFailure::new(FailureKind::MalformedResponse, e.to_string()))?;

        if !grant.requires_2fa && grant.access_token.as_deref().unwrap_or_default().is_empty() {
            return Err(AuthFailure::new(rejection, failure_message(&response)));
        }
        Ok(grant)
    }

    fn begin_two_factor(&self, grant: LoginGrant) -> LoginOutcome {
        let Some(user_id) = grant.id_users.filter(|id| !id.is_empty()) else {
            return LoginOutcome::Failed(AuthFailure::new(
                FailureKind::MalformedResponse,
                "Two-factor response did not include a user id",
            ));
        };

        if let Err(e) = self.tokens.set_pending_two_factor_user_id(&user_id) {
            return LoginOutcome::Failed(AuthFailure::new(FailureKind::Storage, e.to_string()));
        }

        LoginOutcome::TwoFactorRequired {
            user_id,
            redirect_to: self.routes.two_factor.clone(),
        }
    }

    fn complete_login(&self, grant: LoginGrant) -> LoginOutcome {
        let (Some(access_token), Some(refresh_token)) = (grant.access_token, grant.refresh_token)
        else {
            return LoginOutcome::Failed(AuthFailure::new(
                FailureKind::MalformedResponse,
                "Login response did not include both tokens",
            ));
        };

        let expires_at = grant
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(secs))
            .or_else(|| claims::expires_at(&access_token));
        let pair = TokenPair {
            access_token,
            refresh_token,
            expires_at,
        };

        if let Err(e) = self.tokens.establish(&pair, grant.user.as_ref()) {
            return LoginOutcome::Failed(AuthFailure::new(FailureKind::Storage, e.to_string()));
        }

        LoginOutcome::Authenticated {
            identity: grant.user,
            redirect_to: self.routes.home.clone(),
        }
    }
}

fn failure_message(response: &ApiResponse) -> String {
    response
        .envelope::<Value>()
        .ok()
        .and_then(|envelope| envelope.failure_message())
        .unwrap_or_else(|| format!("HTTP {}", response.status()))
}
