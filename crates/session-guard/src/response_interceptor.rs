//! Invalidation detection and recovery on inbound results.
//!
//! Two signals mark a session as stale:
//! - **soft**: a 2xx envelope with `logged_in: false`
//! - **hard**: HTTP 401
//!
//! Each signal gets one replay per request, tracked by [`RequestAttempts`].
//! Calls to the refresh and logout endpoints are never inspected.
//!
//! [`RequestAttempts`]: crate::RequestAttempts

use crate::error::{ApiError, ApiResult};
use crate::refresh::RefreshCoordinator;
use crate::request::{ApiRequest, ApiResponse};
use crate::session_machine::{SessionMachine, SessionMachineInput};
use crate::token_store::TokenStore;
use reqwest::StatusCode;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What the client should do with a result.
#[derive(Debug)]
pub enum Disposition {
    /// Hand the result to the caller.
    Deliver(ApiResult<ApiResponse>),
    /// Send the request again; the store now holds a fresh token.
    Replay,
}

pub struct ResponseInterceptor {
    tokens: Arc<TokenStore>,
    coordinator: Arc<RefreshCoordinator>,
    machine: Arc<SessionMachine>,
    passthrough: Vec<String>,
}

impl ResponseInterceptor {
    /// `passthrough` lists the endpoint paths (refresh, logout) that are
    /// delivered as-is.
    pub fn new(
        tokens: Arc<TokenStore>,
        coordinator: Arc<RefreshCoordinator>,
        machine: Arc<SessionMachine>,
        passthrough: Vec<String>,
    ) -> Self {
        Self {
            tokens,
            coordinator,
            machine,
            passthrough,
        }
    }

    fn is_passthrough(&self, path: &str) -> bool {
        let path = normalize(path);
        self.passthrough.iter().any(|p| normalize(p) == path)
    }

    pub async fn inspect(
        &self,
        request: &mut ApiRequest,
        result: ApiResult<ApiResponse>,
    ) -> Disposition {
        if self.is_passthrough(&request.path) {
            return Disposition::Deliver(result);
        }

        match result {
            Ok(response) => self.inspect_success(request, response).await,
            Err(error) => self.inspect_failure(request, error).await,
        }
    }

    async fn inspect_success(&self, request: &mut ApiRequest, response: ApiResponse) -> Disposition {
        if response.logged_in() != Some(false) || self.tokens.refresh_token().is_none() {
            return Disposition::Deliver(Ok(response));
        }

        if request.attempts.retried_logged_out {
            warn!(
                path = %request.path,
                "Session still reported logged out after refresh, signing out"
            );
            self.tokens.clear();
            self.machine
                .apply_or_clear(SessionMachineInput::SessionExpired);
            return Disposition::Deliver(Ok(response));
        }

        info!(path = %request.path, "Response reports logged out, refreshing session");
        request.attempts.retried_logged_out = true;
        self.recover(request).await
    }

    async fn inspect_failure(&self, request: &mut ApiRequest, error: ApiError) -> Disposition {
        let status = match &error {
            ApiError::Status(response) => Some(response.status()),
            _ => None,
        };

        if status == Some(StatusCode::FORBIDDEN) && self.tokens.access_token().is_some() {
            warn!(path = %request.path, "Request forbidden for signed-in user, permission issue");
        }

        if status != Some(StatusCode::UNAUTHORIZED) {
            return Disposition::Deliver(Err(error));
        }

        if request.attempts.retried_unauthorized {
            warn!(
                path = %request.path,
                "Request still unauthorized after refresh, signing out"
            );
            self.tokens.clear();
            self.machine
                .apply_or_clear(SessionMachineInput::SessionExpired);
            return Disposition::Deliver(Err(error));
        }

        if self.tokens.refresh_token().is_none() {
            debug!(path = %request.path, "401 without a refresh token, nothing to recover");
            return Disposition::Deliver(Err(error));
        }

        info!(path = %request.path, "Request unauthorized, refreshing session");
        request.attempts.retried_unauthorized = true;
        self.recover(request).await
    }

    async fn recover(&self, request: &ApiRequest) -> Disposition {
        match self.coordinator.acquire_token().await {
            Ok(_) => {
                debug!(path = %request.path, "Session refreshed, replaying request");
                Disposition::Replay
            }
            Err(e) => Disposition::Deliver(Err(ApiError::SessionExpired(e))),
        }
    }
}

fn normalize(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    path.trim_matches('/')
}
