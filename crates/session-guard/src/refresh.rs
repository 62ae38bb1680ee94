//! Single-flight refresh-token exchange.
//!
//! The first caller of [`RefreshCoordinator::acquire_token`] that finds the
//! coordinator idle becomes the leader and performs the exchange. Every caller
//! arriving while it runs is parked on a oneshot waiter. When the exchange
//! settles the store is updated first, then every waiter is settled in FIFO
//! order and the queue is emptied in one step.

use crate::envelope::locate_payload;
use crate::request::endpoint_url;
use crate::session_machine::{SessionMachine, SessionMachineInput};
use crate::token_store::{TokenStore, UserIdentity};
use crate::RefreshError;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use url::Url;

type RefreshWaiter = oneshot::Sender<Result<String, RefreshError>>;

enum RefreshState {
    Idle,
    Refreshing { waiters: VecDeque<RefreshWaiter> },
}

/// Refresh endpoint request body.
#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Refresh endpoint grant, found at the envelope root or under `data`.
#[derive(Debug, Default, Deserialize)]
struct RefreshGrant {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    user: Option<UserIdentity>,
}

/// Outcome of a successful exchange.
struct Refreshed {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    user: Option<UserIdentity>,
}

/// Owns the refresh gate and its waiter queue.
pub struct RefreshCoordinator {
    http: reqwest::Client,
    refresh_url: Url,
    tokens: Arc<TokenStore>,
    machine: Arc<SessionMachine>,
    state: Mutex<RefreshState>,
}

impl RefreshCoordinator {
    pub fn new(
        http: reqwest::Client,
        api_url: &Url,
        refresh_path: &str,
        tokens: Arc<TokenStore>,
        machine: Arc<SessionMachine>,
    ) -> Result<Self, url::ParseError> {
        Ok(Self {
            http,
            refresh_url: endpoint_url(api_url, refresh_path)?,
            tokens,
            machine,
            state: Mutex::new(RefreshState::Idle),
        })
    }

    /// True while an exchange is in flight.
    pub fn is_refreshing(&self) -> bool {
        matches!(*self.state.lock(), RefreshState::Refreshing { .. })
    }

    /// Number of callers parked behind the running exchange.
    pub fn queued(&self) -> usize {
        match &*self.state.lock() {
            RefreshState::Refreshing { waiters } => waiters.len(),
            RefreshState::Idle => 0,
        }
    }

    /// Obtain a fresh access token, joining the running exchange if there is
    /// one.
    pub async fn acquire_token(&self) -> Result<String, RefreshError> {
        let parked = {
            let mut state = self.state.lock();
            match &mut *state {
                RefreshState::Refreshing { waiters } => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push_back(tx);
                    debug!(queued = waiters.len(), "Refresh in flight, waiting for it");
                    Some(rx)
                }
                RefreshState::Idle => {
                    *state = RefreshState::Refreshing {
                        waiters: VecDeque::new(),
                    };
                    None
                }
            }
        };

        if let Some(rx) = parked {
            return rx.await.unwrap_or(Err(RefreshError::Abandoned));
        }

        let mut leader = LeaderGuard {
            coordinator: self,
            settled: false,
        };
        self.machine.apply(SessionMachineInput::InvalidationDetected);

        let outcome = match self.exchange().await {
            Ok(refreshed) => self.commit(refreshed),
            Err(e) => Err(e),
        };

        if let Err(e) = &outcome {
            warn!(error = %e, "Session refresh failed, clearing session");
            self.tokens.clear();
            self.machine.apply_or_clear(SessionMachineInput::RefreshFailed);
        }

        leader.settle(&outcome);
        outcome
    }

    async fn exchange(&self) -> Result<Refreshed, RefreshError> {
        let refresh_token = self
            .tokens
            .refresh_token()
            .ok_or(RefreshError::MissingRefreshToken)?;

        debug!(url = %self.refresh_url, "Refreshing access token");

        let response = self
            .http
            .post(self.refresh_url.clone())
            .json(&RefreshRequest {
                refresh_token: &refresh_token,
            })
            .send()
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, "Refresh endpoint rejected the exchange");
            return Err(RefreshError::Rejected {
                status: status.as_u16(),
            });
        }

        let body: Value = response.json().await.map_err(|e| {
            warn!(error = %e, "Refresh response was not JSON");
            RefreshError::MissingAccessToken
        })?;
        let grant: RefreshGrant =
            serde_json::from_value(locate_payload(&body, &["access_token"]).clone())
                .unwrap_or_default();

        let access_token = grant
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or(RefreshError::MissingAccessToken)?;

        Ok(Refreshed {
            access_token,
            refresh_token: grant.refresh_token.filter(|t| !t.is_empty()),
            expires_at: grant
                .expires_in
                .map(|secs| Utc::now() + Duration::seconds(secs)),
            user: grant.user,
        })
    }

    fn commit(&self, refreshed: Refreshed) -> Result<String, RefreshError> {
        self.tokens
            .update_access_token(
                &refreshed.access_token,
                refreshed.refresh_token.as_deref(),
                refreshed.expires_at,
            )
            .map_err(|e| RefreshError::Storage(e.to_string()))?;

        if let Some(user) = &refreshed.user {
            if let Err(e) = self.tokens.set_identity(user) {
                warn!(error = %e, "Failed to cache identity from refresh");
            }
        }

        self.machine.apply(SessionMachineInput::RefreshSucceeded);
        info!(
            rotated_refresh = refreshed.refresh_token.is_some(),
            "Access token refreshed"
        );
        Ok(refreshed.access_token)
    }

    /// Empty the queue, return the gate to idle, then settle every waiter.
    fn drain(&self, outcome: &Result<String, RefreshError>) {
        let waiters = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, RefreshState::Idle) {
                RefreshState::Refreshing { waiters } => waiters,
                RefreshState::Idle => VecDeque::new(),
            }
        };

        if !waiters.is_empty() {
            debug!(waiters = waiters.len(), ok = outcome.is_ok(), "Settling refresh waiters");
        }
        for waiter in waiters {
            // A waiter whose caller went away is simply skipped.
            let _ = waiter.send(outcome.clone());
        }
    }
}

/// Settles the queue if the leading future is dropped mid-exchange.
struct LeaderGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl LeaderGuard<'_> {
    fn settle(&mut self, outcome: &Result<String, RefreshError>) {
        self.settled = true;
        self.coordinator.drain(outcome);
    }
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!("Refresh leader dropped before completion, releasing waiters");
            self.coordinator.drain(&Err(RefreshError::Abandoned));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcaster::SessionStateBroadcaster;
    use crate::session_machine::SessionState;
    use crate::token_store::TokenPair;
    use serde_json::json;
    use session_storage::MemoryStorage;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Fixture {
        coordinator: Arc<RefreshCoordinator>,
        tokens: Arc<TokenStore>,
        machine: Arc<SessionMachine>,
    }

    fn fixture(server: &MockServer) -> Fixture {
        let tokens = Arc::new(TokenStore::new(Box::new(MemoryStorage::new())));
        tokens.set(&TokenPair::new("stale", "refresh-1")).unwrap();
        let machine = Arc::new(SessionMachine::new(Arc::new(SessionStateBroadcaster::new(
            false,
        ))));
        machine.apply(SessionMachineInput::SessionRestored);
        let api = Url::parse(&format!("{}/api", server.uri())).unwrap();
        let coordinator = Arc::new(
            RefreshCoordinator::new(
                reqwest::Client::new(),
                &api,
                "/auth/refresh",
                tokens.clone(),
                machine.clone(),
            )
            .unwrap(),
        );
        Fixture {
            coordinator,
            tokens,
            machine,
        }
    }

    #[tokio::test]
    async fn test_refresh_success_updates_store() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/refresh"))
            .and(body_json(json!({"refresh_token": "refresh-1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "data": {"access_token": "fresh", "refresh_token": "refresh-2", "expires_in": 900}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let f = fixture(&server);
        let token = f.coordinator.acquire_token().await.unwrap();

        assert_eq!(token, "fresh");
        let pair = f.tokens.get().unwrap();
        assert_eq!(pair.access_token, "fresh");
        assert_eq!(pair.refresh_token, "refresh-2");
        assert!(pair.expires_at.is_some());
        assert!(!f.coordinator.is_refreshing());
        assert_eq!(f.machine.state(), SessionState::SignedIn);
    }

    #[tokio::test]
    async fn test_refresh_without_rotation_keeps_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "fresh"})))
            .mount(&server)
            .await;

        let f = fixture(&server);
        f.coordinator.acquire_token().await.unwrap();

        assert_eq!(f.tokens.refresh_token().as_deref(), Some("refresh-1"));
        assert_eq!(f.tokens.access_token().as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_missing_access_token_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/refresh"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"status": "success", "data": {}})),
            )
            .mount(&server)
            .await;

        let f = fixture(&server);
        let err = f.coordinator.acquire_token().await.unwrap_err();

        assert_eq!(err, RefreshError::MissingAccessToken);
        assert_eq!(f.tokens.get(), None);
        assert_eq!(f.machine.state(), SessionState::SignedOut);
    }

    #[tokio::test]
    async fn test_rejected_exchange_clears_store() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/refresh"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let f = fixture(&server);
        let err = f.coordinator.acquire_token().await.unwrap_err();

        assert_eq!(err, RefreshError::Rejected { status: 401 });
        assert_eq!(f.tokens.access_token(), None);
        assert_eq!(f.tokens.refresh_token(), None);
    }

    #[tokio::test]
    async fn test_missing_refresh_token_skips_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/refresh"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let f = fixture(&server);
        f.tokens.clear();

        let err = f.coordinator.acquire_token().await.unwrap_err();
        assert_eq!(err, RefreshError::MissingRefreshToken);
        assert!(!f.coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_exchange() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/refresh"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": "shared"}))
                    .set_delay(std::time::Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let f = fixture(&server);
        let calls = (0..5).map(|_| {
            let coordinator = f.coordinator.clone();
            async move { coordinator.acquire_token().await }
        });
        let results = futures::future::join_all(calls).await;

        assert!(results.iter().all(|r| r.as_deref() == Ok("shared")));
        assert_eq!(f.coordinator.queued(), 0);
        assert!(!f.coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn test_dropped_leader_releases_waiters() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/refresh"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": "never"}))
                    .set_delay(std::time::Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let f = fixture(&server);
        let leader = {
            let coordinator = f.coordinator.clone();
            tokio::spawn(async move { coordinator.acquire_token().await })
        };
        while !f.coordinator.is_refreshing() {
            tokio::task::yield_now().await;
        }

        let waiter = {
            let coordinator = f.coordinator.clone();
            tokio::spawn(async move { coordinator.acquire_token().await })
        };
        while f.coordinator.queued() == 0 {
            tokio::task::yield_now().await;
        }

        leader.abort();
        let result = waiter.await.unwrap();
        assert_eq!(result, Err(RefreshError::Abandoned));
        assert!(!f.coordinator.is_refreshing());
    }
}
