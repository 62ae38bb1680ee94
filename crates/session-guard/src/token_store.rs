//! Durable token storage.
//!
//! `TokenStore` is the only shared mutable resource of the session layer. All
//! writes go through one `SessionStorage::commit` batch under the write side
//! of a gate, so a reader never observes half of a token pair.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use reqwest::cookie::Jar;
use serde::{Deserialize, Serialize};
use session_storage::{SessionStorage, StorageKeys, StorageResult};
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// Name of the cookie mirroring the access token.
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

/// Access/refresh credential pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// True once `expires_at` has passed. Pairs without an expiry never report
    /// expired; the server decides.
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Utc::now())
    }
}

/// Cached identity of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    #[serde(deserialize_with = "crate::envelope::string_or_number")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

struct CookieMirror {
    jar: Arc<Jar>,
    url: Url,
    max_age_secs: u64,
}

impl CookieMirror {
    fn set(&self, access_token: &str) {
        self.jar.add_cookie_str(
            &format!(
                "{ACCESS_TOKEN_COOKIE}={access_token}; Max-Age={}; Path=/",
                self.max_age_secs
            ),
            &self.url,
        );
    }

    fn expire(&self) {
        self.jar
            .add_cookie_str(&format!("{ACCESS_TOKEN_COOKIE}=; Max-Age=0; Path=/"), &self.url);
    }
}

/// Token storage over a [`SessionStorage`] backend.
pub struct TokenStore {
    storage: Box<dyn SessionStorage>,
    gate: RwLock<()>,
    cookie: Option<CookieMirror>,
}

impl TokenStore {
    pub fn new(storage: Box<dyn SessionStorage>) -> Self {
        Self {
            storage,
            gate: RwLock::new(()),
            cookie: None,
        }
    }

    /// Mirror the access token into `jar` as a cookie scoped to `url`.
    pub fn with_cookie_mirror(mut self, jar: Arc<Jar>, url: Url, max_age_secs: u64) -> Self {
        self.cookie = Some(CookieMirror {
            jar,
            url,
            max_age_secs,
        });
        self
    }

    /// Current token pair, `None` unless both tokens are stored.
    pub fn get(&self) -> Option<TokenPair> {
        let _read = self.gate.read();
        let access_token = self.read(StorageKeys::ACCESS_TOKEN)?;
        let refresh_token = self.read(StorageKeys::REFRESH_TOKEN)?;
        let expires_at = self.read(StorageKeys::ACCESS_TOKEN_EXPIRES_AT).and_then(|raw| {
            DateTime::parse_from_rfc3339(&raw)
                .map(|at| at.with_timezone(&Utc))
                .map_err(|e| warn!(error = %e, "Ignoring unparseable token expiry"))
                .ok()
        });

        Some(TokenPair {
            access_token,
            refresh_token,
            expires_at,
        })
    }

    /// Store a pair, replacing both tokens and the expiry in one batch.
    pub fn set(&self, pair: &TokenPair) -> StorageResult<()> {
        self.write_session(pair, None, false)
    }

    /// Store a pair together with the identity it belongs to and drop any
    /// pending two-factor marker.
    pub fn establish(&self, pair: &TokenPair, identity: Option<&UserIdentity>) -> StorageResult<()> {
        self.write_session(pair, identity, true)
    }

    /// Replace the access token after a refresh. The refresh token is only
    /// replaced when a new one was issued.
    pub fn update_access_token(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> StorageResult<()> {
        let expiry = expires_at.map(|at| at.to_rfc3339());
        let mut upserts = vec![(StorageKeys::ACCESS_TOKEN, access_token)];
        if let Some(refresh_token) = refresh_token {
            upserts.push((StorageKeys::REFRESH_TOKEN, refresh_token));
        }
        let mut removals = Vec::new();
        match expiry.as_deref() {
            Some(expiry) => upserts.push((StorageKeys::ACCESS_TOKEN_EXPIRES_AT, expiry)),
            None => removals.push(StorageKeys::ACCESS_TOKEN_EXPIRES_AT),
        }

        let _write = self.gate.write();
        self.storage.commit(&upserts, &removals)?;
        self.mirror(Some(access_token));
        debug!(rotated_refresh = refresh_token.is_some(), "Access token updated");
        Ok(())
    }

    /// Remove both tokens, the expiry and the cached identity together.
    ///
    /// Storage failures are logged; the cookie mirror is expired regardless.
    pub fn clear(&self) {
        self.remove(&StorageKeys::SESSION, true);
    }

    /// [`clear`](Self::clear) plus the pending two-factor marker.
    pub fn clear_all(&self) {
        let mut keys = StorageKeys::SESSION.to_vec();
        keys.push(StorageKeys::PENDING_TWO_FACTOR_USER_ID);
        self.remove(&keys, true);
    }

    pub fn access_token(&self) -> Option<String> {
        let _read = self.gate.read();
        self.read(StorageKeys::ACCESS_TOKEN)
    }

    pub fn refresh_token(&self) -> Option<String> {
        let _read = self.gate.read();
        self.read(StorageKeys::REFRESH_TOKEN)
    }

    /// Cached identity. A corrupt record reads as `None`.
    pub fn identity(&self) -> Option<UserIdentity> {
        let raw = {
            let _read = self.gate.read();
            self.read(StorageKeys::USER)?
        };
        serde_json::from_str(&raw)
            .map_err(|e| warn!(error = %e, "Ignoring unreadable cached identity"))
            .ok()
    }

    pub fn set_identity(&self, identity: &UserIdentity) -> StorageResult<()> {
        let json = encode_identity(identity)?;
        let _write = self.gate.write();
        self.storage.set(StorageKeys::USER, &json)
    }

    pub fn pending_two_factor_user_id(&self) -> Option<String> {
        let _read = self.gate.read();
        self.read(StorageKeys::PENDING_TWO_FACTOR_USER_ID)
    }

    /// Record a login that still needs its second factor. Any previous
    /// session is dropped in the same batch.
    pub fn set_pending_two_factor_user_id(&self, user_id: &str) -> StorageResult<()> {
        let _write = self.gate.write();
        self.storage.commit(
            &[(StorageKeys::PENDING_TWO_FACTOR_USER_ID, user_id)],
            &StorageKeys::SESSION,
        )?;
        self.mirror(None);
        Ok(())
    }

    pub fn clear_pending_two_factor(&self) {
        self.remove(&[StorageKeys::PENDING_TWO_FACTOR_USER_ID], false);
    }

    // A bare `set` keeps whatever identity is cached; `establish` replaces it.
    fn write_session(
        &self,
        pair: &TokenPair,
        identity: Option<&UserIdentity>,
        replace_identity: bool,
    ) -> StorageResult<()> {
        let expiry = pair.expires_at.map(|at| at.to_rfc3339());
        let user = identity.map(encode_identity).transpose()?;

        let mut upserts = vec![
            (StorageKeys::ACCESS_TOKEN, pair.access_token.as_str()),
            (StorageKeys::REFRESH_TOKEN, pair.refresh_token.as_str()),
        ];
        let mut removals = vec![StorageKeys::PENDING_TWO_FACTOR_USER_ID];
        match expiry.as_deref() {
            Some(expiry) => upserts.push((StorageKeys::ACCESS_TOKEN_EXPIRES_AT, expiry)),
            None => removals.push(StorageKeys::ACCESS_TOKEN_EXPIRES_AT),
        }
        match user.as_deref() {
            Some(user) => upserts.push((StorageKeys::USER, user)),
            None if replace_identity => removals.push(StorageKeys::USER),
            None => {}
        }

        let _write = self.gate.write();
        self.storage.commit(&upserts, &removals)?;
        self.mirror(Some(&pair.access_token));
        Ok(())
    }

    fn remove(&self, keys: &[&str], expire_cookie: bool) {
        let _write = self.gate.write();
        if let Err(e) = self.storage.commit(&[], keys) {
            warn!(error = %e, "Failed to clear session storage");
        }
        if expire_cookie {
            self.mirror(None);
        }
    }

    fn mirror(&self, access_token: Option<&str>) {
        if let Some(cookie) = &self.cookie {
            match access_token {
                Some(token) => cookie.set(token),
                None => cookie.expire(),
            }
        }
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.storage.get(key) {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                warn!(key, error = %e, "Session storage read failed, treating as signed out");
                None
            }
        }
    }
}

fn encode_identity(identity: &UserIdentity) -> StorageResult<String> {
    serde_json::to_string(identity)
        .map_err(|e| session_storage::StorageError::Encoding(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use reqwest::cookie::CookieStore;
    use session_storage::{MemoryStorage, UnavailableStorage};

    fn store() -> TokenStore {
        TokenStore::new(Box::new(MemoryStorage::new()))
    }

    fn identity() -> UserIdentity {
        UserIdentity {
            id: "7".to_string(),
            name: Some("Ada".to_string()),
            email: Some("ada@example.com".to_string()),
        }
    }

    #[test]
    fn test_round_trip() {
        let store = store();
        let pair = TokenPair::new("access-1", "refresh-1")
            .with_expiry(Utc.with_ymd_and_hms(2030, 1, 2, 3, 4, 5).unwrap());

        store.set(&pair).unwrap();
        assert_eq!(store.get(), Some(pair));
    }

    #[test]
    fn test_empty_store_has_no_session() {
        let store = store();
        assert_eq!(store.get(), None);
        assert_eq!(store.access_token(), None);
        assert_eq!(store.identity(), None);
    }

    #[test]
    fn test_unavailable_storage_reads_as_signed_out() {
        let store = TokenStore::new(Box::new(UnavailableStorage));
        assert_eq!(store.get(), None);
        assert_eq!(store.refresh_token(), None);
        assert!(store.set(&TokenPair::new("a", "r")).is_err());
        // Must not panic
        store.clear_all();
    }

    #[test]
    fn test_update_access_token_keeps_refresh_when_not_rotated() {
        let store = store();
        store.set(&TokenPair::new("old", "refresh-1")).unwrap();

        store.update_access_token("new", None, None).unwrap();
        let pair = store.get().unwrap();
        assert_eq!(pair.access_token, "new");
        assert_eq!(pair.refresh_token, "refresh-1");

        store
            .update_access_token("newer", Some("refresh-2"), None)
            .unwrap();
        assert_eq!(store.refresh_token().as_deref(), Some("refresh-2"));
    }

    #[test]
    fn test_clear_removes_tokens_and_identity_together() {
        let store = store();
        store
            .establish(&TokenPair::new("a", "r"), Some(&identity()))
            .unwrap();
        assert_eq!(store.identity(), Some(identity()));

        store.clear();
        assert_eq!(store.access_token(), None);
        assert_eq!(store.refresh_token(), None);
        assert_eq!(store.identity(), None);
    }

    #[test]
    fn test_pending_two_factor_lifecycle() {
        let store = store();
        store.set(&TokenPair::new("stale", "stale")).unwrap();

        store.set_pending_two_factor_user_id("42").unwrap();
        assert_eq!(store.pending_two_factor_user_id().as_deref(), Some("42"));
        assert_eq!(store.access_token(), None);

        // clear() leaves the marker, clear_all() removes it
        store.clear();
        assert_eq!(store.pending_two_factor_user_id().as_deref(), Some("42"));
        store.clear_all();
        assert_eq!(store.pending_two_factor_user_id(), None);
    }

    #[test]
    fn test_establish_drops_pending_marker() {
        let store = store();
        store.set_pending_two_factor_user_id("42").unwrap();

        store
            .establish(&TokenPair::new("a", "r"), Some(&identity()))
            .unwrap();
        assert_eq!(store.pending_two_factor_user_id(), None);
        assert_eq!(store.access_token().as_deref(), Some("a"));
    }

    #[test]
    fn test_set_keeps_cached_identity() {
        let store = store();
        store
            .establish(&TokenPair::new("a", "r"), Some(&identity()))
            .unwrap();
        store.set(&TokenPair::new("b", "r2")).unwrap();
        assert_eq!(store.identity(), Some(identity()));
    }

    #[test]
    fn test_expiry() {
        let past = TokenPair::new("a", "r").with_expiry(Utc::now() - Duration::minutes(1));
        let future = TokenPair::new("a", "r").with_expiry(Utc::now() + Duration::minutes(1));
        assert!(past.is_expired());
        assert!(!future.is_expired());
        assert!(!TokenPair::new("a", "r").is_expired());
    }

    #[test]
    fn test_identity_accepts_numeric_id() {
        let identity: UserIdentity =
            serde_json::from_str(r#"{"id": 42, "email": "x@example.com"}"#).unwrap();
        assert_eq!(identity.id, "42");
        assert_eq!(identity.name, None);
    }

    #[test]
    fn test_cookie_mirror_follows_access_token() {
        let jar = Arc::new(Jar::default());
        let url = Url::parse("http://localhost:8080/api").unwrap();
        let store = TokenStore::new(Box::new(MemoryStorage::new())).with_cookie_mirror(
            jar.clone(),
            url.clone(),
            3600,
        );

        let has_cookie = |expected: &str| {
            jar.cookies(&url)
                .map(|header| header.to_str().unwrap().contains(expected))
                .unwrap_or(false)
        };

        store.set(&TokenPair::new("tok-1", "r")).unwrap();
        assert!(has_cookie("access_token=tok-1"));

        store.update_access_token("tok-2", None, None).unwrap();
        assert!(has_cookie("access_token=tok-2"));

        store.clear();
        assert!(!has_cookie("access_token=tok"));
    }
}
