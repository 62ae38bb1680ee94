//! Login, second-factor verification and identity lookup.

use super::harness::{TestHarness, FRESH_TOKEN, REFRESH_TOKEN};
use crate::{AuthError, AuthSession, Credentials, FailureKind, LoginOutcome, SessionState, TokenPair};
use serde_json::json;
use session_config_and_utils::Config;
use session_storage::FileStorage;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn credentials() -> Credentials {
    Credentials::new("ada@example.com", "correct horse")
}

async fn mount_login(server: &MockServer, status: u16, body: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(body_json(json!({
            "email": "ada@example.com",
            "password": "correct horse",
        })))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .expect(1)
        .mount(server)
        .await;
}

fn granted() -> serde_json::Value {
    json!({
        "status": "success",
        "data": {
            "access_token": FRESH_TOKEN,
            "refresh_token": REFRESH_TOKEN,
            "expires_in": 3600,
            "user": {"id": 7, "name": "Ada", "email": "ada@example.com"}
        }
    })
}

#[tokio::test]
async fn login_stores_tokens_and_identity() {
    let h = TestHarness::signed_out().await;
    mount_login(&h.server, 200, granted()).await;

    let outcome = h.session.login(&credentials()).await;

    match outcome {
        LoginOutcome::Authenticated {
            identity,
            redirect_to,
        } => {
            assert_eq!(identity.unwrap().id, "7");
            assert_eq!(redirect_to, "/");
        }
        other => panic!("expected authenticated, got {other:?}"),
    }
    let pair = h.session.tokens().get().unwrap();
    assert_eq!(pair.access_token, FRESH_TOKEN);
    assert_eq!(pair.refresh_token, REFRESH_TOKEN);
    assert!(pair.expires_at.is_some());
    assert_eq!(h.session.tokens().identity().unwrap().name.as_deref(), Some("Ada"));
    assert_eq!(h.session.state(), SessionState::SignedIn);
    assert_eq!(h.notifications.events(), vec![true]);
    assert!(h.session.check().authenticated);
}

#[tokio::test]
async fn wrong_password_fails_without_touching_storage() {
    let h = TestHarness::signed_out().await;
    mount_login(
        &h.server,
        401,
        json!({"status": "error", "message": "Invalid email or password"}),
    )
    .await;

    let outcome = h.session.login(&credentials()).await;

    match outcome {
        LoginOutcome::Failed(failure) => {
            assert_eq!(failure.kind, FailureKind::CredentialsInvalid);
            assert_eq!(failure.message, "Invalid email or password");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(h.session.tokens().get(), None);
    assert_eq!(h.session.state(), SessionState::SignedOut);
    assert!(h.notifications.events().is_empty());
}

#[tokio::test]
async fn server_error_on_login_is_transport_failure() {
    let h = TestHarness::signed_out().await;
    mount_login(&h.server, 503, json!({})).await;

    match h.session.login(&credentials()).await {
        LoginOutcome::Failed(failure) => assert_eq!(failure.kind, FailureKind::Transport),
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn two_factor_login_then_verification() {
    let h = TestHarness::signed_out().await;
    mount_login(
        &h.server,
        200,
        json!({"status": "success", "data": {"requires_2fa": true, "id_users": 42}}),
    )
    .await;

    let outcome = h.session.login(&credentials()).await;
    assert_eq!(
        outcome,
        LoginOutcome::TwoFactorRequired {
            user_id: "42".to_string(),
            redirect_to: "/verify-2fa".to_string(),
        }
    );
    assert_eq!(
        h.session.tokens().pending_two_factor_user_id().as_deref(),
        Some("42")
    );
    assert_eq!(h.session.tokens().access_token(), None);
    assert_eq!(h.session.state(), SessionState::AwaitingSecondFactor);
    assert!(!h.session.check().authenticated);

    Mock::given(method("POST"))
        .and(path("/api/auth/verify-2fa"))
        .and(body_json(json!({"id_users": 42, "code": "123456"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(granted()))
        .expect(1)
        .mount(&h.server)
        .await;

    let verified = h.session.verify_two_factor("123456").await.unwrap();

    assert!(verified.is_authenticated());
    assert_eq!(h.session.tokens().pending_two_factor_user_id(), None);
    assert_eq!(
        h.session.tokens().access_token().as_deref(),
        Some(FRESH_TOKEN)
    );
    assert_eq!(h.session.state(), SessionState::SignedIn);
    assert_eq!(h.notifications.events(), vec![true]);
}

#[tokio::test]
async fn rejected_code_keeps_pending_verification() {
    let h = TestHarness::signed_out().await;
    h.session
        .tokens()
        .set_pending_two_factor_user_id("42")
        .unwrap();
    h.session.restore();
    Mock::given(method("POST"))
        .and(path("/api/auth/verify-2fa"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"message": "Invalid code"})),
        )
        .expect(1)
        .mount(&h.server)
        .await;

    match h.session.verify_two_factor("000000").await.unwrap() {
        LoginOutcome::Failed(failure) => assert_eq!(failure.kind, FailureKind::InvalidCode),
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(
        h.session.tokens().pending_two_factor_user_id().as_deref(),
        Some("42")
    );
    assert_eq!(h.session.state(), SessionState::AwaitingSecondFactor);
}

#[tokio::test]
async fn verification_without_pending_login_is_an_error() {
    let h = TestHarness::signed_out().await;
    let err = h.session.verify_two_factor("123456").await.unwrap_err();
    assert!(matches!(err, AuthError::NoPendingVerification));
}

#[tokio::test]
async fn identity_is_fetched_through_one_refresh() {
    let h = TestHarness::signed_out().await;
    h.session
        .tokens()
        .set(&TokenPair::new("old", REFRESH_TOKEN))
        .unwrap();
    h.session.restore();
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .and(body_json(json!({"refresh_token": REFRESH_TOKEN})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": FRESH_TOKEN,
            "user": {"id": "u-1", "email": "ada@example.com"}
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    let identity = h.session.identity().await.unwrap();
    assert_eq!(identity.id, "u-1");

    // Cached from now on
    let again = h.session.identity().await.unwrap();
    assert_eq!(again, identity);
    assert_eq!(
        h.session.tokens().access_token().as_deref(),
        Some(FRESH_TOKEN)
    );
}

#[tokio::test]
async fn session_survives_restart_with_file_storage() {
    let server = MockServer::start().await;
    mount_login(&server, 200, granted()).await;
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("session.json");
    let config = Config::for_api(format!("{}/api", server.uri()));

    {
        let session =
            AuthSession::new(&config, Box::new(FileStorage::open(&file).unwrap())).unwrap();
        assert!(session.login(&credentials()).await.is_authenticated());
    }

    let restarted =
        AuthSession::new(&config, Box::new(FileStorage::open(&file).unwrap())).unwrap();
    assert_eq!(restarted.state(), SessionState::SignedIn);
    assert!(restarted.check().authenticated);
    assert_eq!(restarted.tokens().identity().unwrap().id, "7");
}

#[tokio::test]
async fn permissions_come_from_access_token_roles() {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    let claims = URL_SAFE_NO_PAD.encode(json!({"sub": "7", "roles": ["admin"]}).to_string());
    let access_token = format!("e30.{claims}.sig");

    let h = TestHarness::signed_out().await;
    assert_eq!(h.session.permissions(), None);

    mount_login(
        &h.server,
        200,
        json!({"access_token": access_token, "refresh_token": REFRESH_TOKEN}),
    )
    .await;
    assert!(h.session.login(&credentials()).await.is_authenticated());

    assert_eq!(h.session.permissions(), Some(vec!["admin".to_string()]));
}

#[tokio::test]
async fn two_factor_challenge_over_live_session_signs_out_verdict() {
    let h = TestHarness::signed_in().await;
    mount_login(
        &h.server,
        200,
        json!({"status": "success", "data": {"requires_2fa": true, "id_users": 42}}),
    )
    .await;

    let outcome = h.session.login(&credentials()).await;

    assert!(matches!(outcome, LoginOutcome::TwoFactorRequired { .. }));
    assert_eq!(h.session.tokens().access_token(), None);
    assert_eq!(h.session.state(), SessionState::AwaitingSecondFactor);
    assert!(!h.session.broadcaster().is_authenticated());
    assert!(!h.session.check().authenticated);
    assert_eq!(h.notifications.events(), vec![true, false]);
}
