//! Client-side session and request-resilience layer.
//!
//! This crate provides:
//! - Durable token storage with a mirrored access-token cookie
//! - Request/response interceptors that stamp credentials and detect
//!   invalidation (HTTP 401 or `logged_in: false`)
//! - Single-flight refresh-token exchange shared by concurrent requests
//! - A session facade for login, second-factor verification and logout
//! - Explicit FSM-based session state with verdict change notifications

mod broadcaster;
pub mod claims;
mod client;
mod envelope;
mod error;
mod refresh;
mod request;
mod request_interceptor;
mod response_interceptor;
mod session;
mod session_machine;
mod token_store;

pub use broadcaster::{SessionListener, SessionStateBroadcaster, SessionStateChanged};
pub use client::ApiClient;
pub use envelope::Envelope;
pub use error::{ApiError, ApiResult, AuthError, AuthResult, RefreshError};
pub use refresh::RefreshCoordinator;
pub use request::{ApiRequest, ApiResponse, RequestAttempts};
pub use request_interceptor::{RequestInterceptor, CLIENT_TYPE_HEADER};
pub use response_interceptor::{Disposition, ResponseInterceptor};
pub use session::{
    AuthFailure, AuthSession, CheckOutcome, Credentials, ErrorVerdict, FailureKind, LoginOutcome,
    LogoutOutcome, SessionSnapshot,
};
pub use session_machine::{
    SessionFsm, SessionMachine, SessionMachineInput, SessionMachineState, SessionState,
};
pub use token_store::{TokenPair, TokenStore, UserIdentity, ACCESS_TOKEN_COOKIE};

#[cfg(test)]
mod tests;
