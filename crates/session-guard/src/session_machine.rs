//! Session state machine using rust-fsm.
//!
//! ## State Diagram
//!
//! ```text
//! ┌─────────────────┐   LoginAttempt    ┌─────────────────┐
//! │    SignedOut    │ ────────────────► │    SigningIn    │
//! │    (initial)    │ ◄──────────────── │                 │
//! └─────────────────┘    LoginFailed    └───┬─────────┬───┘
//!          ▲                                │         │ SecondFactorRequired
//!          │                 LoginSucceeded │         ▼
//!          │                                │  ┌──────────────────────┐
//!          │                                │  │ AwaitingSecondFactor │
//!          │                                ▼  └──────────┬───────────┘
//!          │  RefreshFailed         ┌─────────────────┐   │ SecondFactorVerified
//!          │  SessionExpired        │    SignedIn     │ ◄─┘
//!          ├─────────────────────── │                 │
//!          │                        └──┬──────────┬───┘
//!          │                           │          │ InvalidationDetected
//!          │                           │          ▼
//!          │                           │  ┌─────────────────┐
//!          │                           │  │   Refreshing    │ ── RefreshSucceeded ──► SignedIn
//!          │                           │  └─────────────────┘
//!          │           LogoutRequested ▼
//!          │  LogoutComplete  ┌─────────────────┐
//!          └───────────────── │   SigningOut    │
//!                             └─────────────────┘
//! ```
//!
//! `SessionCleared` leads from every other state straight to `SignedOut`.

use crate::broadcaster::SessionStateBroadcaster;
use parking_lot::Mutex;
use rust_fsm::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub session_machine(SignedOut)

    SignedOut => {
        LoginAttempt => SigningIn,
        // Persisted tokens found at startup
        SessionRestored => SignedIn,
        // Persisted pending marker found at startup
        SecondFactorPending => AwaitingSecondFactor,
        LogoutRequested => SigningOut
    },
    SigningIn => {
        LoginSucceeded => SignedIn,
        LoginFailed => SignedOut,
        SecondFactorRequired => AwaitingSecondFactor,
        SessionCleared => SignedOut
    },
    AwaitingSecondFactor => {
        SecondFactorVerified => SignedIn,
        SecondFactorRejected => AwaitingSecondFactor,
        LoginAttempt => SigningIn,
        LogoutRequested => SigningOut,
        SessionCleared => SignedOut
    },
    SignedIn => {
        InvalidationDetected => Refreshing,
        // Re-login that the server answered with a second-factor challenge
        SecondFactorRequired => AwaitingSecondFactor,
        LogoutRequested => SigningOut,
        SessionExpired => SignedOut,
        SessionCleared => SignedOut
    },
    Refreshing => {
        RefreshSucceeded => SignedIn,
        RefreshFailed => SignedOut,
        SessionExpired => SignedOut,
        LogoutRequested => SigningOut,
        SessionCleared => SignedOut
    },
    SigningOut => {
        LogoutComplete => SignedOut,
        SessionCleared => SignedOut
    }
}

pub use session_machine::Input as SessionMachineInput;
pub use session_machine::State as SessionMachineState;
pub use session_machine::StateMachine as SessionFsm;

/// Session state for external consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    SignedOut,
    SigningIn,
    AwaitingSecondFactor,
    SignedIn,
    /// Signed in while a refresh exchange is running.
    Refreshing,
    SigningOut,
}

impl SessionState {
    /// Requests may carry credentials in this state.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::SignedIn | SessionState::Refreshing)
    }

    /// Returns true if the state is a transient/in-progress state.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SessionState::SigningIn | SessionState::Refreshing | SessionState::SigningOut
        )
    }
}

impl From<&SessionMachineState> for SessionState {
    fn from(state: &SessionMachineState) -> Self {
        match state {
            SessionMachineState::SignedOut => SessionState::SignedOut,
            SessionMachineState::SigningIn => SessionState::SigningIn,
            SessionMachineState::AwaitingSecondFactor => SessionState::AwaitingSecondFactor,
            SessionMachineState::SignedIn => SessionState::SignedIn,
            SessionMachineState::Refreshing => SessionState::Refreshing,
            SessionMachineState::SigningOut => SessionState::SigningOut,
        }
    }
}

/// The FSM plus the broadcaster its verdict feeds.
pub struct SessionMachine {
    fsm: Mutex<SessionFsm>,
    broadcaster: Arc<SessionStateBroadcaster>,
}

impl SessionMachine {
    pub fn new(broadcaster: Arc<SessionStateBroadcaster>) -> Self {
        Self {
            fsm: Mutex::new(SessionFsm::new()),
            broadcaster,
        }
    }

    pub fn state(&self) -> SessionState {
        SessionState::from(self.fsm.lock().state())
    }

    pub fn broadcaster(&self) -> &Arc<SessionStateBroadcaster> {
        &self.broadcaster
    }

    /// Feed an input. Impossible transitions are logged and ignored; returns
    /// whether the input was accepted.
    pub fn apply(&self, input: SessionMachineInput) -> bool {
        let mut fsm = self.fsm.lock();
        let old_state = SessionState::from(fsm.state());

        if fsm.consume(&input).is_err() {
            debug!(input = ?input, state = ?old_state, "Ignoring impossible session transition");
            return false;
        }

        let new_state = SessionState::from(fsm.state());
        drop(fsm);

        if old_state != new_state {
            debug!(
                old_state = ?old_state,
                new_state = ?new_state,
                "Session state transition"
            );
        }
        self.broadcaster.publish(new_state.is_authenticated());
        true
    }

    /// Apply `input`, falling back to `SessionCleared` when the machine is
    /// in a state that does not accept it.
    pub fn apply_or_clear(&self, input: SessionMachineInput) {
        if !self.apply(input) {
            self.apply(SessionMachineInput::SessionCleared);
        }
    }
}
