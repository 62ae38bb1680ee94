//! CLI command implementations.

mod api;
mod auth;

pub use api::get;
pub use auth::{login, logout, permissions, status, verify, whoami};

use anyhow::Result;
use session_config_and_utils::{Config, Paths};
use session_guard::AuthSession;

/// Open the persisted session described by `config`.
pub fn open_session(config: &Config, paths: &Paths) -> Result<AuthSession> {
    paths.ensure_dirs()?;
    let storage = session_storage::open_or_unavailable(&paths.session_file());
    Ok(AuthSession::new(config, storage)?)
}
