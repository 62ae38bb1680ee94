//! Raw API access through the session client.

use crate::output::{self, OutputFormat};
use anyhow::Result;
use session_guard::AuthSession;
use tracing::debug;

/// GET `path` relative to the API base URL and print the body.
///
/// A failed request is returned as an error so the process exits non-zero.
pub async fn get(session: &AuthSession, path: &str, format: &OutputFormat) -> Result<()> {
    let response = match session.client().get(path).await {
        Ok(response) => response,
        Err(e) if session.on_error(&e).logout => {
            session.logout().await;
            anyhow::bail!("{}. Please log in again", e);
        }
        Err(e) => return Err(e.into()),
    };

    debug!(status = %response.status(), "Request succeeded");
    match format {
        OutputFormat::Json => match response.json::<serde_json::Value>() {
            Ok(body) => output::print_json(&body),
            Err(_) => println!("{}", response.text()),
        },
        OutputFormat::Text => println!("{}", response.text()),
    }
    Ok(())
}
