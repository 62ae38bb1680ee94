//! Authentication commands.

use crate::output::{self, print_row, OutputFormat};
use anyhow::Result;
use serde_json::json;
use session_guard::{AuthSession, Credentials, LoginOutcome};
use std::io::{self, Write};

/// Login with email and password, prompting for whatever is missing.
pub async fn login(
    session: &AuthSession,
    email: Option<String>,
    password: Option<String>,
    format: &OutputFormat,
) -> Result<()> {
    if session.check().authenticated {
        let who = session
            .tokens()
            .identity()
            .and_then(|i| i.email.or(Some(i.id)))
            .unwrap_or_else(|| "unknown".to_string());
        output::print_success(&format!("Already logged in as {}", who), format);
        return Ok(());
    }

    let email = match email {
        Some(email) => email,
        None => {
            print!("Email: ");
            io::stdout().flush()?;
            let mut email = String::new();
            io::stdin().read_line(&mut email)?;
            email.trim().to_string()
        }
    };
    if email.is_empty() {
        output::print_error("Email is required", format);
        return Ok(());
    }

    let password = match password {
        Some(password) => password,
        None => rpassword::prompt_password("Password: ")?,
    };
    if password.is_empty() {
        output::print_error("Password is required", format);
        return Ok(());
    }

    let outcome = session.login(&Credentials::new(email, password)).await;
    print_outcome(&outcome, format);
    Ok(())
}

/// Submit the second-factor code for a pending login.
pub async fn verify(session: &AuthSession, code: &str, format: &OutputFormat) -> Result<()> {
    let outcome = session.verify_two_factor(code.trim()).await?;
    print_outcome(&outcome, format);
    Ok(())
}

/// Logout and clear the local session.
pub async fn logout(session: &AuthSession, format: &OutputFormat) -> Result<()> {
    let outcome = session.logout().await;
    let message = if outcome.server_acknowledged {
        "Logged out successfully"
    } else {
        "Logged out locally"
    };
    output::print_success(message, format);
    Ok(())
}

/// Show the local session verdict without contacting the server.
pub async fn status(session: &AuthSession, format: &OutputFormat) -> Result<()> {
    let snapshot = session.snapshot();

    match format {
        OutputFormat::Json => output::print_json(&snapshot),
        OutputFormat::Text => {
            let auth = if snapshot.is_authenticated {
                "logged in"
            } else if snapshot.pending_two_factor_user_id.is_some() {
                "awaiting second factor"
            } else {
                "logged out"
            };
            print_row("Auth", auth);
            if let Some(identity) = &snapshot.identity {
                print_row("User ID", &identity.id);
                if let Some(email) = &identity.email {
                    print_row("Email", email);
                }
            }
            if let Some(expires_at) = session.tokens().get().and_then(|p| p.expires_at) {
                print_row("Expires", &expires_at.to_rfc3339());
            }
        }
    }
    Ok(())
}

/// Show the signed-in user, refreshing once if nothing is cached.
pub async fn whoami(session: &AuthSession, format: &OutputFormat) -> Result<()> {
    match session.identity().await {
        Some(identity) => match format {
            OutputFormat::Json => output::print_json(&identity),
            OutputFormat::Text => {
                print_row("User ID", &identity.id);
                print_row("Name", identity.name.as_deref().unwrap_or("-"));
                print_row("Email", identity.email.as_deref().unwrap_or("-"));
            }
        },
        None => output::print_error("Not logged in", format),
    }
    Ok(())
}

/// Show the role claims carried by the access token.
pub async fn permissions(session: &AuthSession, format: &OutputFormat) -> Result<()> {
    let roles = session.permissions().unwrap_or_default();
    match format {
        OutputFormat::Json => output::print_json(&json!({ "roles": roles })),
        OutputFormat::Text if roles.is_empty() => println!("No roles"),
        OutputFormat::Text => {
            for role in roles {
                println!("{}", role);
            }
        }
    }
    Ok(())
}

fn print_outcome(outcome: &LoginOutcome, format: &OutputFormat) {
    match outcome {
        LoginOutcome::Authenticated { identity, .. } => {
            let who = identity
                .as_ref()
                .map(|i| i.email.clone().unwrap_or_else(|| i.id.clone()))
                .unwrap_or_else(|| "user".to_string());
            output::print_success(&format!("Logged in as {}", who), format);
        }
        LoginOutcome::TwoFactorRequired { .. } => {
            output::print_success(
                "Second factor required. Run 'session-guard verify <code>'",
                format,
            );
        }
        LoginOutcome::Failed(failure) => {
            output::print_error(&format!("Login failed: {}", failure.message), format);
        }
    }
}
