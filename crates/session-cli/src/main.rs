//! session-guard CLI - drive an authenticated API session from the terminal.

mod commands;
mod output;

use clap::{Parser, Subcommand};
use session_config_and_utils::{init_logging, Config, Paths};
use tracing::debug;

/// session-guard CLI - Log in, inspect and use an API session.
#[derive(Parser)]
#[command(name = "session-guard")]
#[command(about = "Session-guard CLI for authentication and API access")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: output::OutputFormat,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// API base URL, overriding the config file
    #[arg(long, env = "SESSION_GUARD_API_URL", global = true)]
    api_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Login with email and password
    Login {
        /// Account email (prompted when omitted)
        #[arg(short, long)]
        email: Option<String>,
        /// Account password (prompted without echo when omitted)
        #[arg(long, env = "SESSION_GUARD_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Submit the second-factor code of a pending login
    Verify {
        /// One-time code
        code: String,
    },

    /// Logout and clear session
    Logout,

    /// Check authentication status
    Status,

    /// Show the signed-in user
    Whoami,

    /// Show the roles carried by the access token
    Permissions,

    /// GET an API path with the current session
    Get {
        /// Path relative to the API base URL
        path: String,
    },
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let paths = Paths::new()?;
    let mut config = Config::load(&paths)?;
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    if let Some(url) = cli.api_url {
        config.api_url = url;
        config.validate()?;
    }

    init_logging("session-cli", &config, &paths);
    debug!(api_url = %config.api_url, "Opening session");

    let session = commands::open_session(&config, &paths)?;
    let format = &cli.format;

    match cli.command {
        Commands::Login { email, password } => {
            commands::login(&session, email, password, format).await
        }
        Commands::Verify { code } => commands::verify(&session, &code, format).await,
        Commands::Logout => commands::logout(&session, format).await,
        Commands::Status => commands::status(&session, format).await,
        Commands::Whoami => commands::whoami(&session, format).await,
        Commands::Permissions => commands::permissions(&session, format).await,
        Commands::Get { path } => commands::get(&session, &path, format).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let format = cli.format;

    if let Err(e) = run(cli).await {
        output::print_error(&e.to_string(), &format);
        std::process::exit(1);
    }
}
