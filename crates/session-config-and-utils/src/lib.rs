//! Configuration, filesystem paths and logging setup shared by the
//! session-guard crates.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, EndpointConfig, RouteConfig, DEFAULT_ACCESS_COOKIE_MAX_AGE_SECS, DEFAULT_API_URL,
    DEFAULT_CLIENT_TYPE, DEFAULT_LOG_LEVEL, DEFAULT_REQUEST_TIMEOUT_SECS,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level};
pub use paths::Paths;
