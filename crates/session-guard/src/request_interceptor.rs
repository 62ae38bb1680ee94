//! Credential stamping for outgoing requests.

use crate::request::ApiRequest;
use crate::token_store::TokenStore;
use reqwest::header::{HeaderName, HeaderValue, AUTHORIZATION};
use session_config_and_utils::DEFAULT_CLIENT_TYPE;
use std::sync::Arc;
use tracing::warn;

/// Header carrying the client-type marker.
pub const CLIENT_TYPE_HEADER: HeaderName = HeaderName::from_static("x-client-type");

/// Sets `Authorization` from the token store and stamps the client type.
pub struct RequestInterceptor {
    tokens: Arc<TokenStore>,
    client_type: HeaderValue,
}

impl RequestInterceptor {
    pub fn new(tokens: Arc<TokenStore>, client_type: &str) -> Self {
        let client_type = HeaderValue::from_str(client_type).unwrap_or_else(|_| {
            warn!(client_type, "Invalid client type header value, using default");
            HeaderValue::from_static(DEFAULT_CLIENT_TYPE)
        });
        Self {
            tokens,
            client_type,
        }
    }

    /// Stamp `request`. A request without a stored token never keeps a stale
    /// `Authorization` header from an earlier pass.
    pub fn apply(&self, request: &mut ApiRequest) {
        let bearer = self
            .tokens
            .access_token()
            .and_then(|token| HeaderValue::from_str(&format!("Bearer {token}")).ok());

        match bearer {
            Some(mut value) => {
                value.set_sensitive(true);
                request.headers.insert(AUTHORIZATION, value);
            }
            None => {
                request.headers.remove(AUTHORIZATION);
            }
        }

        request
            .headers
            .insert(CLIENT_TYPE_HEADER, self.client_type.clone());
    }
}
