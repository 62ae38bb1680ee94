//! Request and response values passed through the interceptors.

use crate::envelope::{Envelope, LoggedInProbe};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

/// Per-request retry budget, one shot per invalidation cause.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestAttempts {
    /// Already replayed after a 401
    pub retried_unauthorized: bool,
    /// Already replayed after `logged_in: false`
    pub retried_logged_out: bool,
}

/// An outgoing API call, relative to the client's base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Option<Value>,
    pub attempts: RequestAttempts,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
            attempts: RequestAttempts::default(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body.
    pub fn with_json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Append a query parameter.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Set a header.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Current `Authorization` header, if any.
    pub fn authorization(&self) -> Option<&str> {
        self.headers
            .get(reqwest::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
    }
}

/// A fully buffered server response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: String,
}

impl ApiResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: String) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Buffer a reqwest response.
    pub async fn read(response: reqwest::Response) -> Result<Self, reqwest::Error> {
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;
        Ok(Self::new(status, headers, body))
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn text(&self) -> &str {
        &self.body
    }

    /// Decode the whole body.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }

    /// Decode the body as an [`Envelope`].
    pub fn envelope<T: DeserializeOwned>(&self) -> Result<Envelope<T>, serde_json::Error> {
        serde_json::from_str(&self.body)
    }

    /// The envelope's `logged_in` flag; `None` when absent or the body is not
    /// a JSON object.
    pub fn logged_in(&self) -> Option<bool> {
        serde_json::from_str::<LoggedInProbe>(&self.body)
            .ok()
            .and_then(|probe| probe.logged_in)
    }
}

/// Append an endpoint path to the API base, keeping the base's own path.
pub(crate) fn endpoint_url(base: &Url, path: &str) -> Result<Url, url::ParseError> {
    if path.starts_with("http://") || path.starts_with("https://") {
        return Url::parse(path);
    }
    let base = base.as_str().trim_end_matches('/');
    let path = path.trim_start_matches('/');
    Url::parse(&format!("{base}/{path}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(status: u16, body: &str) -> ApiResponse {
        ApiResponse::new(
            StatusCode::from_u16(status).unwrap(),
            HeaderMap::new(),
            body.to_string(),
        )
    }

    #[test]
    fn test_logged_in_probe() {
        assert_eq!(response(200, r#"{"logged_in": false}"#).logged_in(), Some(false));
        assert_eq!(response(200, r#"{"logged_in": true, "data": {}}"#).logged_in(), Some(true));
        assert_eq!(response(200, r#"{"data": {}}"#).logged_in(), None);
        assert_eq!(response(200, "not json").logged_in(), None);
        assert_eq!(response(200, "[1, 2]").logged_in(), None);
    }

    #[test]
    fn test_envelope_decoding() {
        #[derive(serde::Deserialize)]
        struct Item {
            name: String,
        }

        let resp = response(200, r#"{"status": "success", "data": {"name": "widget"}}"#);
        let env = resp.envelope::<Item>().unwrap();
        assert_eq!(env.data.unwrap().name, "widget");
        assert!(resp.is_success());
    }

    #[test]
    fn test_request_builders() {
        let req = ApiRequest::post("/items")
            .with_json(json!({"a": 1}))
            .with_query("page", "2");
        assert_eq!(req.method, Method::POST);
        assert_eq!(req.path, "/items");
        assert_eq!(req.query, vec![("page".to_string(), "2".to_string())]);
        assert_eq!(req.attempts, RequestAttempts::default());
        assert_eq!(req.authorization(), None);
    }

    #[test]
    fn test_endpoint_url_keeps_base_path() {
        let base = Url::parse("http://localhost:8080/api").unwrap();
        assert_eq!(
            endpoint_url(&base, "/auth/login").unwrap().as_str(),
            "http://localhost:8080/api/auth/login"
        );

        let slashed = Url::parse("http://localhost:8080/api/").unwrap();
        assert_eq!(
            endpoint_url(&slashed, "items").unwrap().as_str(),
            "http://localhost:8080/api/items"
        );

        assert_eq!(
            endpoint_url(&base, "https://other.example/x").unwrap().as_str(),
            "https://other.example/x"
        );
    }
}
