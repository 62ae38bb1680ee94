//! HTTP client wrapped by the request and response interceptors.

use crate::error::{ApiError, ApiResult};
use crate::request::{endpoint_url, ApiRequest, ApiResponse};
use crate::request_interceptor::RequestInterceptor;
use crate::response_interceptor::{Disposition, ResponseInterceptor};
use serde::Serialize;
use tracing::debug;
use url::Url;

/// Client the rest of the application issues API calls through.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    request_interceptor: RequestInterceptor,
    response_interceptor: ResponseInterceptor,
}

impl ApiClient {
    pub fn new(
        http: reqwest::Client,
        base_url: Url,
        request_interceptor: RequestInterceptor,
        response_interceptor: ResponseInterceptor,
    ) -> Self {
        Self {
            http,
            base_url,
            request_interceptor,
            response_interceptor,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Send `request` with invalidation recovery.
    ///
    /// Each invalidation cause replays the request at most once, so a call
    /// reaches the network at most three times.
    pub async fn execute(&self, mut request: ApiRequest) -> ApiResult<ApiResponse> {
        loop {
            self.request_interceptor.apply(&mut request);
            let result = self.dispatch(&request).await;

            match self.response_interceptor.inspect(&mut request, result).await {
                Disposition::Deliver(result) => return result,
                Disposition::Replay => {
                    debug!(
                        method = %request.method,
                        path = %request.path,
                        attempts = ?request.attempts,
                        "Replaying request"
                    );
                }
            }
        }
    }

    /// Send `request` with credentials but without invalidation recovery.
    /// Used for the login and second-factor exchanges.
    pub async fn send_unguarded(&self, mut request: ApiRequest) -> ApiResult<ApiResponse> {
        self.request_interceptor.apply(&mut request);
        self.dispatch(&request).await
    }

    pub async fn get(&self, path: &str) -> ApiResult<ApiResponse> {
        self.execute(ApiRequest::get(path)).await
    }

    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> ApiResult<ApiResponse> {
        self.execute(ApiRequest::post(path).with_json(serde_json::to_value(body)?))
            .await
    }

    pub async fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> ApiResult<ApiResponse> {
        self.execute(ApiRequest::put(path).with_json(serde_json::to_value(body)?))
            .await
    }

    pub async fn patch<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> ApiResult<ApiResponse> {
        self.execute(ApiRequest::patch(path).with_json(serde_json::to_value(body)?))
            .await
    }

    pub async fn delete(&self, path: &str) -> ApiResult<ApiResponse> {
        self.execute(ApiRequest::delete(path)).await
    }

    async fn dispatch(&self, request: &ApiRequest) -> ApiResult<ApiResponse> {
        let url = endpoint_url(&self.base_url, &request.path)?;

        let mut builder = self
            .http
            .request(request.method.clone(), url)
            .headers(request.headers.clone());
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = ApiResponse::read(builder.send().await?).await?;
        debug!(
            method = %request.method,
            path = %request.path,
            status = %response.status(),
            "API response"
        );

        if response.is_success() {
            Ok(response)
        } else {
            Err(ApiError::Status(response))
        }
    }
}
