use std::{collections::BTreeMap, fmt};

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::{
    request::{normalize_bearer_authorization, APPLICATION_JSON},
    ApiConfig, Method, ReqwestTransport, RequestDescriptor, Response, Result,
    RetryingRequestExecutor, Sleeper, TokioSleeper, Transport,
};

#[derive(Clone)]
/// JSON API client rooted at a base URL.
///
/// Every call goes through [`RetryingRequestExecutor`] with the retry policy
/// derived from the client's [`ApiConfig`].
pub struct ApiClient<T = ReqwestTransport, S = TokioSleeper> {
    config: ApiConfig,
    executor: RetryingRequestExecutor<T, S>,
    headers: BTreeMap<String, String>,
}

impl<T, S> fmt::Debug for ApiClient<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers: BTreeMap<&str, &str> = self
            .headers
            .iter()
            .map(|(name, value)| {
                let value = if name == "authorization" {
                    "<redacted>"
                } else {
                    value.as_str()
                };
                (name.as_str(), value)
            })
            .collect();

        f.debug_struct("ApiClient")
            .field("config", &self.config)
            .field("headers", &headers)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Creates a client using `reqwest` and the tokio timer.
    pub fn new(config: ApiConfig) -> Self {
        Self::with_executor(config, RetryingRequestExecutor::reqwest())
    }
}

impl<T: Transport, S: Sleeper> ApiClient<T, S> {
    pub fn with_executor(config: ApiConfig, executor: RetryingRequestExecutor<T, S>) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_owned(), APPLICATION_JSON.to_owned());
        Self {
            config,
            executor,
            headers,
        }
    }

    /// Adds a header sent with every request.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().trim().to_ascii_lowercase(), value.into());
        self
    }

    /// Sends `authorization: Bearer <token>` with every request.
    ///
    /// If the token is missing the `Bearer ` prefix, it is added automatically.
    pub fn with_bearer_auth(self, token: impl AsRef<str>) -> Self {
        let authorization = normalize_bearer_authorization(token.as_ref());
        self.with_header("authorization", authorization)
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    pub fn executor(&self) -> &RetryingRequestExecutor<T, S> {
        &self.executor
    }

    /// Full URL for `endpoint`.
    pub fn url(&self, endpoint: &str) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        if base.is_empty() || endpoint.starts_with('/') {
            format!("{base}{endpoint}")
        } else {
            format!("{base}/{endpoint}")
        }
    }

    pub async fn get(&self, endpoint: &str) -> Result<Response> {
        self.send(self.request(Method::Get, endpoint), None).await
    }

    pub async fn delete(&self, endpoint: &str) -> Result<Response> {
        self.send(self.request(Method::Delete, endpoint), None).await
    }

    pub async fn post<B: Serialize + ?Sized>(&self, endpoint: &str, body: &B) -> Result<Response> {
        let request = self.request(Method::Post, endpoint).json(body)?;
        self.send(request, None).await
    }

    pub async fn put<B: Serialize + ?Sized>(&self, endpoint: &str, body: &B) -> Result<Response> {
        let request = self.request(Method::Put, endpoint).json(body)?;
        self.send(request, None).await
    }

    /// Sends a prepared request with the client's default headers and
    /// policy, stopping early when `cancel` fires.
    pub async fn send_with_cancel(
        &self,
        request: RequestDescriptor,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        self.send(request, Some(cancel)).await
    }

    fn request(&self, method: Method, endpoint: &str) -> RequestDescriptor {
        RequestDescriptor::new(method, self.url(endpoint))
    }

    async fn send(
        &self,
        request: RequestDescriptor,
        cancel: Option<&CancellationToken>,
    ) -> Result<Response> {
        let mut request = request;
        for (name, value) in &self.headers {
            if request.header_value(name).is_none() {
                request = request.header(name, value.clone());
            }
        }
        let policy = self.config.retry_policy();

        match cancel {
            Some(cancel) => {
                self.executor
                    .execute_with_cancel(&request, &policy, cancel)
                    .await
            }
            None => self.executor.execute(&request, &policy).await,
        }
    }
}
