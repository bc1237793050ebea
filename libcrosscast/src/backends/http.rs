//! Shared JSON-over-HTTP plumbing for the reference backends

use std::time::Duration;

use reqwest::header::{HeaderMap, CONTENT_TYPE, ETAG};
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::error::{error_for_status, BackendError, BackendResult};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Authenticated client bound to one API base URL
pub(crate) struct ApiClient {
    backend: &'static str,
    client: Client,
    api_base: String,
    token: SecretString,
}

impl ApiClient {
    pub(crate) fn new(
        backend: &'static str,
        api_base: &str,
        token: SecretString,
    ) -> BackendResult<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BackendError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            backend,
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub(crate) fn api_base(&self) -> &str {
        &self.api_base
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(self.token.expose_secret())
    }

    #[instrument(skip(self), fields(backend = self.backend))]
    pub(crate) async fn get_json<T: DeserializeOwned>(&self, path: &str) -> BackendResult<T> {
        let request = self.authorized(self.client.get(self.url(path)));
        let response = self.send(request, path).await?;
        self.decode(response, path).await
    }

    #[instrument(skip(self, body), fields(backend = self.backend))]
    pub(crate) async fn post_json<B, T>(&self, path: &str, body: &B) -> BackendResult<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let request = self.authorized(self.client.post(self.url(path))).json(body);
        let response = self.send(request, path).await?;
        self.decode(response, path).await
    }

    /// PUT raw bytes to an absolute upload URL and return the response headers
    #[instrument(skip(self, bytes), fields(backend = self.backend, len = bytes.len()))]
    pub(crate) async fn put_bytes(
        &self,
        url: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> BackendResult<HeaderMap> {
        let request = self
            .authorized(self.client.put(url))
            .header(CONTENT_TYPE, content_type)
            .body(bytes);
        let response = self.send(request, "upload").await?;
        Ok(response.headers().clone())
    }

    async fn send(&self, request: RequestBuilder, context: &str) -> BackendResult<Response> {
        let response = request.send().await.map_err(|e| {
            BackendError::Network(format!("{} request to {} failed: {}", self.backend, context, e))
        })?;

        let status = response.status();
        debug!(backend = self.backend, context, status = status.as_u16(), "Received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_for_status(
                status.as_u16(),
                &format!("{} {}", self.backend, context),
                body.trim(),
            ));
        }

        Ok(response)
    }

    async fn decode<T: DeserializeOwned>(&self, response: Response, context: &str) -> BackendResult<T> {
        let body = response.text().await.map_err(|e| {
            BackendError::Network(format!("Failed to read {} response: {}", context, e))
        })?;
        serde_json::from_str(&body).map_err(|e| {
            BackendError::UnexpectedResponseShape(format!(
                "{} {} response: {}",
                self.backend, context, e
            ))
        })
    }
}

/// Extract the entity tag a chunk upload returns, without surrounding quotes
pub(crate) fn etag(headers: &HeaderMap) -> BackendResult<String> {
    headers
        .get(ETAG)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_matches('"').to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            BackendError::UnexpectedResponseShape("chunk upload response has no ETag".to_string())
        })
}
