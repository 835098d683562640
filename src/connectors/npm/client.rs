use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::Instrument;

use super::ProxyManager;
use crate::connectors::errors::ConnectorError;
use crate::helpers::normalize_url;
use crate::models::{
    Certificate, ProxyHost, ProxyHostPayload, ResourceKind, Stream, StreamPayload,
};

/// The proxy manager expires its tokens after a day; renewing an hour
/// early keeps a cached token from going stale mid-request.
const TOKEN_TTL: Duration = Duration::from_secs(23 * 60 * 60);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

struct CachedToken {
    token: String,
    fetched_at: Instant,
}

/// HTTP client for one proxy-manager instance.
///
/// Any call first ensures authentication; the token refresh is serialised
/// with a double-check under the write lock while concurrent readers keep
/// going.
pub struct NpmClient {
    base_url: String,
    email: String,
    password: String,
    http_client: reqwest::Client,
    token: RwLock<Option<CachedToken>>,
}

impl NpmClient {
    pub fn new(url: &str, email: &str, password: &str) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: normalize_url(url),
            email: email.to_string(),
            password: password.to_string(),
            http_client,
            token: RwLock::new(None),
        }
    }

    async fn ensure_token(&self) -> Result<String, ConnectorError> {
        if let Some(cached) = self.token.read().await.as_ref() {
            if cached.fetched_at.elapsed() < TOKEN_TTL {
                return Ok(cached.token.clone());
            }
        }

        let mut guard = self.token.write().await;
        // another caller may have refreshed while we waited for the lock
        if let Some(cached) = guard.as_ref() {
            if cached.fetched_at.elapsed() < TOKEN_TTL {
                return Ok(cached.token.clone());
            }
        }

        #[derive(serde::Deserialize)]
        struct TokenResponse {
            token: String,
        }

        let span = tracing::info_span!("npm_request_token", url = %self.base_url);
        let url = format!("{}/api/tokens", self.base_url);
        let resp = self
            .http_client
            .post(&url)
            .json(&serde_json::json!({
                "identity": self.email,
                "secret": self.password,
            }))
            .send()
            .instrument(span)
            .await?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ConnectorError::HttpError(e.to_string()))?;
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(ConnectorError::Unauthorized(format!(
                "token request rejected by {}: {}",
                self.base_url, text
            )));
        }
        if !status.is_success() {
            return Err(ConnectorError::HttpError(format!(
                "token request failed with {}: {}",
                status, text
            )));
        }

        let parsed: TokenResponse =
            serde_json::from_str(&text).map_err(|_| ConnectorError::InvalidResponse(text))?;
        *guard = Some(CachedToken {
            token: parsed.token.clone(),
            fetched_at: Instant::now(),
        });
        Ok(parsed.token)
    }

    /// Classify a non-success response, reading the body for the duplicate
    /// domain / duplicate port rejection the proxy manager reports as 4xx.
    async fn check_response(
        &self,
        resp: reqwest::Response,
    ) -> Result<reqwest::Response, ConnectorError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            // token may have been revoked server-side; force a re-auth
            *self.token.write().await = None;
            return Err(ConnectorError::Unauthorized(body));
        }
        if status.as_u16() == 404 {
            return Err(ConnectorError::NotFound(body));
        }
        if status.is_client_error() && body.to_ascii_lowercase().contains("in use") {
            return Err(ConnectorError::Conflict(body));
        }
        if status.is_server_error() {
            return Err(ConnectorError::ServiceUnavailable(format!(
                "{}: {}",
                status, body
            )));
        }
        Err(ConnectorError::HttpError(format!("{}: {}", status, body)))
    }

    async fn api_get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ConnectorError> {
        let token = self.ensure_token().await?;
        let url = format!("{}/api{}", self.base_url, path);
        let resp = self
            .http_client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await?;
        let resp = self.check_response(resp).await?;
        let text = resp
            .text()
            .await
            .map_err(|e| ConnectorError::HttpError(e.to_string()))?;
        serde_json::from_str::<T>(&text).map_err(|_| ConnectorError::InvalidResponse(text))
    }

    async fn api_post<B, T>(&self, path: &str, body: &B) -> Result<T, ConnectorError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let token = self.ensure_token().await?;
        let url = format!("{}/api{}", self.base_url, path);
        let resp = self
            .http_client
            .post(&url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;
        let resp = self.check_response(resp).await?;
        let text = resp
            .text()
            .await
            .map_err(|e| ConnectorError::HttpError(e.to_string()))?;
        serde_json::from_str::<T>(&text).map_err(|_| ConnectorError::InvalidResponse(text))
    }

    async fn api_put<B, T>(&self, path: &str, body: &B) -> Result<T, ConnectorError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let token = self.ensure_token().await?;
        let url = format!("{}/api{}", self.base_url, path);
        let resp = self
            .http_client
            .put(&url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;
        let resp = self.check_response(resp).await?;
        let text = resp
            .text()
            .await
            .map_err(|e| ConnectorError::HttpError(e.to_string()))?;
        serde_json::from_str::<T>(&text).map_err(|_| ConnectorError::InvalidResponse(text))
    }

    async fn api_delete(&self, path: &str) -> Result<(), ConnectorError> {
        let token = self.ensure_token().await?;
        let url = format!("{}/api{}", self.base_url, path);
        let resp = self
            .http_client
            .delete(&url)
            .bearer_auth(token)
            .send()
            .await?;
        self.check_response(resp).await?;
        Ok(())
    }
}

#[async_trait]
impl ProxyManager for NpmClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn list_proxy_hosts(&self) -> Result<Vec<ProxyHost>, ConnectorError> {
        self.api_get("/nginx/proxy-hosts").await
    }

    async fn create_proxy_host(
        &self,
        payload: &ProxyHostPayload,
    ) -> Result<ProxyHost, ConnectorError> {
        let span = tracing::info_span!(
            "npm_create_proxy_host",
            url = %self.base_url,
            domains = ?payload.domain_names
        );
        self.api_post("/nginx/proxy-hosts", payload)
            .instrument(span)
            .await
    }

    async fn delete_proxy_host(&self, id: i64) -> Result<(), ConnectorError> {
        let span = tracing::info_span!("npm_delete_proxy_host", url = %self.base_url, id = id);
        self.api_delete(&format!("/nginx/proxy-hosts/{}", id))
            .instrument(span)
            .await
    }

    async fn list_streams(&self) -> Result<Vec<Stream>, ConnectorError> {
        self.api_get("/nginx/streams").await
    }

    async fn create_stream(&self, payload: &StreamPayload) -> Result<Stream, ConnectorError> {
        let span = tracing::info_span!(
            "npm_create_stream",
            url = %self.base_url,
            incoming_port = payload.incoming_port
        );
        self.api_post("/nginx/streams", payload)
            .instrument(span)
            .await
    }

    async fn delete_stream(&self, id: i64) -> Result<(), ConnectorError> {
        let span = tracing::info_span!("npm_delete_stream", url = %self.base_url, id = id);
        self.api_delete(&format!("/nginx/streams/{}", id))
            .instrument(span)
            .await
    }

    async fn list_certificates(&self) -> Result<Vec<Certificate>, ConnectorError> {
        self.api_get("/nginx/certificates").await
    }

    async fn list_resources(&self, kind: ResourceKind) -> Result<Vec<Value>, ConnectorError> {
        self.api_get(&format!("/nginx/{}", kind.api_path())).await
    }

    async fn create_resource(
        &self,
        kind: ResourceKind,
        payload: &Value,
    ) -> Result<Value, ConnectorError> {
        let span = tracing::info_span!("npm_create_resource", url = %self.base_url, kind = %kind);
        self.api_post(&format!("/nginx/{}", kind.api_path()), payload)
            .instrument(span)
            .await
    }

    async fn update_resource(
        &self,
        kind: ResourceKind,
        id: i64,
        payload: &Value,
    ) -> Result<Value, ConnectorError> {
        let span = tracing::info_span!(
            "npm_update_resource",
            url = %self.base_url,
            kind = %kind,
            id = id
        );
        self.api_put(&format!("/nginx/{}/{}", kind.api_path(), id), payload)
            .instrument(span)
            .await
    }
}
