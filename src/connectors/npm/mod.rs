//! Proxy-manager connector: token-authenticated JSON/HTTP CRUD over the
//! nginx resource kinds. The typed surface serves the reconciler; the
//! generic `Value` surface serves the resource mirror.

mod client;

pub use client::NpmClient;

use async_trait::async_trait;
use serde_json::Value;

use crate::connectors::errors::ConnectorError;
use crate::models::{
    Certificate, ProxyHost, ProxyHostPayload, ResourceKind, Stream, StreamPayload,
};

#[async_trait]
pub trait ProxyManager: Send + Sync {
    /// Normalized base URL of the instance, as stamped into `meta.npm_url`.
    fn base_url(&self) -> &str;

    async fn list_proxy_hosts(&self) -> Result<Vec<ProxyHost>, ConnectorError>;
    async fn create_proxy_host(
        &self,
        payload: &ProxyHostPayload,
    ) -> Result<ProxyHost, ConnectorError>;
    async fn delete_proxy_host(&self, id: i64) -> Result<(), ConnectorError>;

    async fn list_streams(&self) -> Result<Vec<Stream>, ConnectorError>;
    async fn create_stream(&self, payload: &StreamPayload) -> Result<Stream, ConnectorError>;
    async fn delete_stream(&self, id: i64) -> Result<(), ConnectorError>;

    async fn list_certificates(&self) -> Result<Vec<Certificate>, ConnectorError>;

    async fn list_resources(&self, kind: ResourceKind) -> Result<Vec<Value>, ConnectorError>;
    async fn create_resource(
        &self,
        kind: ResourceKind,
        payload: &Value,
    ) -> Result<Value, ConnectorError>;
    async fn update_resource(
        &self,
        kind: ResourceKind,
        id: i64,
        payload: &Value,
    ) -> Result<Value, ConnectorError>;
}
