//! Container-host connector: list/inspect/network calls and the lifecycle
//! event stream, backed by the Docker Engine API.

mod client;

pub use client::DockerClient;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::collections::HashMap;

use crate::connectors::errors::ConnectorError;

/// One row of a container listing.
#[derive(Debug, Clone)]
pub struct ContainerSummaryInfo {
    pub id: String,
    pub name: String,
    pub labels: HashMap<String, String>,
    pub running: bool,
}

/// Everything the reconciler needs to know about one container: labels for
/// parsing, network memberships and ports for forward-target inference.
#[derive(Debug, Clone, Default)]
pub struct ContainerDetails {
    pub id: String,
    pub name: String,
    pub labels: HashMap<String, String>,
    pub networks: Vec<String>,
    /// Host-side ports of published mappings, ascending.
    pub published_ports: Vec<u16>,
    /// Container-side ports that are exposed but not published, ascending.
    pub exposed_ports: Vec<u16>,
}

#[derive(Debug, Clone)]
pub struct NetworkSummary {
    pub name: String,
    pub gateway: Option<String>,
}

/// A container lifecycle event. Actions observed: start, update, stop,
/// die, destroy; anything else is ignored by the event loop.
#[derive(Debug, Clone)]
pub struct ContainerEvent {
    pub container_id: String,
    pub action: String,
}

#[async_trait]
pub trait ContainerHost: Send + Sync {
    async fn list_containers(
        &self,
        all: bool,
    ) -> Result<Vec<ContainerSummaryInfo>, ConnectorError>;

    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails, ConnectorError>;

    async fn list_networks(&self) -> Result<Vec<NetworkSummary>, ConnectorError>;

    /// Long-lived stream of container lifecycle events. Transport errors
    /// surface as stream items; the caller re-subscribes.
    fn container_events(&self) -> BoxStream<'static, Result<ContainerEvent, ConnectorError>>;
}
