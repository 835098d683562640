use std::collections::HashMap;

use async_trait::async_trait;
use bollard::container::ListContainersOptions;
use bollard::system::EventsOptions;
use bollard::{Docker, API_DEFAULT_VERSION};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;

use super::{ContainerDetails, ContainerEvent, ContainerHost, ContainerSummaryInfo, NetworkSummary};
use crate::connectors::errors::ConnectorError;

const CONNECT_TIMEOUT_SECS: u64 = 120;

/// Docker Engine API client. `Docker` handles are cheap to clone; the
/// event stream holds its own.
#[derive(Clone)]
pub struct DockerClient {
    docker: Docker,
}

impl DockerClient {
    /// Based on the provided endpoint, picks the matching transport.
    pub fn connect(endpoint: &str) -> Result<Self, ConnectorError> {
        let docker = if endpoint.starts_with("unix://") {
            Docker::connect_with_unix(endpoint, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION)
        } else if endpoint.starts_with("tcp://") || endpoint.starts_with("http") {
            Docker::connect_with_http(endpoint, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION)
        } else {
            Docker::connect_with_local_defaults()
        };

        docker
            .map(|docker| Self { docker })
            .map_err(ConnectorError::from)
    }

    /// Bootstrap probe. An unreachable container host is fatal at startup.
    pub async fn ping(&self) -> Result<(), ConnectorError> {
        self.docker.ping().await?;
        Ok(())
    }
}

fn trim_name(name: &str) -> String {
    name.trim_start_matches('/').to_string()
}

/// Container-side port out of a `"80/tcp"` key.
fn port_of_key(key: &str) -> Option<u16> {
    key.split('/').next()?.parse().ok()
}

#[async_trait]
impl ContainerHost for DockerClient {
    async fn list_containers(
        &self,
        all: bool,
    ) -> Result<Vec<ContainerSummaryInfo>, ConnectorError> {
        let options = ListContainersOptions::<String> {
            all,
            ..Default::default()
        };
        let containers = self.docker.list_containers(Some(options)).await?;

        Ok(containers
            .into_iter()
            .map(|container| ContainerSummaryInfo {
                id: container.id.unwrap_or_default(),
                name: container
                    .names
                    .as_ref()
                    .and_then(|names| names.first())
                    .map(|name| trim_name(name))
                    .unwrap_or_default(),
                labels: container.labels.unwrap_or_default(),
                running: container.state.as_deref() == Some("running"),
            })
            .collect())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails, ConnectorError> {
        let inspect = self
            .docker
            .inspect_container(id, None::<bollard::container::InspectContainerOptions>)
            .await?;

        let name = inspect.name.as_deref().map(trim_name).unwrap_or_default();
        let config = inspect.config.unwrap_or_default();
        let labels = config.labels.unwrap_or_default();

        let network_settings = inspect.network_settings.unwrap_or_default();
        let mut networks: Vec<String> = network_settings
            .networks
            .map(|nets| nets.into_keys().collect())
            .unwrap_or_default();
        networks.sort();

        let mut published_ports: Vec<u16> = Vec::new();
        let mut published_container_side: Vec<u16> = Vec::new();
        if let Some(port_map) = network_settings.ports {
            for (key, bindings) in port_map {
                let bindings: Vec<_> = bindings.unwrap_or_default();
                if bindings.is_empty() {
                    continue;
                }
                if let Some(container_port) = port_of_key(&key) {
                    published_container_side.push(container_port);
                }
                for binding in bindings {
                    if let Some(host_port) =
                        binding.host_port.as_deref().and_then(|p| p.parse().ok())
                    {
                        published_ports.push(host_port);
                    }
                }
            }
        }
        published_ports.sort_unstable();
        published_ports.dedup();

        // exposed-only: declared in the image/config but not published
        let mut exposed_ports: Vec<u16> = config
            .exposed_ports
            .map(|ports| ports.keys().filter_map(|key| port_of_key(key)).collect())
            .unwrap_or_default();
        exposed_ports.sort_unstable();
        exposed_ports.dedup();
        exposed_ports.retain(|port| !published_container_side.contains(port));

        Ok(ContainerDetails {
            id: inspect.id.unwrap_or_else(|| id.to_string()),
            name,
            labels,
            networks,
            published_ports,
            exposed_ports,
        })
    }

    async fn list_networks(&self) -> Result<Vec<NetworkSummary>, ConnectorError> {
        let networks = self
            .docker
            .list_networks(None::<bollard::network::ListNetworksOptions<String>>)
            .await?;

        Ok(networks
            .into_iter()
            .map(|network| NetworkSummary {
                name: network.name.unwrap_or_default(),
                gateway: network.ipam.and_then(|ipam| {
                    ipam.config?
                        .into_iter()
                        .find_map(|config| config.gateway)
                }),
            })
            .collect())
    }

    fn container_events(&self) -> BoxStream<'static, Result<ContainerEvent, ConnectorError>> {
        let mut filters = HashMap::new();
        filters.insert("type".to_string(), vec!["container".to_string()]);
        let options = EventsOptions::<String> {
            filters,
            ..Default::default()
        };

        self.docker
            .events(Some(options))
            .filter_map(|item| async move {
                match item {
                    Ok(message) => {
                        let container_id = message.actor.as_ref().and_then(|actor| actor.id.clone())?;
                        Some(Ok(ContainerEvent {
                            container_id,
                            action: message.action.unwrap_or_default(),
                        }))
                    }
                    Err(err) => Some(Err(ConnectorError::from(err))),
                }
            })
            .boxed()
    }
}
