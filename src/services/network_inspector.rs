use crate::connectors::docker::{ContainerDetails, ContainerHost};

/// Hostname the container runtime resolves to the host from inside a
/// container.
pub const HOST_GATEWAY_HOSTNAME: &str = "host.docker.internal";

/// Network topology, discovered once per process: which networks the
/// proxy-manager container sits on, and which address reaches the host
/// when a container shares none of them.
pub struct NetworkInspector {
    proxy_nets: Vec<String>,
    host_address: String,
}

impl NetworkInspector {
    /// Assemble an inspector from known topology. Production code goes
    /// through [`NetworkInspector::initialize`].
    pub fn new(proxy_nets: Vec<String>, host_address: String) -> Self {
        Self {
            proxy_nets,
            host_address,
        }
    }

    pub async fn initialize(
        docker: &dyn ContainerHost,
        npm_container_name: Option<&str>,
        host_override: Option<&str>,
    ) -> Self {
        let proxy_nets = match npm_container_name {
            Some(name) => detect_proxy_networks(docker, name).await,
            None => Vec::new(),
        };

        let host_address = resolve_host_address(docker, host_override).await;
        tracing::info!(
            proxy_networks = ?proxy_nets,
            host_address = %host_address,
            "network topology resolved"
        );

        Self {
            proxy_nets,
            host_address,
        }
    }

    pub fn host_address(&self) -> &str {
        &self.host_address
    }

    pub fn proxy_networks(&self) -> &[String] {
        &self.proxy_nets
    }

    /// Forward host for a container: an explicit label wins; a network
    /// shared with the proxy manager means container DNS by name; anything
    /// else goes through the host address.
    pub fn infer_forward_host(&self, details: &ContainerDetails, explicit: Option<&str>) -> String {
        if let Some(host) = explicit {
            return host.to_string();
        }
        let shared = details
            .networks
            .iter()
            .any(|net| self.proxy_nets.iter().any(|p| p == net));
        if shared {
            details.name.clone()
        } else {
            self.host_address.clone()
        }
    }

    /// First declared container port in deterministic order: published
    /// before merely exposed, numeric ascending within each.
    pub fn infer_forward_port(details: &ContainerDetails) -> Option<u16> {
        details
            .published_ports
            .first()
            .or_else(|| details.exposed_ports.first())
            .copied()
    }
}

async fn detect_proxy_networks(docker: &dyn ContainerHost, name: &str) -> Vec<String> {
    let containers = match docker.list_containers(true).await {
        Ok(containers) => containers,
        Err(err) => {
            tracing::warn!(error = %err, "container listing failed while locating the proxy manager");
            return Vec::new();
        }
    };

    let found = containers
        .iter()
        .find(|c| c.name == name || c.id.starts_with(name));
    let Some(found) = found else {
        tracing::warn!(
            container = %name,
            "proxy-manager container not found; shared-network inference disabled"
        );
        return Vec::new();
    };

    match docker.inspect_container(&found.id).await {
        Ok(details) => details.networks,
        Err(err) => {
            tracing::warn!(container = %name, error = %err, "proxy-manager inspection failed");
            Vec::new()
        }
    }
}

async fn resolve_host_address(docker: &dyn ContainerHost, host_override: Option<&str>) -> String {
    if let Some(address) = host_override {
        let address = address.trim();
        if !address.is_empty() {
            return address.to_string();
        }
    }

    if tokio::net::lookup_host((HOST_GATEWAY_HOSTNAME, 80))
        .await
        .map(|mut addrs| addrs.next().is_some())
        .unwrap_or(false)
    {
        return HOST_GATEWAY_HOSTNAME.to_string();
    }

    match docker.list_networks().await {
        Ok(networks) => {
            if let Some(gateway) = networks
                .iter()
                .find(|net| net.name == "bridge")
                .and_then(|net| net.gateway.clone())
            {
                return gateway;
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, "network listing failed while resolving the host address");
        }
    }

    tracing::warn!(
        "no reachable host address discovered; falling back to {} which may not resolve",
        HOST_GATEWAY_HOSTNAME
    );
    HOST_GATEWAY_HOSTNAME.to_string()
}
