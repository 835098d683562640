use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::connectors::docker::{ContainerDetails, ContainerSummaryInfo};
use crate::connectors::npm::ProxyManager;
use crate::labels::{self, ProxyConfig, ProxyDefaults, StreamConfig};
use crate::models::meta::{self, META_PROXY_INDEX, META_STREAM_INDEX};
use crate::models::{ProxyHostPayload, ResourceKind, StreamPayload};
use crate::services::certificate_matcher::CertificateMatcher;
use crate::services::mirror_scheduler::MirrorSignal;
use crate::services::network_inspector::NetworkInspector;

/// In-memory mapping from one container label index to the remote
/// resource it produced. The sole bookkeeping kept across events;
/// recoverable from resource metadata on a cold start.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandleKey {
    pub container_id: String,
    pub kind: ResourceKind,
    pub index: u8,
}

/// Per-container diff-and-apply against the proxy manager.
///
/// Runs on the event task only; every reconcile completes before the next
/// event is dequeued, so the maps need no finer locking than a mutex.
pub struct Reconciler {
    npm: Arc<dyn ProxyManager>,
    inspector: Arc<NetworkInspector>,
    certificates: Arc<CertificateMatcher>,
    mirror: Arc<dyn MirrorSignal>,
    defaults: ProxyDefaults,
    instance_id: String,
    handles: Mutex<HashMap<HandleKey, i64>>,
    label_hashes: Mutex<HashMap<String, String>>,
}

impl Reconciler {
    pub fn new(
        npm: Arc<dyn ProxyManager>,
        inspector: Arc<NetworkInspector>,
        certificates: Arc<CertificateMatcher>,
        mirror: Arc<dyn MirrorSignal>,
        defaults: ProxyDefaults,
        instance_id: String,
    ) -> Self {
        Self {
            npm,
            inspector,
            certificates,
            mirror,
            defaults,
            instance_id,
            handles: Mutex::new(HashMap::new()),
            label_hashes: Mutex::new(HashMap::new()),
        }
    }

    pub fn handle(&self, container_id: &str, kind: ResourceKind, index: u8) -> Option<i64> {
        self.handles
            .lock()
            .expect("handle map lock poisoned")
            .get(&HandleKey {
                container_id: container_id.to_string(),
                kind,
                index,
            })
            .copied()
    }

    /// Whether this container owns any handle or stored label hash.
    pub fn is_tracked(&self, container_id: &str) -> bool {
        let has_handle = self
            .handles
            .lock()
            .expect("handle map lock poisoned")
            .keys()
            .any(|key| key.container_id == container_id);
        has_handle
            || self
                .label_hashes
                .lock()
                .expect("label hash lock poisoned")
                .contains_key(container_id)
    }

    /// Diff the container's labelled configuration against the tracked
    /// remote state and converge. Returns true when the reconcile was
    /// fully successful; the label hash is stored only then, so a partial
    /// failure retries on the next event.
    pub async fn reconcile(&self, details: &ContainerDetails) -> bool {
        let hash = labels::label_hash(&details.labels);
        let unchanged = self
            .label_hashes
            .lock()
            .expect("label hash lock poisoned")
            .get(&details.id)
            .map(|stored| *stored == hash)
            .unwrap_or(false);
        if unchanged {
            tracing::debug!(container = %details.name, "labels unchanged; nothing to do");
            return true;
        }

        let proxies = labels::parse_proxy_configs(&details.labels, &self.defaults);
        let streams = labels::parse_stream_configs(&details.labels);
        tracing::info!(
            container = %details.name,
            container_id = %details.id,
            proxies = proxies.len(),
            streams = streams.len(),
            "reconciling container"
        );

        let proxies_ok = self.reconcile_proxies(details, &proxies).await;
        let streams_ok = self.reconcile_streams(details, &streams).await;
        let complete = proxies_ok && streams_ok;

        {
            let mut hashes = self.label_hashes.lock().expect("label hash lock poisoned");
            if complete && labels::has_reserved_labels(&details.labels) {
                hashes.insert(details.id.clone(), hash);
            } else {
                hashes.remove(&details.id);
            }
        }

        self.mirror.request_sync();
        complete
    }

    /// A container stopped, died or was destroyed: delete everything it
    /// produced. Handles are dropped regardless of the delete outcome so
    /// a restarted proxy manager cannot leak stale bookkeeping.
    pub async fn container_gone(&self, container_id: &str) {
        let entries: Vec<(HandleKey, i64)> = self
            .handles
            .lock()
            .expect("handle map lock poisoned")
            .iter()
            .filter(|(key, _)| key.container_id == container_id)
            .map(|(key, id)| (key.clone(), *id))
            .collect();

        let tracked_hash = self
            .label_hashes
            .lock()
            .expect("label hash lock poisoned")
            .contains_key(container_id);
        if entries.is_empty() && !tracked_hash {
            return;
        }

        for (key, id) in entries {
            let result = match key.kind {
                ResourceKind::Stream => self.npm.delete_stream(id).await,
                _ => self.npm.delete_proxy_host(id).await,
            };
            match result {
                Ok(()) => {
                    tracing::info!(container_id = %container_id, kind = %key.kind, id, "removed resource for stopped container");
                }
                Err(err) if err.is_not_found() => {}
                Err(err) => {
                    tracing::error!(
                        container_id = %container_id,
                        kind = %key.kind,
                        id,
                        error = %err,
                        "delete failed; dropping the handle anyway, the resource may linger until the container returns"
                    );
                }
            }
            self.handles
                .lock()
                .expect("handle map lock poisoned")
                .remove(&key);
        }

        self.label_hashes
            .lock()
            .expect("label hash lock poisoned")
            .remove(container_id);
        self.mirror.request_sync();
    }

    /// Cold start: rebuild handles from the ownership metadata of every
    /// proxy host and stream on the proxy manager, then clean up resources
    /// whose container disappeared while we were not running.
    pub async fn rebuild_handles(
        &self,
        current: &[ContainerSummaryInfo],
    ) -> Result<(), crate::connectors::errors::ConnectorError> {
        let hosts = self.npm.list_proxy_hosts().await?;
        let streams = self.npm.list_streams().await?;

        {
            let mut handles = self.handles.lock().expect("handle map lock poisoned");
            for host in &hosts {
                if !meta::is_ours_for_instance(host.meta.as_ref(), &self.instance_id) {
                    continue;
                }
                let container_id = meta::container_id(host.meta.as_ref());
                let index = meta::proxy_index(host.meta.as_ref());
                let (Some(container_id), Some(index)) = (container_id, index) else {
                    continue;
                };
                handles.insert(
                    HandleKey {
                        container_id: container_id.to_string(),
                        kind: ResourceKind::ProxyHost,
                        index,
                    },
                    host.id,
                );
            }
            for stream in &streams {
                if !meta::is_ours_for_instance(stream.meta.as_ref(), &self.instance_id) {
                    continue;
                }
                let container_id = meta::container_id(stream.meta.as_ref());
                let index = meta::stream_index(stream.meta.as_ref());
                let (Some(container_id), Some(index)) = (container_id, index) else {
                    continue;
                };
                handles.insert(
                    HandleKey {
                        container_id: container_id.to_string(),
                        kind: ResourceKind::Stream,
                        index,
                    },
                    stream.id,
                );
            }
            tracing::info!(handles = handles.len(), "rebuilt handles from resource metadata");
        }

        let live: HashSet<&str> = current.iter().map(|c| c.id.as_str()).collect();
        let orphaned: HashSet<String> = self
            .handles
            .lock()
            .expect("handle map lock poisoned")
            .keys()
            .filter(|key| !live.contains(key.container_id.as_str()))
            .map(|key| key.container_id.clone())
            .collect();
        for container_id in orphaned {
            tracing::warn!(
                container_id = %container_id,
                "managed resources reference a container that no longer exists; cleaning up"
            );
            self.container_gone(&container_id).await;
        }

        Ok(())
    }

    fn indices_for(&self, container_id: &str, kind: ResourceKind) -> Vec<u8> {
        let mut indices: Vec<u8> = self
            .handles
            .lock()
            .expect("handle map lock poisoned")
            .keys()
            .filter(|key| key.container_id == container_id && key.kind == kind)
            .map(|key| key.index)
            .collect();
        indices.sort_unstable();
        indices
    }

    fn insert_handle(&self, key: HandleKey, id: i64) {
        self.handles
            .lock()
            .expect("handle map lock poisoned")
            .insert(key, id);
    }

    fn remove_handle(&self, key: &HandleKey) {
        self.handles
            .lock()
            .expect("handle map lock poisoned")
            .remove(key);
    }

    async fn reconcile_proxies(
        &self,
        details: &ContainerDetails,
        configs: &[ProxyConfig],
    ) -> bool {
        let mut ok = true;
        let desired: BTreeMap<u8, &ProxyConfig> =
            configs.iter().map(|cfg| (cfg.index, cfg)).collect();

        for index in self.indices_for(&details.id, ResourceKind::ProxyHost) {
            if desired.contains_key(&index) {
                continue;
            }
            let key = HandleKey {
                container_id: details.id.clone(),
                kind: ResourceKind::ProxyHost,
                index,
            };
            let Some(id) = self
                .handles
                .lock()
                .expect("handle map lock poisoned")
                .get(&key)
                .copied()
            else {
                continue;
            };
            match self.npm.delete_proxy_host(id).await {
                Ok(()) => {
                    tracing::info!(container = %details.name, index, id, "removed proxy host for deleted label index");
                    self.remove_handle(&key);
                }
                Err(err) if err.is_not_found() => {
                    self.remove_handle(&key);
                }
                Err(err) => {
                    tracing::error!(container = %details.name, index, id, error = %err, "failed to delete proxy host");
                    ok = false;
                }
            }
        }

        for (index, cfg) in desired {
            if !self.apply_proxy(details, index, cfg).await {
                ok = false;
            }
        }
        ok
    }

    async fn apply_proxy(&self, details: &ContainerDetails, index: u8, cfg: &ProxyConfig) -> bool {
        let forward_host = self
            .inspector
            .infer_forward_host(details, cfg.forward_host.as_deref());
        let forward_port = cfg
            .forward_port
            .or_else(|| NetworkInspector::infer_forward_port(details));
        let Some(forward_port) = forward_port else {
            tracing::warn!(
                container = %details.name,
                index,
                "no forward port labelled, published or exposed; skipping proxy"
            );
            return true;
        };

        let certificate_id = match cfg.certificate_id {
            Some(id) => Some(id),
            None if cfg.ssl_forced => {
                match self.certificates.find_certificate_id(&cfg.domains).await {
                    Ok(Some(id)) => {
                        tracing::info!(container = %details.name, index, certificate_id = id, "certificate auto-selected");
                        Some(id)
                    }
                    Ok(None) => {
                        tracing::warn!(
                            container = %details.name,
                            index,
                            domains = ?cfg.domains,
                            "ssl forced but no certificate matches; proceeding without one"
                        );
                        None
                    }
                    Err(err) => {
                        tracing::error!(container = %details.name, index, error = %err, "certificate lookup failed");
                        return false;
                    }
                }
            }
            None => None,
        };

        let payload = ProxyHostPayload {
            domain_names: cfg.domains.clone(),
            forward_scheme: cfg.forward_scheme.as_str().to_string(),
            forward_host,
            forward_port,
            ssl_forced: cfg.ssl_forced,
            caching_enabled: cfg.caching_enabled,
            block_exploits: cfg.block_exploits,
            allow_websocket_upgrade: cfg.websocket_upgrade,
            http2_support: cfg.http2,
            hsts_enabled: cfg.hsts,
            hsts_subdomains: cfg.hsts_subdomains,
            certificate_id: certificate_id.unwrap_or(0),
            access_list_id: cfg.access_list_id.unwrap_or(0),
            advanced_config: cfg.advanced_config.clone(),
            enabled: true,
            meta: meta::ownership_meta(
                &self.instance_id,
                self.npm.base_url(),
                &details.id,
                META_PROXY_INDEX,
                index,
            ),
        };

        self.create_or_replace_proxy(details, index, cfg, payload)
            .await
    }

    /// Delete-and-recreate uniformly: the proxy manager's in-place edit
    /// semantics differ per field, recreating under our ownership check is
    /// always safe.
    async fn create_or_replace_proxy(
        &self,
        details: &ContainerDetails,
        index: u8,
        cfg: &ProxyConfig,
        payload: ProxyHostPayload,
    ) -> bool {
        let key = HandleKey {
            container_id: details.id.clone(),
            kind: ResourceKind::ProxyHost,
            index,
        };

        let tracked = self
            .handles
            .lock()
            .expect("handle map lock poisoned")
            .get(&key)
            .copied();
        if let Some(id) = tracked {
            match self.npm.delete_proxy_host(id).await {
                Ok(()) => self.remove_handle(&key),
                Err(err) if err.is_not_found() => self.remove_handle(&key),
                Err(err) => {
                    tracing::error!(container = %details.name, index, id, error = %err, "failed to delete proxy host before recreate");
                    return false;
                }
            }
        } else {
            let hosts = match self.npm.list_proxy_hosts().await {
                Ok(hosts) => hosts,
                Err(err) => {
                    tracing::error!(container = %details.name, index, error = %err, "proxy host listing failed");
                    return false;
                }
            };
            if let Some(existing) = hosts.iter().find(|host| host.overlaps_domains(&cfg.domains)) {
                if meta::is_ours_for_instance(existing.meta.as_ref(), &self.instance_id) {
                    match self.npm.delete_proxy_host(existing.id).await {
                        Ok(()) => {}
                        Err(err) if err.is_not_found() => {}
                        Err(err) => {
                            tracing::error!(container = %details.name, index, id = existing.id, error = %err, "failed to replace our own proxy host");
                            return false;
                        }
                    }
                } else {
                    let owner = meta::sync_instance_id(existing.meta.as_ref())
                        .unwrap_or("manually created");
                    tracing::error!(
                        container = %details.name,
                        index,
                        domains = ?cfg.domains,
                        existing_id = existing.id,
                        owner = %owner,
                        "domains overlap a proxy host not managed by this instance; refusing to modify it"
                    );
                    return false;
                }
            }
        }

        match self.npm.create_proxy_host(&payload).await {
            Ok(created) => {
                tracing::info!(
                    container = %details.name,
                    index,
                    id = created.id,
                    domains = ?payload.domain_names,
                    forward = %format!("{}://{}:{}", payload.forward_scheme, payload.forward_host, payload.forward_port),
                    "proxy host created"
                );
                self.insert_handle(key, created.id);
                true
            }
            Err(err) if err.is_conflict() => {
                tracing::error!(
                    container = %details.name,
                    index,
                    domains = ?payload.domain_names,
                    error = %err,
                    "proxy manager rejected the create as a duplicate; remove the conflicting host or change the labels"
                );
                false
            }
            Err(err) => {
                tracing::error!(container = %details.name, index, error = %err, "failed to create proxy host");
                false
            }
        }
    }

    async fn reconcile_streams(
        &self,
        details: &ContainerDetails,
        configs: &[StreamConfig],
    ) -> bool {
        let mut ok = true;
        let desired: BTreeMap<u8, &StreamConfig> =
            configs.iter().map(|cfg| (cfg.index, cfg)).collect();

        for index in self.indices_for(&details.id, ResourceKind::Stream) {
            if desired.contains_key(&index) {
                continue;
            }
            let key = HandleKey {
                container_id: details.id.clone(),
                kind: ResourceKind::Stream,
                index,
            };
            let Some(id) = self
                .handles
                .lock()
                .expect("handle map lock poisoned")
                .get(&key)
                .copied()
            else {
                continue;
            };
            match self.npm.delete_stream(id).await {
                Ok(()) => {
                    tracing::info!(container = %details.name, index, id, "removed stream for deleted label index");
                    self.remove_handle(&key);
                }
                Err(err) if err.is_not_found() => {
                    self.remove_handle(&key);
                }
                Err(err) => {
                    tracing::error!(container = %details.name, index, id, error = %err, "failed to delete stream");
                    ok = false;
                }
            }
        }

        for (index, cfg) in desired {
            if !self.apply_stream(details, index, cfg).await {
                ok = false;
            }
        }
        ok
    }

    async fn apply_stream(&self, details: &ContainerDetails, index: u8, cfg: &StreamConfig) -> bool {
        let forwarding_host = self
            .inspector
            .infer_forward_host(details, cfg.forward_host.as_deref());
        let forwarding_port = cfg
            .forward_port
            .or_else(|| NetworkInspector::infer_forward_port(details));
        let Some(forwarding_port) = forwarding_port else {
            tracing::warn!(
                container = %details.name,
                index,
                "no forward port labelled, published or exposed; skipping stream"
            );
            return true;
        };

        let certificate_id = match &cfg.ssl {
            None => 0,
            Some(raw) => match raw.parse::<i64>() {
                Ok(id) => id,
                Err(_) => match self
                    .certificates
                    .find_certificate_id(&[raw.clone()])
                    .await
                {
                    Ok(Some(id)) => id,
                    Ok(None) => {
                        tracing::warn!(
                            container = %details.name,
                            index,
                            domain = %raw,
                            "no certificate matches the stream ssl domain; created without ssl"
                        );
                        0
                    }
                    Err(err) => {
                        tracing::error!(container = %details.name, index, error = %err, "certificate lookup failed");
                        return false;
                    }
                },
            },
        };

        let payload = StreamPayload {
            incoming_port: cfg.incoming_port,
            forwarding_host,
            forwarding_port,
            tcp_forwarding: cfg.tcp_forwarding,
            udp_forwarding: cfg.udp_forwarding,
            certificate_id,
            enabled: true,
            meta: meta::ownership_meta(
                &self.instance_id,
                self.npm.base_url(),
                &details.id,
                META_STREAM_INDEX,
                index,
            ),
        };

        self.create_or_replace_stream(details, index, cfg, payload)
            .await
    }

    async fn create_or_replace_stream(
        &self,
        details: &ContainerDetails,
        index: u8,
        cfg: &StreamConfig,
        payload: StreamPayload,
    ) -> bool {
        let key = HandleKey {
            container_id: details.id.clone(),
            kind: ResourceKind::Stream,
            index,
        };

        let tracked = self
            .handles
            .lock()
            .expect("handle map lock poisoned")
            .get(&key)
            .copied();
        if let Some(id) = tracked {
            match self.npm.delete_stream(id).await {
                Ok(()) => self.remove_handle(&key),
                Err(err) if err.is_not_found() => self.remove_handle(&key),
                Err(err) => {
                    tracing::error!(container = %details.name, index, id, error = %err, "failed to delete stream before recreate");
                    return false;
                }
            }
        } else {
            let streams = match self.npm.list_streams().await {
                Ok(streams) => streams,
                Err(err) => {
                    tracing::error!(container = %details.name, index, error = %err, "stream listing failed");
                    return false;
                }
            };
            if let Some(existing) = streams
                .iter()
                .find(|stream| stream.incoming_port == cfg.incoming_port)
            {
                if meta::is_ours_for_instance(existing.meta.as_ref(), &self.instance_id) {
                    match self.npm.delete_stream(existing.id).await {
                        Ok(()) => {}
                        Err(err) if err.is_not_found() => {}
                        Err(err) => {
                            tracing::error!(container = %details.name, index, id = existing.id, error = %err, "failed to replace our own stream");
                            return false;
                        }
                    }
                } else {
                    let owner = meta::sync_instance_id(existing.meta.as_ref())
                        .unwrap_or("manually created");
                    tracing::error!(
                        container = %details.name,
                        index,
                        incoming_port = cfg.incoming_port,
                        existing_id = existing.id,
                        owner = %owner,
                        "incoming port overlaps a stream not managed by this instance; refusing to modify it"
                    );
                    return false;
                }
            }
        }

        match self.npm.create_stream(&payload).await {
            Ok(created) => {
                tracing::info!(
                    container = %details.name,
                    index,
                    id = created.id,
                    incoming_port = payload.incoming_port,
                    "stream created"
                );
                self.insert_handle(key, created.id);
                true
            }
            Err(err) if err.is_conflict() => {
                tracing::error!(
                    container = %details.name,
                    index,
                    incoming_port = payload.incoming_port,
                    error = %err,
                    "proxy manager rejected the stream as a duplicate port; free the port or change the labels"
                );
                false
            }
            Err(err) => {
                tracing::error!(container = %details.name, index, error = %err, "failed to create stream");
                false
            }
        }
    }
}
