use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::watch;

use crate::connectors::docker::{ContainerEvent, ContainerHost};
use crate::health::SyncStatus;
use crate::labels;
use crate::services::reconciler::Reconciler;

const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(5);

/// Subscribes to the container event stream after an initial full scan
/// and dispatches add/update/delete to the reconciler, strictly one event
/// at a time; sequencing removes intra-container races without locks.
pub struct EventLoop {
    docker: Arc<dyn ContainerHost>,
    reconciler: Arc<Reconciler>,
    status: Arc<SyncStatus>,
}

impl EventLoop {
    pub fn new(
        docker: Arc<dyn ContainerHost>,
        reconciler: Arc<Reconciler>,
        status: Arc<SyncStatus>,
    ) -> Self {
        Self {
            docker,
            reconciler,
            status,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        self.initial_scan().await;

        loop {
            if *shutdown.borrow() {
                return;
            }

            let mut events = self.docker.container_events();
            tracing::info!("subscribed to container events");

            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        tracing::info!("event loop stopping");
                        return;
                    }
                    item = events.next() => match item {
                        Some(Ok(event)) => self.handle_event(event).await,
                        Some(Err(err)) => {
                            tracing::error!(error = %err, "event stream error; resubscribing");
                            break;
                        }
                        None => {
                            tracing::warn!("event stream ended; resubscribing");
                            break;
                        }
                    }
                }
            }

            tokio::select! {
                _ = shutdown.changed() => return,
                _ = tokio::time::sleep(RESUBSCRIBE_DELAY) => {}
            }
        }
    }

    /// Cold start: rebuild handles from resource metadata, then reconcile
    /// every container (stopped ones included) that carries reserved
    /// labels.
    async fn initial_scan(&self) {
        let containers = match self.docker.list_containers(true).await {
            Ok(containers) => containers,
            Err(err) => {
                tracing::error!(
                    error = %err,
                    "initial container listing failed; continuing with events only"
                );
                return;
            }
        };

        if let Err(err) = self.reconciler.rebuild_handles(&containers).await {
            tracing::error!(error = %err, "failed to rebuild handles from the proxy manager");
        }

        for container in containers
            .iter()
            .filter(|container| labels::has_reserved_labels(&container.labels))
        {
            match self.docker.inspect_container(&container.id).await {
                Ok(details) => {
                    let complete = self.reconciler.reconcile(&details).await;
                    self.status.record_reconcile(complete);
                }
                Err(err) => {
                    tracing::error!(
                        container = %container.name,
                        error = %err,
                        "inspect failed during initial scan"
                    );
                }
            }
        }
        tracing::info!("initial scan complete");
    }

    async fn handle_event(&self, event: ContainerEvent) {
        self.status.record_event();
        match event.action.as_str() {
            "start" | "update" => {
                match self.docker.inspect_container(&event.container_id).await {
                    Ok(details) => {
                        if !labels::has_reserved_labels(&details.labels)
                            && !self.reconciler.is_tracked(&details.id)
                        {
                            return;
                        }
                        let complete = self.reconciler.reconcile(&details).await;
                        self.status.record_reconcile(complete);
                    }
                    Err(err) if err.is_not_found() => {
                        tracing::debug!(
                            container_id = %event.container_id,
                            "container vanished before inspection"
                        );
                    }
                    Err(err) => {
                        tracing::error!(
                            container_id = %event.container_id,
                            error = %err,
                            "inspect failed for container event"
                        );
                    }
                }
            }
            "stop" | "die" | "destroy" => {
                self.reconciler.container_gone(&event.container_id).await;
            }
            _ => {}
        }
    }
}
