use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex, Notify};

use crate::configuration::MirrorSettings;
use crate::connectors::npm::{NpmClient, ProxyManager};
use crate::health::SyncStatus;
use crate::services::resource_mirror;

/// How the reconciler nudges the mirror scheduler. Always non-null: when
/// no mirror is configured the no-op implementation stands in, so callers
/// never branch on scheduler presence.
pub trait MirrorSignal: Send + Sync {
    fn request_sync(&self);
}

pub struct NoopMirrorSignal;

impl MirrorSignal for NoopMirrorSignal {
    fn request_sync(&self) {}
}

struct SchedulerSignal {
    notify: Arc<Notify>,
}

impl MirrorSignal for SchedulerSignal {
    // edge-triggered: Notify holds a single permit, so a burst of
    // requests within one interval collapses to one sync
    fn request_sync(&self) {
        self.notify.notify_one();
    }
}

/// Drives a periodic + on-demand sync of the primary's configuration to
/// each configured secondary proxy manager.
pub struct MirrorScheduler {
    primary: Arc<dyn ProxyManager>,
    mirrors: Vec<Arc<NpmClient>>,
    interval: Duration,
    notify: Arc<Notify>,
    sync_lock: Mutex<()>,
    status: Arc<SyncStatus>,
}

impl MirrorScheduler {
    /// Returns the signal handle the reconciler holds, plus the scheduler
    /// task when at least one usable mirror slot exists.
    pub fn build(
        primary: Arc<dyn ProxyManager>,
        settings: &MirrorSettings,
        status: Arc<SyncStatus>,
    ) -> (Arc<dyn MirrorSignal>, Option<MirrorScheduler>) {
        if settings.slots.is_empty() {
            tracing::info!("no mirror configured; mirror scheduler inactive");
            return (Arc::new(NoopMirrorSignal), None);
        }

        let mirrors: Vec<Arc<NpmClient>> = settings
            .slots
            .iter()
            .map(|slot| Arc::new(NpmClient::new(&slot.url, &slot.email, &slot.password)))
            .collect();
        let notify = Arc::new(Notify::new());
        let scheduler = MirrorScheduler {
            primary,
            mirrors,
            interval: Duration::from_secs(settings.sync_interval_secs),
            notify: notify.clone(),
            sync_lock: Mutex::new(()),
            status,
        };

        (Arc::new(SchedulerSignal { notify }), Some(scheduler))
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            mirrors = self.mirrors.len(),
            interval_secs = self.interval.as_secs(),
            "mirror scheduler started"
        );

        self.sync_all().await;
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    tracing::info!("mirror scheduler stopping");
                    return;
                }
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.notify.notified() => {}
            }
            if *shutdown.borrow() {
                return;
            }
            self.sync_all().await;
        }
    }

    async fn sync_all(&self) {
        let _guard = match self.sync_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::debug!("mirror sync already in progress; request coalesced");
                return;
            }
        };

        for mirror in &self.mirrors {
            let report =
                resource_mirror::sync_instance(self.primary.as_ref(), mirror.as_ref()).await;
            let (synced, skipped, failed) = report.totals();
            if failed > 0 {
                self.status.record_mirror_failure();
                tracing::error!(
                    mirror = %mirror.base_url(),
                    synced,
                    skipped,
                    failed,
                    "mirror sync finished with failures"
                );
            } else {
                self.status.record_mirror_sync();
                tracing::info!(
                    mirror = %mirror.base_url(),
                    synced,
                    skipped,
                    "mirror sync finished"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::MirrorSlot;
    use crate::connectors::errors::ConnectorError;
    use crate::models::{
        Certificate, ProxyHost, ProxyHostPayload, ResourceKind, Stream, StreamPayload,
    };
    use async_trait::async_trait;
    use serde_json::Value;

    struct StubPrimary;

    #[async_trait]
    impl ProxyManager for StubPrimary {
        fn base_url(&self) -> &str {
            "http://npm:81"
        }
        async fn list_proxy_hosts(&self) -> Result<Vec<ProxyHost>, ConnectorError> {
            Ok(Vec::new())
        }
        async fn create_proxy_host(
            &self,
            _: &ProxyHostPayload,
        ) -> Result<ProxyHost, ConnectorError> {
            Err(ConnectorError::Internal("not used".into()))
        }
        async fn delete_proxy_host(&self, _: i64) -> Result<(), ConnectorError> {
            Ok(())
        }
        async fn list_streams(&self) -> Result<Vec<Stream>, ConnectorError> {
            Ok(Vec::new())
        }
        async fn create_stream(&self, _: &StreamPayload) -> Result<Stream, ConnectorError> {
            Err(ConnectorError::Internal("not used".into()))
        }
        async fn delete_stream(&self, _: i64) -> Result<(), ConnectorError> {
            Ok(())
        }
        async fn list_certificates(&self) -> Result<Vec<Certificate>, ConnectorError> {
            Ok(Vec::new())
        }
        async fn list_resources(&self, _: ResourceKind) -> Result<Vec<Value>, ConnectorError> {
            Ok(Vec::new())
        }
        async fn create_resource(
            &self,
            _: ResourceKind,
            _: &Value,
        ) -> Result<Value, ConnectorError> {
            Err(ConnectorError::Internal("not used".into()))
        }
        async fn update_resource(
            &self,
            _: ResourceKind,
            _: i64,
            _: &Value,
        ) -> Result<Value, ConnectorError> {
            Err(ConnectorError::Internal("not used".into()))
        }
    }

    #[test]
    fn test_no_slots_yields_inactive_scheduler() {
        let (signal, scheduler) = MirrorScheduler::build(
            Arc::new(StubPrimary),
            &MirrorSettings::default(),
            Arc::new(SyncStatus::new()),
        );
        assert!(scheduler.is_none());
        // the no-op signal must be callable without a scheduler behind it
        signal.request_sync();
    }

    #[test]
    fn test_slots_yield_scheduler_with_interval() {
        let settings = MirrorSettings {
            slots: vec![MirrorSlot {
                url: "http://npm2:81".to_string(),
                email: "admin@example.com".to_string(),
                password: "secret".to_string(),
            }],
            sync_interval_secs: 120,
        };
        let (signal, scheduler) = MirrorScheduler::build(
            Arc::new(StubPrimary),
            &settings,
            Arc::new(SyncStatus::new()),
        );
        let scheduler = scheduler.expect("scheduler should be active");
        assert_eq!(scheduler.interval, Duration::from_secs(120));
        assert_eq!(scheduler.mirrors.len(), 1);
        signal.request_sync();
        signal.request_sync();
    }
}
