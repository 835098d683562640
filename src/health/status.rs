use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use super::models::HealthCheckResponse;

/// In-process sync counters, written by the event and mirror tasks and
/// read by the health endpoint.
pub struct SyncStatus {
    started_at: DateTime<Utc>,
    reconciles: AtomicU64,
    reconcile_failures: AtomicU64,
    mirror_syncs: AtomicU64,
    mirror_failures: AtomicU64,
    last_event_at: RwLock<Option<DateTime<Utc>>>,
}

impl SyncStatus {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            reconciles: AtomicU64::new(0),
            reconcile_failures: AtomicU64::new(0),
            mirror_syncs: AtomicU64::new(0),
            mirror_failures: AtomicU64::new(0),
            last_event_at: RwLock::new(None),
        }
    }

    pub fn record_event(&self) {
        if let Ok(mut last) = self.last_event_at.write() {
            *last = Some(Utc::now());
        }
    }

    pub fn record_reconcile(&self, complete: bool) {
        self.reconciles.fetch_add(1, Ordering::Relaxed);
        if !complete {
            self.reconcile_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_mirror_sync(&self) {
        self.mirror_syncs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_mirror_failure(&self) {
        self.mirror_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reconciles(&self) -> u64 {
        self.reconciles.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> HealthCheckResponse {
        let now = Utc::now();
        HealthCheckResponse {
            status: "ok".to_string(),
            started_at: self.started_at,
            uptime_secs: (now - self.started_at).num_seconds(),
            reconciles: self.reconciles.load(Ordering::Relaxed),
            reconcile_failures: self.reconcile_failures.load(Ordering::Relaxed),
            mirror_syncs: self.mirror_syncs.load(Ordering::Relaxed),
            mirror_failures: self.mirror_failures.load(Ordering::Relaxed),
            last_event_at: self.last_event_at.read().ok().and_then(|last| *last),
        }
    }
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let status = SyncStatus::new();
        status.record_reconcile(true);
        status.record_reconcile(false);
        status.record_mirror_sync();
        status.record_event();

        let snapshot = status.snapshot();
        assert_eq!(snapshot.status, "ok");
        assert_eq!(snapshot.reconciles, 2);
        assert_eq!(snapshot.reconcile_failures, 1);
        assert_eq!(snapshot.mirror_syncs, 1);
        assert!(snapshot.last_event_at.is_some());
    }
}
