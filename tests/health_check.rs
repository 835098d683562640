use std::sync::Arc;

use docksync::health::{HealthCheckResponse, SyncStatus};

async fn spawn_app(status: Arc<SyncStatus>) -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let server = docksync::startup::run(listener, status).expect("Failed to bind address.");
    let _ = tokio::spawn(server);
    format!("http://127.0.0.1:{}", port)
}

#[tokio::test]
async fn test_health_check_reports_sync_counters() {
    let status = Arc::new(SyncStatus::new());
    status.record_reconcile(true);
    status.record_reconcile(false);
    status.record_mirror_sync();
    let address = spawn_app(status).await;

    let response = reqwest::get(format!("{}/health_check", address))
        .await
        .expect("request failed");
    assert!(response.status().is_success());

    let body: HealthCheckResponse = response.json().await.expect("parse body");
    assert_eq!(body.status, "ok");
    assert_eq!(body.reconciles, 2);
    assert_eq!(body.reconcile_failures, 1);
    assert_eq!(body.mirror_syncs, 1);
    assert!(body.uptime_secs >= 0);
}
