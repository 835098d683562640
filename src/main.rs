use std::sync::Arc;

use anyhow::Context;

use docksync::configuration::get_configuration;
use docksync::connectors::docker::{ContainerHost, DockerClient};
use docksync::connectors::npm::{NpmClient, ProxyManager};
use docksync::health::SyncStatus;
use docksync::helpers::resolve_instance_id;
use docksync::services::{
    CertificateMatcher, EventLoop, MirrorScheduler, NetworkInspector, Reconciler,
};
use docksync::startup::run;
use docksync::telemetry::init_telemetry;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    init_telemetry()?;

    let configuration = get_configuration().context("Failed to read configuration.")?;

    let docker = DockerClient::connect(&configuration.docker.endpoint)
        .context("Failed to connect to the container host.")?;
    docker
        .ping()
        .await
        .context("Container host is unreachable.")?;
    let docker: Arc<dyn ContainerHost> = Arc::new(docker);

    let instance_id = resolve_instance_id(configuration.instance_id.as_deref());
    tracing::info!(instance_id = %instance_id, npm_url = %configuration.npm.url, "starting docksync");

    let npm = Arc::new(NpmClient::new(
        &configuration.npm.url,
        &configuration.npm.email,
        &configuration.npm.password,
    ));
    let npm_api: Arc<dyn ProxyManager> = npm;

    let status = Arc::new(SyncStatus::new());

    let inspector = Arc::new(
        NetworkInspector::initialize(
            docker.as_ref(),
            configuration.npm.container_name.as_deref(),
            configuration.host_address.as_deref(),
        )
        .await,
    );

    let (mirror_signal, mirror_scheduler) =
        MirrorScheduler::build(npm_api.clone(), &configuration.mirrors, status.clone());

    let reconciler = Arc::new(Reconciler::new(
        npm_api.clone(),
        inspector,
        Arc::new(CertificateMatcher::new(npm_api.clone())),
        mirror_signal,
        configuration.proxy_defaults.clone().into(),
        instance_id,
    ));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let event_task = tokio::spawn(
        EventLoop::new(docker, reconciler, status.clone()).run(shutdown_rx.clone()),
    );
    let mirror_task =
        mirror_scheduler.map(|scheduler| tokio::spawn(scheduler.run(shutdown_rx.clone())));

    let address = format!("{}:{}", configuration.app_host, configuration.app_port);
    tracing::info!("Start health endpoint at {:?}", &address);
    let listener = std::net::TcpListener::bind(&address)
        .with_context(|| format!("failed to bind to {}", address))?;

    // actix installs the signal handlers; returning from here is the
    // graceful-shutdown path
    run(listener, status.clone())?.await?;

    let _ = shutdown_tx.send(true);
    let _ = event_task.await;
    if let Some(task) = mirror_task {
        let _ = task.await;
    }

    let snapshot = status.snapshot();
    tracing::info!(
        reconciles = snapshot.reconciles,
        reconcile_failures = snapshot.reconcile_failures,
        mirror_syncs = snapshot.mirror_syncs,
        "shutdown complete"
    );
    Ok(())
}
