use anyhow::Context;
use tracing::subscriber::set_global_default;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::LogTracer;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

/// The controller at info, the chatty HTTP and daemon-socket internals at
/// warn. RUST_LOG overrides the lot.
const DEFAULT_DIRECTIVES: &str = "docksync=info,bollard=warn,hyper=warn,reqwest=warn";

/// Bunyan-JSON logging for the whole process, log-crate events included
/// (bollard and reqwest log rather than trace). Runs as part of
/// bootstrap, so a failure exits non-zero like any other startup error.
pub fn init_telemetry() -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));
    let subscriber = Registry::default()
        .with(env_filter)
        .with(JsonStorageLayer)
        .with(BunyanFormattingLayer::new(
            "docksync".to_string(),
            std::io::stdout,
        ));

    LogTracer::init().context("failed to route log events into tracing")?;
    set_global_default(subscriber).context("failed to install the tracing subscriber")?;
    Ok(())
}
