#[macro_use]
extern crate tracing;

use anyhow::{Context, Result as AnyResult};
use hello_mtls::{
    components::{Greeter, MetricsExporter, RefreshScheduler, Requester},
    configs::{GlobalConfig, IdentityPaths, Mode},
    credential_store::CredentialStore,
    error::{AppResult, ErrorReason},
    tls,
    types::{Target, TrustPool},
};
use std::{num::NonZeroUsize, sync::Arc};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

fn main() -> AnyResult<()> {
    // Load environment variables from the `.env` file
    dotenvy::dotenv().ok();
    // Initialize the logger after loading the environment variables
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let app_config = GlobalConfig::load_config().context("Failed to parse configuration files")?;

    // Setup async runtime
    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    if let Some(worker) = app_config.workers.and_then(NonZeroUsize::new) {
        runtime_builder.worker_threads(worker.into());
    }
    let result = runtime_builder
        .enable_all()
        .build()
        .context("Failed to bootstrap the Tokio runtime")?
        .block_on(run(app_config));

    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}

/// Loads the trusted roots and the initial identity. Both are fatal on failure.
async fn load_credentials(paths: &IdentityPaths) -> AppResult<(TrustPool, Arc<CredentialStore>)> {
    let roots = TrustPool::load(&paths.root)
        .await
        .map_err(ErrorReason::TrustLoad)?;
    let store = CredentialStore::load_initial(paths.clone())
        .await
        .map_err(ErrorReason::IdentityLoad)?;
    Ok((roots, store))
}

async fn run(app_config: GlobalConfig) -> AnyResult<()> {
    let (roots, store) = load_credentials(&app_config.identity)
        .await
        .context("Failed to load credentials")?;

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutting down");
                shutdown.cancel();
            }
        }
    });

    // Schedule periodic re-load of the certificate
    let refresh = RefreshScheduler::new(store.clone(), app_config.refresh.interval)
        .spawn(shutdown.child_token());

    if let Some(addr) = app_config.metrics.listen {
        let exporter = MetricsExporter::new(store.clone())?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to listen on {}", addr))?;
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = exporter.run(listener, shutdown).await {
                error!("Metrics exporter stopped: {}", e);
            }
        });
    }

    let result = match app_config.mode {
        Mode::Server => {
            let listener = TcpListener::bind(app_config.server.listen)
                .await
                .with_context(|| format!("Failed to listen on {}", app_config.server.listen))?;
            let greeter = Greeter::new(tls::server_config(&store, &roots)?);
            greeter
                .serve(listener, shutdown.clone())
                .await
                .context("Failed to serve")
        }
        Mode::Client => {
            let client = app_config.client;
            let target: Target = client
                .target
                .as_deref()
                .ok_or(ErrorReason::InvalidTarget)
                .context("No target configured, set HELLO_MTLS_CLIENT__TARGET or HELLO_MTLS_URL")?
                .parse()?;
            let requester = Requester::new(
                tls::client_config(&store, &roots)?,
                target,
                client.server_name,
                client.name,
                client.timeout,
            )?;
            requester
                .run(client.request_interval, shutdown.clone())
                .await
                .context("Request failed")
        }
    };

    shutdown.cancel();
    refresh.shutdown().await;
    result
}
