use crate::{credential_store::CredentialStore, error::AppResult};
use axum::{extract::State, http::StatusCode, routing::get, Router};
use prometheus::{IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug)]
struct ExporterState {
    pub store: Arc<CredentialStore>,
    pub registry: Registry,
    pub metric_not_before: IntGaugeVec,
    pub metric_not_after: IntGaugeVec,
    pub metric_generation: IntGauge,
}

/// Serves the validity window of the current identity in Prometheus format.
#[derive(Clone, Debug)]
pub struct MetricsExporter {
    state: ExporterState,
}

impl MetricsExporter {
    pub fn new(store: Arc<CredentialStore>) -> AppResult<Self> {
        let registry = Registry::new_custom(None, None)?;
        let cert_labels = ["subject", "issuer", "serial_number"];

        let metric_not_before = IntGaugeVec::new(
            Opts::new("not_before", "Current certificate not before timestamp")
                .namespace("hello_mtls")
                .subsystem("identity"),
            &cert_labels,
        )?;
        registry.register(Box::new(metric_not_before.clone()))?;
        let metric_not_after = IntGaugeVec::new(
            Opts::new("not_after", "Current certificate not after timestamp")
                .namespace("hello_mtls")
                .subsystem("identity"),
            &cert_labels,
        )?;
        registry.register(Box::new(metric_not_after.clone()))?;
        let metric_generation = IntGauge::with_opts(
            Opts::new("generation", "Number of distinct certificates loaded")
                .namespace("hello_mtls")
                .subsystem("identity"),
        )?;
        registry.register(Box::new(metric_generation.clone()))?;

        Ok(Self {
            state: ExporterState {
                store,
                registry,
                metric_not_before,
                metric_not_after,
                metric_generation,
            },
        })
    }

    pub async fn run(&self, listener: TcpListener, shutdown: CancellationToken) -> AppResult<()> {
        let router = Router::new()
            .route("/metrics", get(Self::handle_metrics))
            .with_state(self.state.clone());

        info!("Serving metrics on {}", listener.local_addr()?);
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;
        Ok(())
    }

    async fn handle_metrics(state: State<ExporterState>) -> Result<String, StatusCode> {
        Self::encode(&state).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn encode(state: &ExporterState) -> AppResult<String> {
        // Only the identity currently held is reported.
        state.metric_not_before.reset();
        state.metric_not_after.reset();
        state.metric_generation.set(state.store.generation() as i64);

        if let Some(identity) = state.store.current() {
            match identity.parse_leaf() {
                Ok(cert) => {
                    let serial = cert.serial_number().to_string();
                    let subject = cert.subject();
                    let issuer = cert.issuer();
                    let label_values = [subject.as_str(), issuer.as_str(), serial.as_str()];

                    state
                        .metric_not_before
                        .get_metric_with_label_values(&label_values)?
                        .set(cert.not_before());
                    state
                        .metric_not_after
                        .get_metric_with_label_values(&label_values)?
                        .set(cert.not_after());
                }
                Err(e) => {
                    error!("Failed to parse the current certificate: {}", e);
                }
            }
        }

        let encoder = TextEncoder::new();
        Ok(encoder.encode_to_string(&state.registry.gather())?)
    }
}
