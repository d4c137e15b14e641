use crate::cli::ServeArgs;
use crate::infra::{ApiContext, AppState, SimulatedScoringCapability, SimulatedScrapeProvider};
use crate::routes::api_router;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use linkmetric::config::AppConfig;
use linkmetric::error::AppError;
use linkmetric::pipeline::PipelineRunner;
use linkmetric::store::{ActivityLog, CustomerIdAllocator, FileSequence, FileStore};
use linkmetric::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    if let Some(parent) = config.pipeline.counter_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let sequence = Arc::new(FileSequence::new(config.pipeline.counter_path.clone()));
    let store = Arc::new(FileStore::open(config.pipeline.store_path.clone())?);
    let runner = PipelineRunner::new(
        store,
        Arc::new(SimulatedScrapeProvider::new(3)),
        Arc::new(SimulatedScoringCapability),
        CustomerIdAllocator::new(sequence),
        ActivityLog::new(),
        &config.pipeline,
    );
    let context = Arc::new(ApiContext {
        runner,
        auto_confirm_payments: args.auto_confirm_payments,
    });

    let app = api_router(context)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "profile analysis service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
