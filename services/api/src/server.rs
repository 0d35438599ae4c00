use crate::cli::ServeArgs;
use crate::infra::{AppState, Services};
use crate::routes::app_router;
use academy_ops::config::AppConfig;
use academy_ops::error::AppError;
use academy_ops::telemetry;
use academy_ops::workflows::dispatch::spawn_scheduler;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
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

    telemetry::init(&config.telemetry, config.environment)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let services = Services::assemble(&config)?;
    let scheduler = if args.no_scheduler {
        info!("background dispatch disabled, rely on /cron-check");
        None
    } else {
        Some(spawn_scheduler(
            services.engine.clone(),
            config.scheduling.interval,
        ))
    };

    let app = app_router(&services)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        timezone = %config.scheduling.timezone,
        "academy operations service ready"
    );

    let served = axum::serve(listener, app).await;
    if let Some(scheduler) = scheduler {
        scheduler.abort();
    }
    served?;
    Ok(())
}
