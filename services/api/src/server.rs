use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use tracing::{info, warn};

use riskscreen::config::AppConfig;
use riskscreen::error::AppError;
use riskscreen::platform::http::HttpPlatformClient;
use riskscreen::screening::{RiskConfig, ScreeningService, ServiceError, TrackerSettings};
use riskscreen::telemetry;

use crate::cli::ServeArgs;
use crate::infra::AppState;
use crate::routes::with_screening_routes;

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
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let transport = HttpPlatformClient::new(config.tracker.base_url.clone())
        .map_err(|err| AppError::from(ServiceError::from(err)))?;
    let settings = TrackerSettings::from(&config.tracker);
    let service = Arc::new(ScreeningService::new(
        Arc::new(transport),
        settings,
        RiskConfig::default(),
    ));

    // The schema is fetched eagerly so the first save does not pay for it;
    // a failure here leaves the service up and saves report the missing
    // schema until a refresh succeeds.
    let bootstrap = service.clone();
    match tokio::task::spawn_blocking(move || bootstrap.refresh_schema()).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(error = %err, "initial schema refresh failed"),
        Err(err) => warn!(error = %err, "initial schema refresh aborted"),
    }

    let app = with_screening_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "screening capture service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
