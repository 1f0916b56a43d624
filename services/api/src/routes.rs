use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router};
use chrono::Local;
use serde_json::json;

use riskscreen::error::AppError;
use riskscreen::platform::PlatformTransport;
use riskscreen::screening::{
    RecordPatch, RecordState, RiskProfile, ScreeningRecord, ScreeningService, ServiceError,
};

use crate::infra::AppState;

pub(crate) fn with_screening_routes<T>(service: Arc<ScreeningService<T>>) -> Router
where
    T: PlatformTransport + 'static,
{
    Router::new()
        .route("/api/v1/screenings", post(submit_handler::<T>))
        .route("/api/v1/screenings/score", post(score_handler::<T>))
        .route("/api/v1/screenings/:event_id", put(update_handler::<T>))
        .route("/api/v1/schema/mappings", get(mappings_handler::<T>))
        .route("/api/v1/schema/refresh", post(refresh_handler::<T>))
        .route("/api/v1/org-units", get(org_units_handler::<T>))
        .with_state(service)
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
}

/// Saves run on the blocking pool because the transport is synchronous; the
/// handler only shuttles the result back.
async fn submit_handler<T>(
    State(service): State<Arc<ScreeningService<T>>>,
    Json(patch): Json<RecordPatch>,
) -> Response
where
    T: PlatformTransport + 'static,
{
    let result = tokio::task::spawn_blocking(move || {
        let mut record = ScreeningRecord::default();
        service.apply_patch(&mut record, patch);
        let mut state = RecordState::Draft;
        let outcome = service.create(&mut record, &mut state, Local::now().date_naive())?;
        Ok::<_, ServiceError>((state, outcome))
    })
    .await;

    match result {
        Ok(Ok((state, outcome))) => (
            StatusCode::CREATED,
            Json(json!({ "status": state.label(), "result": outcome })),
        )
            .into_response(),
        Ok(Err(err)) => AppError::from(err).into_response(),
        Err(_) => save_task_aborted(),
    }
}

async fn update_handler<T>(
    State(service): State<Arc<ScreeningService<T>>>,
    Path(event_id): Path<String>,
    Json(patch): Json<RecordPatch>,
) -> Response
where
    T: PlatformTransport + 'static,
{
    let result = tokio::task::spawn_blocking(move || {
        let mut record = service.load(&event_id)?;
        service.apply_patch(&mut record, patch);
        let mut state = RecordState::Loaded;
        let outcome = service.update(&record, &mut state, Local::now().date_naive())?;
        Ok::<_, ServiceError>((state, outcome))
    })
    .await;

    match result {
        Ok(Ok((state, outcome))) => (
            StatusCode::OK,
            Json(json!({ "status": state.label(), "result": outcome })),
        )
            .into_response(),
        Ok(Err(err)) => AppError::from(err).into_response(),
        Err(_) => save_task_aborted(),
    }
}

/// Pure preview: no guard, no network, callable on every answer change.
async fn score_handler<T>(
    State(service): State<Arc<ScreeningService<T>>>,
    Json(patch): Json<RecordPatch>,
) -> Json<RiskProfile>
where
    T: PlatformTransport + 'static,
{
    let mut record = ScreeningRecord::default();
    service.apply_patch(&mut record, patch);
    Json(service.score(&record))
}

async fn mappings_handler<T>(State(service): State<Arc<ScreeningService<T>>>) -> Response
where
    T: PlatformTransport + 'static,
{
    let snapshot = service.mappings();
    Json(snapshot.as_ref().clone()).into_response()
}

async fn refresh_handler<T>(State(service): State<Arc<ScreeningService<T>>>) -> Response
where
    T: PlatformTransport + 'static,
{
    let result = tokio::task::spawn_blocking(move || service.refresh_schema()).await;

    match result {
        Ok(Ok(())) => StatusCode::NO_CONTENT.into_response(),
        Ok(Err(err)) => AppError::from(err).into_response(),
        Err(_) => save_task_aborted(),
    }
}

async fn org_units_handler<T>(State(service): State<Arc<ScreeningService<T>>>) -> Response
where
    T: PlatformTransport + 'static,
{
    let result = tokio::task::spawn_blocking(move || service.org_units()).await;

    match result {
        Ok(Ok(units)) => Json(units).into_response(),
        Ok(Err(err)) => AppError::from(err).into_response(),
        Err(_) => save_task_aborted(),
    }
}

fn save_task_aborted() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "background task aborted" })),
    )
        .into_response()
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
