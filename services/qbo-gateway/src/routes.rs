//! HTTP surface over the operation catalog
//!
//! Each route maps onto exactly one catalog operation. Successful payloads
//! are returned verbatim with 200; failures go through `ApiError`.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use qbo_client::catalog::OPERATIONS;
use qbo_client::{Entity, Operation, OperationCatalog, Report};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{Instrument, info, info_span, warn};

use crate::error::ApiError;

/// Shared application state accessible from all handlers
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<OperationCatalog>,
    pub prometheus: PrometheusHandle,
    pub started_at: Instant,
    pub operations_served: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(catalog: OperationCatalog, prometheus: PrometheusHandle) -> Self {
        Self {
            catalog: Arc::new(catalog),
            prometheus,
            started_at: Instant::now(),
            operations_served: Arc::new(AtomicU64::new(0)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct QueryRequest {
    query: String,
}

/// Build the router with all routes and shared state.
///
/// `max_connections` caps concurrent requests across every route.
pub fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/company-info", get(company_info_handler))
        .route("/current-user", get(current_user_handler))
        .route("/query", post(query_handler))
        .route("/entities/{entity}", get(entity_handler))
        .route("/reports/{report}", get(report_handler))
        .route("/operations", get(list_operations_handler))
        .route("/operations/{name}", get(operation_handler))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let resolver = state.catalog.resolver();
    Json(json!({
        "status": "healthy",
        "environment": resolver.environment().as_str(),
        "company_id": resolver.company_id(),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "operations_served": state.operations_served.load(Ordering::Relaxed),
    }))
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.prometheus.render(),
    )
}

async fn company_info_handler(State(state): State<AppState>) -> Response {
    run(&state, Operation::CompanyInfo).await
}

async fn current_user_handler(State(state): State<AppState>) -> Response {
    run(&state, Operation::CurrentUser).await
}

async fn query_handler(
    State(state): State<AppState>,
    request: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = request.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let catalog = state.catalog.clone();
    Ok(observe(&state, "execute_query", async move {
        catalog.execute_query(&request.query).await
    })
    .await)
}

async fn entity_handler(
    State(state): State<AppState>,
    Path(entity): Path<String>,
) -> Result<Response, ApiError> {
    let entity: Entity = entity.parse()?;
    Ok(run(&state, Operation::Entity(entity)).await)
}

async fn report_handler(
    State(state): State<AppState>,
    Path(report): Path<String>,
) -> Result<Response, ApiError> {
    let report: Report = report.parse()?;
    Ok(run(&state, Operation::Report(report)).await)
}

/// Names accepted by `/operations/{name}`.
async fn list_operations_handler() -> Json<Value> {
    let names: Vec<&str> = OPERATIONS.iter().map(|(name, _)| *name).collect();
    Json(json!({ "operations": names }))
}

async fn operation_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let operation = Operation::from_name(&name)?;
    Ok(run(&state, operation).await)
}

async fn run(state: &AppState, operation: Operation) -> Response {
    let catalog = state.catalog.clone();
    observe(state, operation.name(), async move { catalog.run(operation).await }).await
}

/// Run one catalog call inside a request span, record its metrics and shape
/// the response.
async fn observe<F>(state: &AppState, operation: &'static str, call: F) -> Response
where
    F: Future<Output = qbo_client::Result<Value>>,
{
    let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
    let span = info_span!("operation", %request_id, operation);

    async move {
        let start = Instant::now();
        let result = call.await.map_err(ApiError::from);
        let elapsed = start.elapsed();
        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.outcome(),
        };
        crate::metrics::record_operation(operation, outcome, elapsed.as_secs_f64());
        state.operations_served.fetch_add(1, Ordering::Relaxed);

        match result {
            Ok(payload) => {
                info!(duration_ms = elapsed.as_millis() as u64, "operation succeeded");
                (StatusCode::OK, Json(payload)).into_response()
            }
            Err(e) => {
                warn!(
                    outcome,
                    status = e.status().as_u16(),
                    duration_ms = elapsed.as_millis() as u64,
                    error = %e,
                    "operation failed"
                );
                e.into_response()
            }
        }
    }
    .instrument(span)
    .await
}
