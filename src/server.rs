//! Read-only HTTP API over the record store.
//!
//! Serves whatever the pipeline has committed so far; while a run is in
//! progress readers may see some batches and not others.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/taxpayers?limit=&offset=` | Page through records (default limit 100) |
//! | `GET` | `/taxpayers/status` | Whether any data has been loaded yet |
//! | `GET` | `/taxpayers/{tax_id}` | Exact tax id lookup |
//! | `GET` | `/taxpayers/document/{number}` | First taxpayer whose tax id starts with an identity document number |
//! | `GET` | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "no taxpayer with tax id 123" } }
//! ```

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::models::TaxpayerRecord;
use crate::store::RecordStore;

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 1000;

#[derive(Clone)]
struct AppState {
    store: Arc<dyn RecordStore>,
}

/// Build the router. Exposed separately so the API can be mounted in tests.
pub fn router(store: Arc<dyn RecordStore>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/taxpayers", get(handle_list))
        .route("/taxpayers/status", get(handle_status))
        .route("/taxpayers/document/{number}", get(handle_by_document))
        .route("/taxpayers/{tax_id}", get(handle_by_key))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { store })
}

/// Bind to `bind_addr` and serve until the process exits.
pub async fn run_server(bind_addr: &str, store: Arc<dyn RecordStore>) -> anyhow::Result<()> {
    let app = router(store);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("read API listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal".to_string(),
            message: err.to_string(),
        }
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /taxpayers ============

#[derive(Debug, Default, Deserialize)]
struct ListParams {
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Serialize)]
struct ListResponse {
    data: Vec<TaxpayerRecord>,
    metadata: ListMetadata,
}

#[derive(Serialize)]
struct ListMetadata {
    count: usize,
    limit: i64,
    offset: i64,
    has_data: bool,
}

async fn handle_list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<ListResponse>, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let data = state.store.find_all(limit, offset).await?;
    let has_data = state.store.has_any_records().await?;

    Ok(Json(ListResponse {
        metadata: ListMetadata {
            count: data.len(),
            limit,
            offset,
            has_data,
        },
        data,
    }))
}

// ============ GET /taxpayers/status ============

#[derive(Serialize)]
struct StatusResponse {
    api_ready: bool,
    data_loaded: bool,
    message: String,
}

async fn handle_status(State(state): State<AppState>) -> Result<Json<StatusResponse>, AppError> {
    let data_loaded = state.store.has_any_records().await?;
    let message = if data_loaded {
        "API is serving loaded registry data"
    } else {
        "API is up but registry data is still loading"
    };
    Ok(Json(StatusResponse {
        api_ready: true,
        data_loaded,
        message: message.to_string(),
    }))
}

// ============ GET /taxpayers/{tax_id} ============

async fn handle_by_key(
    State(state): State<AppState>,
    Path(tax_id): Path<String>,
) -> Result<Json<TaxpayerRecord>, AppError> {
    state
        .store
        .find_by_key(&tax_id)
        .await?
        .map(Json)
        .ok_or_else(|| {
            not_found(format!(
                "no taxpayer with tax id {} (data may still be loading)",
                tax_id
            ))
        })
}

// ============ GET /taxpayers/document/{number} ============

async fn handle_by_document(
    State(state): State<AppState>,
    Path(number): Path<String>,
) -> Result<Json<TaxpayerRecord>, AppError> {
    state
        .store
        .find_by_key_prefix(&number)
        .await?
        .map(Json)
        .ok_or_else(|| {
            not_found(format!(
                "no taxpayer for document {} (data may still be loading)",
                number
            ))
        })
}
