// file: src/api/http.rs
// description: http front end for search, record events, stats and health
// reference: https://docs.rs/axum

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::error::{Result, SearchError};
use crate::index::IndexStats;
use crate::models::{EntityType, RecordEvent, SearchRequest, SearchResponse};
use crate::pipeline::{IngestStats, SearchContext};
use crate::utils::telemetry::HealthReport;

type AppState = Arc<SearchContext>;

/// Maps engine errors onto status codes with a caller-safe body.
#[derive(Debug)]
pub struct ApiError(SearchError);

impl From<SearchError> for ApiError {
    fn from(err: SearchError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            SearchError::IndexUnavailable(_) | SearchError::Database(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            SearchError::EmbeddingService(_) => StatusCode::BAD_GATEWAY,
            SearchError::Validation(_) | SearchError::Normalization { .. } => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        } else {
            warn!(error = %self.0, "Request rejected");
        }
        (status, Json(json!({ "error": self.0.public_message() }))).into_response()
    }
}

/// One event or a list of events.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum EventBody {
    One(RecordEvent),
    Many(Vec<RecordEvent>),
}

impl EventBody {
    fn into_events(self) -> Vec<RecordEvent> {
        match self {
            EventBody::One(event) => vec![event],
            EventBody::Many(events) => events,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Accepted {
    pub accepted: usize,
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    index: IndexStats,
    ingest: IngestStats,
}

pub fn router(service: AppState) -> Router {
    Router::new()
        .route("/ai/search", post(search))
        .route("/records", post(submit_records))
        .route("/records/:entity_type/:source_id", delete(delete_record))
        .route("/stats", get(stats))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(service)
}

/// Binds `host:port` and serves until ctrl-c.
pub async fn serve(service: AppState) -> Result<()> {
    let addr = format!(
        "{}:{}",
        service.config().server.host,
        service.config().server.port
    );
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Could not install ctrl-c handler");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

async fn search(
    State(service): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> std::result::Result<Json<SearchResponse>, ApiError> {
    Ok(Json(service.search(&request).await?))
}

async fn submit_records(
    State(service): State<AppState>,
    Json(body): Json<EventBody>,
) -> std::result::Result<(StatusCode, Json<Accepted>), ApiError> {
    let events = body.into_events();
    let accepted = events.len();
    for event in events {
        service.submit(event).await?;
    }
    Ok((StatusCode::ACCEPTED, Json(Accepted { accepted })))
}

async fn delete_record(
    State(service): State<AppState>,
    Path((entity_type, source_id)): Path<(String, String)>,
) -> std::result::Result<(StatusCode, Json<Accepted>), ApiError> {
    let entity_type: EntityType = entity_type.parse()?;
    service
        .submit(RecordEvent::delete(entity_type, source_id))
        .await?;
    Ok((StatusCode::ACCEPTED, Json(Accepted { accepted: 1 })))
}

async fn stats(
    State(service): State<AppState>,
) -> std::result::Result<Json<StatsResponse>, ApiError> {
    Ok(Json(StatsResponse {
        index: service.stats()?,
        ingest: service.ingest_stats(),
    }))
}

async fn health(State(service): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let report = service.health().await;
    let status = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}
