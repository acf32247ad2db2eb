//! SalleSense photo HTTP API
//!
//! Axum server that serves stored photos and their metadata. Runs as its own
//! process next to the capture loop, on port 8780 by default.
//!
//! Each endpoint has a thin axum handler that delegates to an inner function;
//! the inner functions are testable without axum dispatch.
//!
//! Endpoints:
//! - GET /health                — DB status
//! - GET /version               — server version info
//! - GET /api/photo/list        — metadata of every stored photo, newest first
//! - GET /api/photo/salle/:room — metadata of the photos of one room
//! - GET /api/photo/salle/:room/stats — photo count and last capture of one room
//! - GET /api/photo/:id         — raw photo bytes, content type from magic bytes
//! - GET /api/evenement/recent  — latest events with their measurement (?limit=, default 10)

use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use sallesense_core::config::HttpConfig;
use sallesense_core::models::{PhotoSummary, RecentEvent, RoomPhotoStats};
use sallesense_core::{ImageFormat, PgCaptureStore};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

/// Events returned by /api/evenement/recent when no limit is given.
pub const DEFAULT_RECENT_EVENTS: i64 = 10;
pub const MAX_RECENT_EVENTS: i64 = 100;

/// Shared state for all HTTP handlers
pub struct HttpState {
    pub store: PgCaptureStore,
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/api/photo/list", get(list_handler))
        .route("/api/photo/salle/:room", get(room_handler))
        .route("/api/photo/salle/:room/stats", get(room_stats_handler))
        .route("/api/photo/:id", get(photo_handler))
        .route("/api/evenement/recent", get(recent_events_handler))
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    store: PgCaptureStore,
    config: &HttpConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(HttpState { store });

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("SalleSense photo API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Inner (directly testable) functions
// ============================================================================

/// Queries the DB and returns (status_code, json_body).
pub async fn health_inner(store: &PgCaptureStore) -> (StatusCode, serde_json::Value) {
    match sallesense_core::db::health_check(store.pool()).await {
        Ok(pg_ver) => (
            StatusCode::OK,
            serde_json::json!({
                "status": "healthy",
                "version": env!("CARGO_PKG_VERSION"),
                "postgresql": pg_ver,
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({
                "status": "unhealthy",
                "error": e.to_string(),
            }),
        ),
    }
}

pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "service": "sallesense-photo-api",
    })
}

/// Photo bytes for a measurement id, or an error body.
pub async fn photo_inner(
    store: &PgCaptureStore,
    id: i32,
) -> std::result::Result<Vec<u8>, (StatusCode, serde_json::Value)> {
    match store.fetch_photo(id).await {
        Ok(Some(bytes)) => Ok(bytes),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            error_body(format!("No photo for measurement {}", id)),
        )),
        Err(e) => {
            tracing::error!(id, error = %e, "Failed to load photo");
            Err((StatusCode::INTERNAL_SERVER_ERROR, error_body(e.to_string())))
        }
    }
}

/// Photo metadata, optionally limited to one room.
pub async fn list_inner(
    store: &PgCaptureStore,
    room_id: Option<i32>,
) -> (StatusCode, serde_json::Value) {
    match store.list_photos(room_id).await {
        Ok(photos) => (StatusCode::OK, photos_body(&photos)),
        Err(e) => {
            tracing::error!(room = ?room_id, error = %e, "Failed to list photos");
            (StatusCode::INTERNAL_SERVER_ERROR, error_body(e.to_string()))
        }
    }
}

pub async fn room_stats_inner(
    store: &PgCaptureStore,
    room_id: i32,
) -> (StatusCode, serde_json::Value) {
    match store.room_photo_stats(room_id).await {
        Ok(Some(stats)) => (StatusCode::OK, room_stats_body(&stats)),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            error_body(format!("No room with id {}", room_id)),
        ),
        Err(e) => {
            tracing::error!(room = room_id, error = %e, "Failed to load room statistics");
            (StatusCode::INTERNAL_SERVER_ERROR, error_body(e.to_string()))
        }
    }
}

/// `limit` is clamped to 1..=MAX_RECENT_EVENTS.
pub async fn recent_events_inner(
    store: &PgCaptureStore,
    limit: Option<i64>,
) -> (StatusCode, serde_json::Value) {
    let limit = recent_limit(limit);
    match store.recent_events(limit).await {
        Ok(events) => (StatusCode::OK, events_body(&events)),
        Err(e) => {
            tracing::error!(limit, error = %e, "Failed to load recent events");
            (StatusCode::INTERNAL_SERVER_ERROR, error_body(e.to_string()))
        }
    }
}

// ============================================================================
// Axum handler wrappers (thin, delegate to inner functions)
// ============================================================================

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state.store).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn photo_handler(
    State(state): State<Arc<HttpState>>,
    Path(id): Path<i32>,
) -> Response {
    match photo_inner(&state.store, id).await {
        Ok(bytes) => photo_response(bytes),
        Err((status, body)) => (status, Json(body)).into_response(),
    }
}

pub async fn list_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = list_inner(&state.store, None).await;
    (status, Json(body))
}

pub async fn room_handler(
    State(state): State<Arc<HttpState>>,
    Path(room): Path<i32>,
) -> impl IntoResponse {
    let (status, body) = list_inner(&state.store, Some(room)).await;
    (status, Json(body))
}

pub async fn room_stats_handler(
    State(state): State<Arc<HttpState>>,
    Path(room): Path<i32>,
) -> impl IntoResponse {
    let (status, body) = room_stats_inner(&state.store, room).await;
    (status, Json(body))
}

#[derive(Debug, Deserialize)]
pub struct RecentEventsQuery {
    pub limit: Option<i64>,
}

pub async fn recent_events_handler(
    State(state): State<Arc<HttpState>>,
    Query(query): Query<RecentEventsQuery>,
) -> impl IntoResponse {
    let (status, body) = recent_events_inner(&state.store, query.limit).await;
    (status, Json(body))
}

// ============================================================================
// Helpers
// ============================================================================

pub fn recent_limit(requested: Option<i64>) -> i64 {
    requested
        .unwrap_or(DEFAULT_RECENT_EVENTS)
        .clamp(1, MAX_RECENT_EVENTS)
}

/// Raw image response. PNG is served as `image/png`, everything else as `image/jpeg`.
pub fn photo_response(bytes: Vec<u8>) -> Response {
    let content_type = ImageFormat::detect(&bytes).content_type();
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type)],
        bytes,
    )
        .into_response()
}

pub fn photos_body(photos: &[PhotoSummary]) -> serde_json::Value {
    let items: Vec<serde_json::Value> = photos
        .iter()
        .map(|p| {
            serde_json::json!({
                "id": p.id_donnee,
                "date": p.date_heure.to_rfc3339(),
                "size_kb": (p.size_kb() * 10.0).round() / 10.0,
                "salle": p.no_salle,
                "capteur": p.id_capteur,
            })
        })
        .collect();
    serde_json::json!({ "count": items.len(), "photos": items })
}

pub fn events_body(events: &[RecentEvent]) -> serde_json::Value {
    let items: Vec<serde_json::Value> = events
        .iter()
        .map(|e| {
            serde_json::json!({
                "id": e.id_evenement,
                "type": e.event_type,
                "description": e.description,
                "donnee": e.id_donnee,
                "date": e.date_heure.to_rfc3339(),
                "salle": e.no_salle,
                "capteur": e.id_capteur,
            })
        })
        .collect();
    serde_json::json!({ "count": items.len(), "events": items })
}

pub fn room_stats_body(stats: &RoomPhotoStats) -> serde_json::Value {
    serde_json::json!({
        "salle": stats.no_salle,
        "numero": stats.numero,
        "photo_count": stats.photo_count,
        "photos_last_7_days": stats.photos_last_7_days,
        "last_capture": stats.last_capture.map(|t| t.to_rfc3339()),
    })
}

fn error_body(msg: impl Into<String>) -> serde_json::Value {
    serde_json::json!({
        "error": msg.into(),
        "status": "error",
    })
}

// ============================================================================
// Unit Tests
// ============================================================================
