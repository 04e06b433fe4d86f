use crate::mjpeg;
use crate::state::{AppState, StatusReport};
use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use detection::{FireStatus, ResponseRecord};
use tower_http::cors::CorsLayer;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/status", get(status))
        .route("/api/fire_status", get(fire_status))
        .route("/api/history", get(history))
        .route("/video_feed/:stream", get(video_feed))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until the shared shutdown flag is raised.
pub async fn run_server(bind: &str, state: AppState) -> anyhow::Result<()> {
    let shutdown = state.shutdown.clone();
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(address = %listener.local_addr()?, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await?;

    tracing::info!("HTTP server stopped");
    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn status(State(state): State<AppState>) -> Json<StatusReport> {
    Json(state.status())
}

async fn fire_status(State(state): State<AppState>) -> Json<FireStatus> {
    Json(state.detection.fire_status())
}

async fn history(State(state): State<AppState>) -> Json<Vec<ResponseRecord>> {
    Json(state.detection.history())
}

async fn video_feed(Path(stream): Path<String>, State(state): State<AppState>) -> Response {
    let Some(handle) = state.stream(&stream) else {
        tracing::debug!(stream = %stream, "Feed requested for unknown stream");
        return (StatusCode::NOT_FOUND, format!("unknown stream: {stream}")).into_response();
    };

    tracing::debug!(stream = %stream, "MJPEG client connected");
    let parts = mjpeg::feed(handle.buffer.clone(), state.feed, state.shutdown.clone());
    (
        [
            (header::CONTENT_TYPE, mjpeg::CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(parts),
    )
        .into_response()
}
