//! HTTP surface for the participation service
//!
//! A small axum router exposing the join and read paths plus health and
//! metrics endpoints. Authentication is handled upstream; the member id
//! arrives in the request body.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::error::Error;
use crate::metrics;
use crate::models::{MemberId, RoomId};
use crate::service::ParticipationService;

// ============================================================================
// API Response Types
// ============================================================================

/// Generic API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// Join request body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub member_id: MemberId,
}

// ============================================================================
// App State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ParticipationService>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(service: Arc<ParticipationService>) -> Self {
        Self {
            service,
            start_time: Instant::now(),
        }
    }
}

// ============================================================================
// Server
// ============================================================================

/// HTTP server for the participation API
pub struct ParticipationServer {
    config: ServerConfig,
    state: AppState,
}

impl ParticipationServer {
    pub fn new(config: ServerConfig, service: Arc<ParticipationService>) -> Self {
        Self {
            config,
            state: AppState::new(service),
        }
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        let mut router = create_router(self.state.clone());

        if self.config.enable_cors {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );
        }

        router.layer(TraceLayer::new_for_http())
    }

    /// Start the server with graceful shutdown
    pub async fn start_with_shutdown(
        &self,
        shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let router = self.build_router();
        let addr = self.config.bind_address;

        tracing::info!("Starting participation server on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await?;

        Ok(())
    }
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/metrics", get(get_metrics))
        .route(
            "/api/rooms/{room_id}/participations",
            post(join_room).get(list_participations),
        )
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.start_time.elapsed().as_secs();

    Json(ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: uptime,
    }))
}

/// Prometheus metrics endpoint
async fn get_metrics() -> impl IntoResponse {
    match metrics::gather_metrics() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to gather metrics: {e}"),
        ),
    }
}

/// Join a room and receive the issued rank
async fn join_room(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
    Json(request): Json<JoinRequest>,
) -> impl IntoResponse {
    match state.service.join(room_id, request.member_id).await {
        Ok(record) => (StatusCode::CREATED, Json(ApiResponse::success(record))).into_response(),
        Err(e) => error_response(e),
    }
}

/// List a room's participations ordered by rank
async fn list_participations(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
) -> impl IntoResponse {
    match state.service.list_participations(room_id).await {
        Ok(records) if records.is_empty() => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::<()>::error(format!(
                "no participations found for room {room_id}"
            ))),
        )
            .into_response(),
        Ok(records) => Json(ApiResponse::success(records)).into_response(),
        Err(e) => error_response(e),
    }
}

/// Map a service error to an HTTP response
fn error_response(e: Error) -> axum::response::Response {
    let status = match &e {
        Error::RoomNotFound(_) | Error::MemberNotFound(_) => StatusCode::NOT_FOUND,
        Error::EventNotStarted { .. } => StatusCode::BAD_REQUEST,
        Error::AlreadyParticipated { .. } => StatusCode::CONFLICT,
        Error::LockTimeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (status, Json(ApiResponse::<()>::error(e.to_string()))).into_response()
}
