//! Axum-based HTTP server for the operator API.
//!
//! Provides REST endpoints for:
//! - GET `/api/state` - Trains and reservations snapshot
//! - POST `/api/trains/{id}/place` - Assert a train's position
//! - POST `/api/trains/{id}/start` - Start a train on a route
//! - POST `/api/trains/{id}/stop` - Stop a train
//! - POST `/api/trains/{id}/finish` - Finish at the next station
//! - POST `/api/discover` - Enumerate the station's locomotives
//! - GET `/api/diagnostics` - Layout inspector findings
//! - POST `/api/repair` - Remove trivially invalid state
//!
//! Every handler translates the request into a [`RuntimeMessage`] and
//! enqueues it; the runtime task applies messages in order (see
//! [`super::runner`]).

use std::net::SocketAddr;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::layout::{BlockId, Destination, RouteId, TrainId};
use crate::runtime::DiscoveryPolicy;

use super::api::{
    ApiResponse, CommandResponse, PlaceRequest, RuntimeSnapshot, StartRequest, StopRequest,
};
use super::runner::{RuntimeHandle, RuntimeMessage};

// ============================================================================
// Route Handlers
// ============================================================================

/// GET /api/state - Snapshot of trains and reservations
async fn get_state(State(handle): State<RuntimeHandle>) -> Json<ApiResponse<RuntimeSnapshot>> {
    match handle.snapshot() {
        Some(snapshot) => Json(ApiResponse::ok(snapshot)),
        None => Json(ApiResponse::err("Runtime unavailable")),
    }
}

/// POST /api/trains/{id}/place - Assert a train's position
async fn place_train(
    State(handle): State<RuntimeHandle>,
    Path(id): Path<String>,
    Json(request): Json<PlaceRequest>,
) -> Json<ApiResponse<CommandResponse>> {
    let accepted = handle.send(RuntimeMessage::Place {
        train: TrainId::new(id),
        block: BlockId::new(request.block),
        position: request.position,
        direction: request.direction,
    });
    if accepted {
        Json(ApiResponse::ok(CommandResponse::accepted("placed")))
    } else {
        Json(ApiResponse::err("Runtime unavailable"))
    }
}

/// POST /api/trains/{id}/start - Start a train on a route
async fn start_train(
    State(handle): State<RuntimeHandle>,
    Path(id): Path<String>,
    Json(request): Json<StartRequest>,
) -> Json<ApiResponse<CommandResponse>> {
    let destination = request.destination.map(|block| {
        let mut destination = Destination::new(block);
        if let Some(direction) = request.destination_direction {
            destination = destination.with_direction(direction);
        }
        destination
    });
    let accepted = handle.send(RuntimeMessage::Start {
        train: TrainId::new(id),
        route: RouteId::new(request.route),
        destination,
    });
    if accepted {
        Json(ApiResponse::ok(CommandResponse::accepted("started")))
    } else {
        Json(ApiResponse::err("Runtime unavailable"))
    }
}

/// POST /api/trains/{id}/stop - Stop a train
async fn stop_train(
    State(handle): State<RuntimeHandle>,
    Path(id): Path<String>,
    Json(request): Json<StopRequest>,
) -> Json<ApiResponse<CommandResponse>> {
    let accepted = handle.send(RuntimeMessage::Stop {
        train: TrainId::new(id),
        completely: request.completely,
    });
    if accepted {
        Json(ApiResponse::ok(CommandResponse::accepted("stopping")))
    } else {
        Json(ApiResponse::err("Runtime unavailable"))
    }
}

/// POST /api/trains/{id}/finish - Finish at the next station
async fn finish_train(
    State(handle): State<RuntimeHandle>,
    Path(id): Path<String>,
) -> Json<ApiResponse<CommandResponse>> {
    let accepted = handle.send(RuntimeMessage::Finish {
        train: TrainId::new(id),
    });
    if accepted {
        Json(ApiResponse::ok(CommandResponse::accepted("finishing")))
    } else {
        Json(ApiResponse::err("Runtime unavailable"))
    }
}

/// POST /api/discover - Enumerate locomotives (merge policy)
async fn discover(State(handle): State<RuntimeHandle>) -> Json<ApiResponse<CommandResponse>> {
    let accepted = handle.send(RuntimeMessage::Discover(DiscoveryPolicy::Merge));
    if accepted {
        Json(ApiResponse::ok(CommandResponse::accepted("discovering")))
    } else {
        Json(ApiResponse::err("Runtime unavailable"))
    }
}

/// GET /api/diagnostics - Layout inspector findings
async fn get_diagnostics(State(handle): State<RuntimeHandle>) -> Json<ApiResponse<Vec<String>>> {
    match handle.diagnostics() {
        Some(issues) => Json(ApiResponse::ok(issues)),
        None => Json(ApiResponse::err("Runtime unavailable")),
    }
}

/// POST /api/repair - Remove trivially invalid state
async fn repair(State(handle): State<RuntimeHandle>) -> Json<ApiResponse<usize>> {
    match handle.repair() {
        Some(count) => Json(ApiResponse::ok(count)),
        None => Json(ApiResponse::err("Runtime unavailable")),
    }
}

/// Fallback handler for 404
async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::<()>::err("Not found")),
    )
}

// ============================================================================
// Server Builder
// ============================================================================

/// Configuration for the web server
#[derive(Debug, Clone)]
pub struct WebServerConfig {
    /// Address to bind to
    pub addr: SocketAddr,
    /// Whether to enable CORS for all origins
    pub cors_permissive: bool,
}

impl Default for WebServerConfig {
    fn default() -> Self {
        Self {
            addr: ([0, 0, 0, 0], 8080).into(),
            cors_permissive: true,
        }
    }
}

impl WebServerConfig {
    /// Create a new config listening on the given port
    pub fn on_port(port: u16) -> Self {
        Self {
            addr: ([0, 0, 0, 0], port).into(),
            ..Self::default()
        }
    }

    /// Set whether CORS should be permissive
    pub fn cors(mut self, permissive: bool) -> Self {
        self.cors_permissive = permissive;
        self
    }
}

/// Build the Axum router with all routes
pub fn build_router(handle: RuntimeHandle, config: &WebServerConfig) -> Router {
    let mut router = Router::new()
        .route("/api/state", get(get_state))
        .route("/api/trains/:id/place", post(place_train))
        .route("/api/trains/:id/start", post(start_train))
        .route("/api/trains/:id/stop", post(stop_train))
        .route("/api/trains/:id/finish", post(finish_train))
        .route("/api/discover", post(discover))
        .route("/api/diagnostics", get(get_diagnostics))
        .route("/api/repair", post(repair))
        .fallback(not_found)
        .with_state(handle);

    if config.cors_permissive {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router
}

/// Start the web server.
///
/// This function blocks until the server is shut down. The runtime task
/// must already be running (see [`super::runner::spawn`]).
pub async fn run_server(
    handle: RuntimeHandle,
    config: WebServerConfig,
) -> Result<(), std::io::Error> {
    let router = build_router(handle, &config);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    log::info!("operator API listening on http://{}", config.addr);

    axum::serve(listener, router).await
}
