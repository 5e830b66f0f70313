//! # multicam-api
//!
//! REST API layer for Multicam: LiveKit join tokens, SFU room management,
//! default-room bootstrap and signaling relay statistics.

pub mod defaults;
pub mod middleware;
pub mod room_service;
pub mod routes;

use axum::Router;
use multicam_common::livekit::TokenSigner;
use multicam_signaling::registry::RoomRegistry;
use room_service::RoomService;
use std::sync::Arc;
use std::time::Instant;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    /// Backend for `/api/room-management` and `/api/initialize-rooms`.
    pub room_service: Arc<dyn RoomService>,
    /// Signs participant join tokens.
    pub tokens: TokenSigner,
    /// Shared with the signaling relay for `/api/signaling/rooms`.
    pub signaling: RoomRegistry,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        room_service: Arc<dyn RoomService>,
        tokens: TokenSigner,
        signaling: RoomRegistry,
    ) -> Self {
        Self {
            room_service,
            tokens,
            signaling,
            started_at: Instant::now(),
        }
    }
}

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .merge(routes::token::router())
        .merge(routes::rooms::router())
        .merge(routes::signaling::router());

    Router::new()
        .nest("/api", api_routes)
        .merge(routes::health::router())
        .layer(axum::middleware::from_fn(middleware::security_headers))
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::compression::CompressionLayer::new())
        .with_state(Arc::new(state))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use multicam_common::config::SignalingConfig;
    use room_service::InMemoryRoomService;
    use tower::ServiceExt;

    pub fn state() -> AppState {
        AppState::new(
            Arc::new(InMemoryRoomService::new()),
            TokenSigner::new("devkey", "test-secret", 3600),
            RoomRegistry::new(&SignalingConfig::default()),
        )
    }

    pub async fn send(
        state: AppState,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                request = request.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = build_router(state)
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }
}
