//! Room management routes.
//!
//! Routes:
//! - GET  /room-management?action=list: all active rooms
//! - GET  /room-management?action=info&roomName=…: one room (null if absent)
//! - POST /room-management `{ action: "create", roomName, options? }`
//! - POST /room-management `{ action: "delete", roomName }`
//! - GET  /initialize-rooms: create the default rooms

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use multicam_common::{
    error::{MulticamError, MulticamResult},
    validation::validate_room_name,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{
    defaults::{initialize_default_rooms, InitReport},
    room_service::{CreateRoomOptions, Room},
    AppState,
};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/room-management", get(query_rooms).post(mutate_room))
        .route("/initialize-rooms", get(initialize_rooms))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomQuery {
    pub action: Option<String>,
    pub room_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomAction {
    pub action: Option<String>,
    pub room_name: Option<String>,
    #[serde(default)]
    pub options: CreateRoomOptions,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum RoomResponse {
    List { rooms: Vec<Room> },
    One { room: Option<Room> },
    Deleted { success: bool },
}

/// Non-empty `roomName` or a 400 naming the action.
fn required_room_name(room_name: Option<String>, action: &str) -> MulticamResult<String> {
    match room_name.filter(|n| !n.is_empty()) {
        Some(name) => Ok(name),
        None => Err(MulticamError::validation(format!(
            "roomName is required for {action} action"
        ))),
    }
}

async fn query_rooms(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RoomQuery>,
) -> MulticamResult<Json<RoomResponse>> {
    match query.action.as_deref() {
        Some("list") => {
            let rooms = state.room_service.list_rooms().await?;
            Ok(Json(RoomResponse::List { rooms }))
        }
        Some("info") => {
            let room_name = required_room_name(query.room_name, "info")?;
            let room = state.room_service.room_info(&room_name).await?;
            Ok(Json(RoomResponse::One { room }))
        }
        _ => Err(MulticamError::validation(
            "Invalid action. Use 'list' or 'info'",
        )),
    }
}

async fn mutate_room(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RoomAction>,
) -> MulticamResult<Json<RoomResponse>> {
    match body.action.as_deref() {
        Some("create") => {
            let room_name = required_room_name(body.room_name, "create")?;
            validate_room_name(&room_name)?;
            let room = state
                .room_service
                .create_room(&room_name, &body.options)
                .await?;
            Ok(Json(RoomResponse::One { room }))
        }
        Some("delete") => {
            let room_name = required_room_name(body.room_name, "delete")?;
            state.room_service.delete_room(&room_name).await?;
            tracing::info!(room = %room_name, "Room deleted");
            Ok(Json(RoomResponse::Deleted { success: true }))
        }
        _ => Err(MulticamError::validation(
            "Invalid action. Use 'create' or 'delete'",
        )),
    }
}

async fn initialize_rooms(State(state): State<Arc<AppState>>) -> Json<InitReport> {
    Json(initialize_default_rooms(state.room_service.as_ref()).await)
}

#[cfg(test)]
mod tests {
    use crate::test_support::{send, state};
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn create_then_list_and_info() {
        let app = state();

        let (status, body) = send(
            app.clone(),
            "POST",
            "/api/room-management",
            Some(json!({
                "action": "create",
                "roomName": "general",
                "options": { "maxParticipants": 8, "emptyTimeout": 1800 }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["room"]["name"], "general");
        assert_eq!(body["room"]["maxParticipants"], 8);

        let (_, body) = send(app.clone(), "GET", "/api/room-management?action=list", None).await;
        assert_eq!(body["rooms"].as_array().unwrap().len(), 1);

        let (_, body) = send(
            app.clone(),
            "GET",
            "/api/room-management?action=info&roomName=general",
            None,
        )
        .await;
        assert_eq!(body["room"]["emptyTimeout"], 1800);

        let (_, body) = send(
            app,
            "GET",
            "/api/room-management?action=info&roomName=missing",
            None,
        )
        .await;
        assert!(body["room"].is_null());
    }

    #[tokio::test]
    async fn creating_existing_room_returns_null() {
        let app = state();
        let create = json!({ "action": "create", "roomName": "general" });

        send(app.clone(), "POST", "/api/room-management", Some(create.clone())).await;
        let (status, body) = send(app, "POST", "/api/room-management", Some(create)).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body["room"].is_null());
    }

    #[tokio::test]
    async fn delete_reports_success_and_missing_is_not_found() {
        let app = state();
        send(
            app.clone(),
            "POST",
            "/api/room-management",
            Some(json!({ "action": "create", "roomName": "general" })),
        )
        .await;

        let delete = json!({ "action": "delete", "roomName": "general" });
        let (status, body) =
            send(app.clone(), "POST", "/api/room-management", Some(delete.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        let (status, _) = send(app, "POST", "/api/room-management", Some(delete)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invalid_actions_and_missing_names_are_bad_requests() {
        let (status, body) = send(state(), "GET", "/api/room-management?action=nope", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["message"],
            "Validation failed: Invalid action. Use 'list' or 'info'"
        );

        let (status, _) = send(state(), "GET", "/api/room-management?action=info", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            state(),
            "POST",
            "/api/room-management",
            Some(json!({ "action": "create" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["message"],
            "Validation failed: roomName is required for create action"
        );

        let (status, _) = send(
            state(),
            "POST",
            "/api/room-management",
            Some(json!({ "action": "rename", "roomName": "x" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn initialize_rooms_reports_summary() {
        let (status, body) = send(state(), "GET", "/api/initialize-rooms", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["summary"]["total"], 3);
        assert_eq!(body["summary"]["created"], 3);
        assert_eq!(body["summary"]["failed"], 0);
        assert_eq!(body["results"][1]["name"], "multicam-studio");
    }
}
