//! LiveKit join tokens.
//!
//! POST /livekit-token: `{ roomName, participantName, participantIdentity? }` → `{ token }`

use axum::{extract::State, routing::post, Json, Router};
use multicam_common::{
    error::{MulticamError, MulticamResult},
    validation::validate_request,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use crate::AppState;

const REQUIRED: &str = "roomName and participantName are required";

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/livekit-token", post(create_token))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    #[validate(
        required(message = "roomName and participantName are required"),
        length(min = 1, message = "roomName and participantName are required")
    )]
    pub room_name: Option<String>,
    #[validate(
        required(message = "roomName and participantName are required"),
        length(min = 1, message = "roomName and participantName are required")
    )]
    pub participant_name: Option<String>,
    pub participant_identity: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

async fn create_token(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TokenRequest>,
) -> MulticamResult<Json<TokenResponse>> {
    validate_request(&body)?;

    let (Some(room_name), Some(participant_name)) = (&body.room_name, &body.participant_name)
    else {
        return Err(MulticamError::validation(REQUIRED));
    };

    let token = state.tokens.participant_token(
        room_name,
        participant_name,
        body.participant_identity.as_deref(),
    )?;

    tracing::info!(
        room = %room_name,
        participant = %participant_name,
        "Issued LiveKit token"
    );

    Ok(Json(TokenResponse { token }))
}

#[cfg(test)]
mod tests {
    use crate::test_support::{send, state};
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn issues_verifiable_token() {
        let app_state = state();
        let signer = app_state.tokens.clone();

        let (status, body) = send(
            app_state,
            "POST",
            "/api/livekit-token",
            Some(json!({ "roomName": "general", "participantName": "Alice" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let claims = signer.verify(body["token"].as_str().unwrap()).unwrap();
        assert_eq!(claims.sub, "Alice");
        assert_eq!(claims.video.room.as_deref(), Some("general"));
        assert_eq!(claims.video.room_join, Some(true));
    }

    #[tokio::test]
    async fn identity_is_forwarded() {
        let app_state = state();
        let signer = app_state.tokens.clone();

        let (_, body) = send(
            app_state,
            "POST",
            "/api/livekit-token",
            Some(json!({
                "roomName": "general",
                "participantName": "Alice",
                "participantIdentity": "alice-tablet"
            })),
        )
        .await;

        let claims = signer.verify(body["token"].as_str().unwrap()).unwrap();
        assert_eq!(claims.sub, "alice-tablet");
        assert_eq!(claims.name.as_deref(), Some("Alice"));
    }

    #[tokio::test]
    async fn missing_fields_are_bad_request() {
        for body in [
            json!({ "participantName": "Alice" }),
            json!({ "roomName": "general" }),
            json!({ "roomName": "", "participantName": "Alice" }),
        ] {
            let (status, resp) = send(state(), "POST", "/api/livekit-token", Some(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(
                resp["message"],
                "Validation failed: roomName and participantName are required"
            );
        }
    }
}
