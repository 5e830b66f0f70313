//! GET /signaling/rooms: who is connected to the signaling relay right now.

use axum::{extract::State, routing::get, Json, Router};
use multicam_signaling::registry::SignalingStats;
use std::sync::Arc;

use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/signaling/rooms", get(signaling_rooms))
}

async fn signaling_rooms(State(state): State<Arc<AppState>>) -> Json<SignalingStats> {
    Json(state.signaling.stats().await)
}

#[cfg(test)]
mod tests {
    use crate::test_support::{send, state};
    use tokio::sync::mpsc;
    use uuid::Uuid;

    #[tokio::test]
    async fn lists_rooms_peers_and_hot_mic() {
        let app = state();
        let alice = Uuid::new_v4();
        let (tx, _rx) = mpsc::channel(8);
        app.signaling
            .join(alice, "alice", "main-room", tx.clone())
            .await
            .unwrap();
        app.signaling.mic_toggle(alice, "alice", true).await.unwrap();

        let (_, body) = send(app, "GET", "/api/signaling/rooms", None).await;

        assert_eq!(body["active_rooms"], 1);
        assert_eq!(body["total_connections"], 1);
        assert_eq!(body["rooms"][0]["name"], "main-room");
        assert_eq!(body["rooms"][0]["members"][0]["peer_id"], "alice");
        assert_eq!(body["rooms"][0]["hot_mic"], "alice");
    }
}
