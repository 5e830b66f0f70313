//! Default rooms pre-created for common setups.

use serde::Serialize;

use crate::room_service::{CreateRoomOptions, Room, RoomService};

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultRoom {
    pub name: &'static str,
    pub description: &'static str,
    pub max_participants: u32,
    /// Seconds
    pub empty_timeout: u32,
}

pub const DEFAULT_ROOMS: [DefaultRoom; 3] = [
    DefaultRoom {
        name: "general",
        description: "General purpose room for casual meetings",
        max_participants: 8,
        empty_timeout: 30 * 60,
    },
    DefaultRoom {
        name: "multicam-studio",
        description: "Studio room optimized for multicam setups",
        // Several devices per person
        max_participants: 15,
        empty_timeout: 60 * 60,
    },
    DefaultRoom {
        name: "meeting-room-1",
        description: "Formal meeting room",
        max_participants: 10,
        empty_timeout: 45 * 60,
    },
];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInitResult {
    #[serde(flatten)]
    pub config: DefaultRoom,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<Room>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct InitSummary {
    pub total: usize,
    /// Rooms that exist afterwards, including ones that already did.
    pub created: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitReport {
    pub success: bool,
    pub results: Vec<RoomInitResult>,
    pub summary: InitSummary,
}

/// Create every default room, continuing past individual failures.
pub async fn initialize_default_rooms(service: &dyn RoomService) -> InitReport {
    tracing::info!("Initializing default rooms");

    let mut results = Vec::with_capacity(DEFAULT_ROOMS.len());

    for config in DEFAULT_ROOMS {
        let options = CreateRoomOptions {
            max_participants: Some(config.max_participants),
            empty_timeout: Some(config.empty_timeout),
        };

        let result = match service.create_room(config.name, &options).await {
            Ok(Some(room)) => {
                tracing::info!(room = config.name, "Default room created");
                RoomInitResult {
                    config,
                    success: true,
                    room: Some(room),
                    message: None,
                    error: None,
                }
            }
            Ok(None) => {
                tracing::info!(room = config.name, "Default room already exists");
                RoomInitResult {
                    config,
                    success: true,
                    room: None,
                    message: Some("Room already exists".into()),
                    error: None,
                }
            }
            Err(e) => {
                tracing::error!(room = config.name, error = %e, "Failed to create default room");
                RoomInitResult {
                    config,
                    success: false,
                    room: None,
                    message: None,
                    error: Some(e.to_string()),
                }
            }
        };
        results.push(result);
    }

    let created = results.iter().filter(|r| r.success).count();
    let summary = InitSummary {
        total: results.len(),
        created,
        failed: results.len() - created,
    };

    InitReport {
        success: true,
        results,
        summary,
    }
}
