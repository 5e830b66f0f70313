//! Room service: create, list and delete SFU rooms.
//!
//! LiveKit auto-creates rooms when the first participant joins, so creating one
//! up front is only needed to pin limits like `max_participants`. The
//! [`RoomService`] trait is the seam between the HTTP routes and whichever
//! backend is configured: LiveKit's Twirp API or a process-local map.

use async_trait::async_trait;
use chrono::Utc;
use multicam_common::config::LiveKitConfig;
use multicam_common::error::MulticamError;
use multicam_common::livekit::TokenSigner;
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Used when a create request leaves `emptyTimeout` unset or zero (10 minutes).
pub const DEFAULT_EMPTY_TIMEOUT_SECS: u32 = 10 * 60;
/// Used when a create request leaves `maxParticipants` unset or zero.
pub const DEFAULT_MAX_PARTICIPANTS: u32 = 20;

#[derive(Debug, thiserror::Error)]
pub enum RoomServiceError {
    #[error("Room {0} not found")]
    NotFound(String),

    #[error("LiveKit returned {status} ({code}): {msg}")]
    Twirp { status: u16, code: String, msg: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("Invalid LiveKit URL {0}")]
    InvalidUrl(String),
}

impl From<RoomServiceError> for MulticamError {
    fn from(err: RoomServiceError) -> Self {
        match err {
            RoomServiceError::NotFound(room) => MulticamError::NotFound {
                resource: format!("Room {room}"),
            },
            other => MulticamError::Upstream {
                message: other.to_string(),
            },
        }
    }
}

/// An SFU room as reported by the room service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct Room {
    #[serde(default)]
    pub sid: String,
    pub name: String,
    #[serde(default, alias = "emptyTimeout")]
    pub empty_timeout: u32,
    #[serde(default, alias = "maxParticipants")]
    pub max_participants: u32,
    /// Unix seconds. protojson encodes int64 as a string.
    #[serde(default, alias = "creationTime", deserialize_with = "lenient_i64")]
    pub creation_time: i64,
    #[serde(default, alias = "numParticipants")]
    pub num_participants: u32,
    #[serde(default)]
    pub metadata: String,
}

/// Options accepted by `create`; zero or missing values fall back to defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomOptions {
    pub max_participants: Option<u32>,
    /// Seconds the room stays open once empty.
    pub empty_timeout: Option<u32>,
}

impl CreateRoomOptions {
    pub fn max_participants(&self) -> u32 {
        self.max_participants
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_MAX_PARTICIPANTS)
    }

    pub fn empty_timeout(&self) -> u32 {
        self.empty_timeout
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_EMPTY_TIMEOUT_SECS)
    }
}

#[async_trait]
pub trait RoomService: Send + Sync {
    /// Create a room. `Ok(None)` means it already existed.
    async fn create_room(
        &self,
        name: &str,
        options: &CreateRoomOptions,
    ) -> Result<Option<Room>, RoomServiceError>;

    /// All active rooms.
    async fn list_rooms(&self) -> Result<Vec<Room>, RoomServiceError>;

    /// Delete a room, disconnecting its participants.
    async fn delete_room(&self, name: &str) -> Result<(), RoomServiceError>;

    async fn room_info(&self, name: &str) -> Result<Option<Room>, RoomServiceError> {
        Ok(self
            .list_rooms()
            .await?
            .into_iter()
            .find(|room| room.name == name))
    }
}

// ── LiveKit ───────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct CreateRoomRequest<'a> {
    name: &'a str,
    empty_timeout: u32,
    max_participants: u32,
}

#[derive(Serialize)]
struct ListRoomsRequest {
    names: Vec<String>,
}

#[derive(Deserialize)]
struct ListRoomsResponse {
    #[serde(default)]
    rooms: Vec<Room>,
}

#[derive(Serialize)]
struct DeleteRoomRequest<'a> {
    room: &'a str,
}

#[derive(Deserialize)]
struct Empty {}

#[derive(Deserialize)]
struct TwirpError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    msg: String,
}

/// LiveKit's `livekit.RoomService` over Twirp/JSON.
pub struct LiveKitRoomClient {
    http: reqwest::Client,
    base_url: String,
    signer: TokenSigner,
}

impl LiveKitRoomClient {
    pub fn new(config: &LiveKitConfig) -> Result<Self, RoomServiceError> {
        Ok(Self {
            http: reqwest::Client::new(),
            base_url: http_base_url(&config.ws_url)?,
            signer: TokenSigner::from_config(config),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn call<Req, Resp>(
        &self,
        method: &str,
        body: &Req,
        room: Option<&str>,
    ) -> Result<Resp, RoomServiceError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let token = self.signer.admin_token(room)?;
        let url = format!("{}/twirp/livekit.RoomService/{method}", self.base_url);

        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let err = serde_json::from_str::<TwirpError>(&text).unwrap_or(TwirpError {
                code: status.as_str().to_string(),
                msg: text,
            });
            return Err(RoomServiceError::Twirp {
                status: status.as_u16(),
                code: err.code,
                msg: err.msg,
            });
        }

        Ok(response.json::<Resp>().await?)
    }
}

#[async_trait]
impl RoomService for LiveKitRoomClient {
    async fn create_room(
        &self,
        name: &str,
        options: &CreateRoomOptions,
    ) -> Result<Option<Room>, RoomServiceError> {
        tracing::info!(room = %name, ?options, "Creating LiveKit room");

        let request = CreateRoomRequest {
            name,
            empty_timeout: options.empty_timeout(),
            max_participants: options.max_participants(),
        };

        match self.call::<_, Room>("CreateRoom", &request, None).await {
            Ok(room) => {
                tracing::info!(room = %room.name, sid = %room.sid, "Room created");
                Ok(Some(room))
            }
            Err(e) if is_already_exists(&e) => {
                tracing::info!(room = %name, "Room already exists");
                Ok(None)
            }
            Err(e) => {
                tracing::error!(room = %name, error = %e, "Failed to create room");
                Err(e)
            }
        }
    }

    async fn list_rooms(&self) -> Result<Vec<Room>, RoomServiceError> {
        let response: ListRoomsResponse = self
            .call("ListRooms", &ListRoomsRequest { names: Vec::new() }, None)
            .await?;
        tracing::debug!(count = response.rooms.len(), "Listed rooms");
        Ok(response.rooms)
    }

    async fn delete_room(&self, name: &str) -> Result<(), RoomServiceError> {
        tracing::info!(room = %name, "Deleting LiveKit room");

        match self
            .call::<_, Empty>("DeleteRoom", &DeleteRoomRequest { room: name }, Some(name))
            .await
        {
            Ok(_) => Ok(()),
            Err(RoomServiceError::Twirp { code, .. }) if code == "not_found" => {
                Err(RoomServiceError::NotFound(name.to_string()))
            }
            Err(e) => Err(e),
        }
    }
}

fn is_already_exists(err: &RoomServiceError) -> bool {
    match err {
        RoomServiceError::Twirp { code, msg, .. } => {
            code == "already_exists" || msg.contains("already exists")
        }
        _ => false,
    }
}

/// `ws://host:7880` → `http://host:7880`, `wss://` → `https://`.
pub fn http_base_url(ws_url: &str) -> Result<String, RoomServiceError> {
    let mut url =
        url::Url::parse(ws_url).map_err(|_| RoomServiceError::InvalidUrl(ws_url.to_string()))?;

    let scheme = match url.scheme() {
        "ws" | "http" => "http",
        "wss" | "https" => "https",
        _ => return Err(RoomServiceError::InvalidUrl(ws_url.to_string())),
    };
    url.set_scheme(scheme)
        .map_err(|_| RoomServiceError::InvalidUrl(ws_url.to_string()))?;

    Ok(url.as_str().trim_end_matches('/').to_string())
}

fn lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrString {
        Num(i64),
        Str(String),
    }

    match NumOrString::deserialize(deserializer)? {
        NumOrString::Num(n) => Ok(n),
        NumOrString::Str(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

// ── In-memory ─────────────────────────────────────────────────────────────────

/// Process-local rooms for development without an SFU, and for tests.
#[derive(Clone, Default)]
pub struct InMemoryRoomService {
    rooms: Arc<RwLock<HashMap<String, Room>>>,
}

impl InMemoryRoomService {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoomService for InMemoryRoomService {
    async fn create_room(
        &self,
        name: &str,
        options: &CreateRoomOptions,
    ) -> Result<Option<Room>, RoomServiceError> {
        let mut rooms = self.rooms.write().await;
        if rooms.contains_key(name) {
            return Ok(None);
        }

        let room = Room {
            sid: format!("RM_{}", short_sid(name)),
            name: name.to_string(),
            empty_timeout: options.empty_timeout(),
            max_participants: options.max_participants(),
            creation_time: Utc::now().timestamp(),
            num_participants: 0,
            metadata: String::new(),
        };
        rooms.insert(name.to_string(), room.clone());

        tracing::info!(room = %name, "Room created (in-memory)");
        Ok(Some(room))
    }

    async fn list_rooms(&self) -> Result<Vec<Room>, RoomServiceError> {
        let mut rooms: Vec<Room> = self.rooms.read().await.values().cloned().collect();
        rooms.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rooms)
    }

    async fn delete_room(&self, name: &str) -> Result<(), RoomServiceError> {
        self.rooms
            .write()
            .await
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| RoomServiceError::NotFound(name.to_string()))
    }
}

/// FNV-1a of the name, enough for a stable in-memory sid.
fn short_sid(name: &str) -> String {
    let hash = name
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325_u64, |h, b| {
            (h ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
        });
    format!("{hash:012x}").chars().take(12).collect()
}
