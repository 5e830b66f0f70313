//! Application configuration loaded from environment variables and config files.
//!
//! Config precedence: legacy env vars (`PORT`, `LIVEKIT_API_KEY`, ...) >
//! `MULTICAM__SECTION__KEY` env vars > .env file > config.toml > defaults

use serde::Deserialize;
use std::sync::OnceLock;

static CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// Get the global application configuration.
///
/// # Panics
/// Panics if config has not been initialized via [`init`].
pub fn get() -> &'static AppConfig {
    CONFIG.get().expect("Config not initialized. Call multicam_common::config::init() first.")
}

/// Initialize the global configuration from environment.
///
/// Should be called once at application startup, before any other code accesses config.
pub fn init() -> Result<&'static AppConfig, config::ConfigError> {
    // Load .env file if present (development)
    let _ = dotenvy::dotenv();

    let app_config = load()?;
    Ok(CONFIG.get_or_init(|| app_config))
}

/// Build a configuration without touching the global slot.
pub fn load() -> Result<AppConfig, config::ConfigError> {
    let cfg = config::Config::builder()
        // Defaults
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 4000)?
        .set_default("livekit.ws_url", "ws://localhost:7880")?
        .set_default("livekit.api_key", "devkey")?
        .set_default("livekit.api_secret", "secret")?
        .set_default("livekit.token_ttl_secs", 21_600)? // 6 hours
        .set_default("livekit.mode", "livekit")?
        .set_default("signaling.default_room", "main-room")?
        .set_default("signaling.max_peers_per_room", 16)?
        .set_default("signaling.channel_capacity", 64)?
        // Optional config file
        .add_source(config::File::with_name("config").required(false))
        // Environment variables (MULTICAM__SERVER__PORT, MULTICAM__LIVEKIT__API_KEY, etc.)
        .add_source(
            config::Environment::with_prefix("MULTICAM")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        // Variables understood by the LiveKit tooling and older deployments
        .set_override_option("server.port", legacy_env("PORT"))?
        .set_override_option("livekit.api_key", legacy_env("LIVEKIT_API_KEY"))?
        .set_override_option("livekit.api_secret", legacy_env("LIVEKIT_API_SECRET"))?
        .set_override_option(
            "livekit.ws_url",
            legacy_env("LIVEKIT_WS_URL").or_else(|| legacy_env("NEXT_PUBLIC_LIVEKIT_WS_URL")),
        )?
        .build()?;

    cfg.try_deserialize()
}

fn legacy_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub livekit: LiveKitConfig,
    pub signaling: SignalingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    /// API and signaling share this port.
    pub port: u16,
}

/// Which room service backs `/api/room-management`.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RoomServiceMode {
    /// LiveKit's Twirp room service at `ws_url`.
    Livekit,
    /// Process-local rooms, no SFU involved.
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LiveKitConfig {
    /// `ws://localhost:7880` locally, `wss://<project>.livekit.cloud` in the cloud
    pub ws_url: String,
    pub api_key: String,
    /// HS256 signing secret shared with the LiveKit server
    pub api_secret: String,
    /// Lifetime of participant join tokens
    pub token_ttl_secs: u64,
    pub mode: RoomServiceMode,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SignalingConfig {
    /// Room used when `join-room` does not name one.
    pub default_room: String,
    /// 0 = unlimited
    pub max_peers_per_room: usize,
    /// Outbound frames buffered per socket before frames are dropped.
    pub channel_capacity: usize,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            default_room: "main-room".into(),
            max_peers_per_room: 16,
            channel_capacity: 64,
        }
    }
}
