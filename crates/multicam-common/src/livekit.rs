//! LiveKit access tokens.
//!
//! LiveKit authenticates both room participants and room-service calls with
//! HS256 JWTs signed by the project's API secret. The API key goes in `iss`,
//! the participant identity in `sub`, permissions in the `video` grant.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::LiveKitConfig;

/// Lifetime of tokens minted for room-service calls.
const ADMIN_TOKEN_TTL_SECS: i64 = 600;

/// The `video` grant of a LiveKit token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoGrant {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_join: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_publish: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_subscribe: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_create: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_list: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_admin: Option<bool>,
}

impl VideoGrant {
    /// Join `room` with publish and subscribe rights.
    pub fn participant(room: &str) -> Self {
        Self {
            room: Some(room.to_string()),
            room_join: Some(true),
            can_publish: Some(true),
            can_subscribe: Some(true),
            ..Default::default()
        }
    }

    /// Create, list and administer rooms; `room` scopes admin calls to one room.
    pub fn admin(room: Option<&str>) -> Self {
        Self {
            room: room.map(str::to_string),
            room_create: Some(true),
            room_list: Some(true),
            room_admin: Some(true),
            ..Default::default()
        }
    }
}

/// JWT claims understood by LiveKit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// API key
    pub iss: String,
    /// Participant identity
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub nbf: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    pub video: VideoGrant,
}

/// Mints and verifies tokens for one LiveKit project.
#[derive(Debug, Clone)]
pub struct TokenSigner {
    api_key: String,
    api_secret: String,
    ttl_secs: u64,
}

impl TokenSigner {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>, ttl_secs: u64) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            ttl_secs,
        }
    }

    pub fn from_config(config: &LiveKitConfig) -> Self {
        Self::new(&config.api_key, &config.api_secret, config.token_ttl_secs)
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Token that lets `participant_name` join `room_name`.
    /// The identity falls back to the participant name.
    pub fn participant_token(
        &self,
        room_name: &str,
        participant_name: &str,
        participant_identity: Option<&str>,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let identity = participant_identity
            .filter(|id| !id.is_empty())
            .unwrap_or(participant_name);

        self.sign(
            identity,
            Some(participant_name),
            VideoGrant::participant(room_name),
            self.ttl_secs as i64,
        )
    }

    /// Short-lived token for room-service calls.
    pub fn admin_token(&self, room: Option<&str>) -> Result<String, jsonwebtoken::errors::Error> {
        self.sign("", None, VideoGrant::admin(room), ADMIN_TOKEN_TTL_SECS)
    }

    /// Decode and check a token signed with this project's secret.
    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.api_key]);
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.api_secret.as_bytes()),
            &validation,
        )?;
        Ok(token_data.claims)
    }

    fn sign(
        &self,
        identity: &str,
        name: Option<&str>,
        video: VideoGrant,
        ttl_secs: i64,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let claims = Claims {
            iss: self.api_key.clone(),
            sub: identity.to_string(),
            name: name.map(str::to_string),
            nbf: now.timestamp(),
            exp: (now + Duration::seconds(ttl_secs)).timestamp(),
            jti: (!identity.is_empty()).then(|| identity.to_string()),
            video,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.api_secret.as_bytes()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> TokenSigner {
        TokenSigner::new("devkey", "secret-with-enough-entropy", 3600)
    }

    #[test]
    fn participant_token_grants_join_publish_subscribe() {
        let s = signer();
        let token = s.participant_token("general", "Alice", None).unwrap();
        let claims = s.verify(&token).unwrap();

        assert_eq!(claims.iss, "devkey");
        assert_eq!(claims.sub, "Alice");
        assert_eq!(claims.name.as_deref(), Some("Alice"));
        assert_eq!(claims.video, VideoGrant::participant("general"));
        assert!(claims.exp - claims.nbf >= 3600);
    }

    #[test]
    fn explicit_identity_wins_over_name() {
        let s = signer();
        let token = s
            .participant_token("general", "Alice", Some("alice-phone"))
            .unwrap();
        let claims = s.verify(&token).unwrap();
        assert_eq!(claims.sub, "alice-phone");
        assert_eq!(claims.jti.as_deref(), Some("alice-phone"));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = signer().participant_token("general", "Bob", None).unwrap();
        let other = TokenSigner::new("devkey", "another-secret", 3600);
        assert!(other.verify(&token).is_err());
    }

    #[test]
    fn admin_grant_serializes_camel_case() {
        let json = serde_json::to_value(VideoGrant::admin(Some("general"))).unwrap();
        assert_eq!(json["roomCreate"], true);
        assert_eq!(json["roomList"], true);
        assert_eq!(json["room"], "general");
        assert!(json.get("roomJoin").is_none());
    }
}
