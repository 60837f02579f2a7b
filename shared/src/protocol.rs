//! Wire protocol: sprite records, snapshot batching, and message envelopes.
//!
//! All traffic is newline-delimited JSON text. A snapshot travels as a
//! JSON-encoded [`SpriteDataGroup`] string nested inside the server
//! envelope's `state` field; an empty `state` string is the warm-up
//! signal, not an error.

use crate::entity::{EntityError, Registry};
use crate::vec::Vec2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Protocol version spoken by this build. The server rejects clients below
/// it; the client refuses servers above it.
pub const VERSION: f32 = 1.0;

/// Errors that end a connection or a session.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("peer did not send a protocol version")]
    MissingVersion,
    #[error("incompatible protocol version v{0} (this build speaks v{VERSION})")]
    IncompatibleVersion(f32),
    #[error("message missing required field `{0}`")]
    MissingField(&'static str),
    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(#[from] serde_json::Error),
    #[error("peer reported error: {0}")]
    Remote(String),
    #[error("winner id `{0}` does not resolve to a character")]
    BadWinner(String),
    #[error("connection closed")]
    ConnectionClosed,
    #[error(transparent)]
    Entity(#[from] EntityError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Wire record for one entity.
///
/// The `kind` tag makes the character/gem distinction explicit on the wire;
/// a record without a recognizable tag fails decoding. `score` is present
/// only in authoritative snapshots — the client's intent report omits it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SpriteData {
    Character {
        sprite_id: String,
        pos: Vec2,
        username: String,
        velocity: Vec2,
        thrust: Vec2,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        score: Option<u32>,
    },
    Gem {
        sprite_id: String,
        pos: Vec2,
        #[serde(default)]
        owner_id: Option<String>,
        #[serde(default)]
        collision_time: Option<f64>,
        dead: bool,
    },
}

impl SpriteData {
    pub fn sprite_id(&self) -> &str {
        match self {
            SpriteData::Character { sprite_id, .. } | SpriteData::Gem { sprite_id, .. } => {
                sprite_id
            }
        }
    }

    pub fn is_character(&self) -> bool {
        matches!(self, SpriteData::Character { .. })
    }

    pub fn is_gem(&self) -> bool {
        matches!(self, SpriteData::Gem { .. })
    }
}

/// One full snapshot of every live entity. Order carries no meaning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpriteDataGroup {
    pub data: Vec<SpriteData>,
}

/// Serializes every registered entity into a snapshot string.
pub fn encode_state(registry: &Registry) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(&registry.report_all())?)
}

/// Parses a snapshot string. Fails with [`ProtocolError::MalformedSnapshot`]
/// on any schema violation.
pub fn decode_state(text: &str) -> Result<SpriteDataGroup, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}

/// Client → server message: the handshake (carries `username`) and the
/// per-tick report (carries `player_state`) share one envelope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_state: Option<SpriteData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ClientEnvelope {
    pub fn hello(username: &str) -> Self {
        Self {
            version: Some(VERSION),
            username: Some(username.to_string()),
            ..Self::default()
        }
    }

    pub fn report(player_state: SpriteData) -> Self {
        Self {
            version: Some(VERSION),
            player_state: Some(player_state),
            ..Self::default()
        }
    }

    /// Server-side validation: the error key is checked before anything else
    /// in the payload is trusted, then the version gate.
    pub fn check(&self) -> Result<(), ProtocolError> {
        if let Some(error) = &self.error {
            return Err(ProtocolError::Remote(error.clone()));
        }
        match self.version {
            None => Err(ProtocolError::MissingVersion),
            Some(v) if v < VERSION => Err(ProtocolError::IncompatibleVersion(v)),
            Some(_) => Ok(()),
        }
    }
}

/// Server → client message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<f32>,
    /// JSON-encoded [`SpriteDataGroup`]; empty string during warm-up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// The joining player's authoritative record (handshake reply only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_state: Option<SpriteData>,
    /// Set on the terminal snapshot once the game has been won.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServerEnvelope {
    pub fn snapshot(state: String) -> Self {
        Self {
            version: Some(VERSION),
            state: Some(state),
            ..Self::default()
        }
    }

    /// The "not enough ticks buffered yet" reply.
    pub fn warmup() -> Self {
        Self::snapshot(String::new())
    }

    pub fn with_winner(mut self, winner: String) -> Self {
        self.winner = Some(winner);
        self
    }

    pub fn with_player_state(mut self, player_state: SpriteData) -> Self {
        self.player_state = Some(player_state);
        self
    }

    /// Client-side validation: error first, then the version gate. A server
    /// ahead of this build means the client needs updating.
    pub fn check(&self) -> Result<(), ProtocolError> {
        if let Some(error) = &self.error {
            return Err(ProtocolError::Remote(error.clone()));
        }
        match self.version {
            None => Err(ProtocolError::MissingVersion),
            Some(v) if v > VERSION => Err(ProtocolError::IncompatibleVersion(v)),
            Some(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Character, ControlMode, Gem, GemPhase, Registry};

    fn sample_character(id: &str) -> Character {
        let mut character = Character::new(
            id.to_string(),
            "tester".to_string(),
            Vec2::new(100.0, 200.0),
            ControlMode::RemoteOther,
        );
        character.velocity = Vec2::new(1.5, -2.5);
        character.score = 4;
        character
    }

    #[test]
    fn test_roundtrip_snapshot() {
        let mut registry = Registry::new();
        registry.insert_character(sample_character("c1"));
        let mut gem = Gem::new("g1".to_string(), Vec2::new(50.0, 60.0));
        gem.phase = GemPhase::Claiming {
            owner_id: "c1".to_string(),
            since: 123.25,
        };
        registry.insert_gem(gem);

        let encoded = encode_state(&registry).unwrap();
        let decoded = decode_state(&encoded).unwrap();

        assert_eq!(decoded, registry.report_all());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_state("not json"),
            Err(ProtocolError::MalformedSnapshot(_))
        ));
        assert!(matches!(
            decode_state(r#"{"data": [{"sprite_id": "x"}]}"#),
            Err(ProtocolError::MalformedSnapshot(_))
        ));
    }

    #[test]
    fn test_classification_by_kind_tag() {
        let character_json = r#"{"kind":"character","sprite_id":"a","pos":{"x":1.0,"y":2.0},"username":"u","velocity":{"x":0.0,"y":0.0},"thrust":{"x":0.0,"y":0.0},"score":0}"#;
        let gem_json = r#"{"kind":"gem","sprite_id":"g","pos":{"x":1.0,"y":2.0},"owner_id":null,"collision_time":null,"dead":false}"#;

        let character: SpriteData = serde_json::from_str(character_json).unwrap();
        let gem: SpriteData = serde_json::from_str(gem_json).unwrap();
        assert!(character.is_character());
        assert!(gem.is_gem());

        // records with no recognizable kind fail decoding outright
        let untagged = r#"{"sprite_id":"a","pos":{"x":1.0,"y":2.0}}"#;
        assert!(serde_json::from_str::<SpriteData>(untagged).is_err());
        let unknown = r#"{"kind":"portal","sprite_id":"a","pos":{"x":1.0,"y":2.0}}"#;
        assert!(serde_json::from_str::<SpriteData>(unknown).is_err());
    }

    #[test]
    fn test_intent_report_omits_score() {
        let character = sample_character("c1");
        let intent = character.report_intent();
        let json = serde_json::to_string(&intent).unwrap();
        assert!(!json.contains("score"));
        assert!(json.contains("thrust"));
    }

    #[test]
    fn test_client_envelope_version_gate() {
        let mut hello = ClientEnvelope::hello("tester");
        assert!(hello.check().is_ok());

        hello.version = Some(0.5);
        assert!(matches!(
            hello.check(),
            Err(ProtocolError::IncompatibleVersion(_))
        ));

        hello.version = None;
        assert!(matches!(hello.check(), Err(ProtocolError::MissingVersion)));
    }

    #[test]
    fn test_server_envelope_error_checked_first() {
        let envelope = ServerEnvelope {
            version: None,
            error: Some("session rejected".to_string()),
            ..ServerEnvelope::default()
        };
        assert!(matches!(envelope.check(), Err(ProtocolError::Remote(_))));
    }

    #[test]
    fn test_server_envelope_future_version_rejected() {
        let envelope = ServerEnvelope {
            version: Some(VERSION + 1.0),
            ..ServerEnvelope::default()
        };
        assert!(matches!(
            envelope.check(),
            Err(ProtocolError::IncompatibleVersion(_))
        ));
    }

    #[test]
    fn test_warmup_state_is_empty_string() {
        let envelope = ServerEnvelope::warmup();
        assert_eq!(envelope.state.as_deref(), Some(""));
        assert!(envelope.check().is_ok());
    }

    #[test]
    fn test_envelope_roundtrip() {
        let report = ClientEnvelope::report(sample_character("c1").report_intent());
        let json = serde_json::to_string(&report).unwrap();
        let back: ClientEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back.version, Some(VERSION));
        assert_eq!(
            back.player_state.as_ref().map(|s| s.sprite_id()),
            Some("c1")
        );
        assert!(back.username.is_none());
    }
}
