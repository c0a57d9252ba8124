//! Broadcast event protocol.
//!
//! Every message on a session channel is an event name plus a JSON payload.
//! Decoding checks shape and value ranges, so a malformed message from any
//! peer is rejected before it reaches the reducer.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{GameItem, Position};

/// Event names as they appear on the wire.
pub mod event_name {
    pub const COUNTDOWN_START: &str = "countdown_start";
    pub const GAME_START: &str = "game_start";
    pub const HAND_POSITION: &str = "hand_position";
    pub const ITEM_SPAWN: &str = "item_spawn";
    pub const ITEM_COLLECTED: &str = "item_collected";
    pub const SCORE_UPDATE: &str = "score_update";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandPositionPayload {
    pub player_id: String,
    pub x: f32,
    pub y: f32,
}

impl HandPositionPayload {
    pub fn position(&self) -> Position {
        Position::new(self.x, self.y)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemCollectedPayload {
    pub item_id: String,
    pub player_id: String,
    /// The collector's new total, not a delta.
    pub score: u32,
    /// Unix epoch milliseconds.
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreUpdatePayload {
    pub player_id: String,
    pub score: u32,
}

/// One broadcast message.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    /// Host started the 3-2-1 countdown.
    CountdownStart,
    /// Host marked the session as playing.
    GameStart,
    HandPosition(HandPositionPayload),
    ItemSpawn(GameItem),
    ItemCollected(ItemCollectedPayload),
    ScoreUpdate(ScoreUpdatePayload),
}

#[derive(thiserror::Error, Debug)]
pub enum ProtocolError {
    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    #[error("Malformed {event} payload: {source}")]
    Malformed {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid {event} payload: {reason}")]
    Invalid {
        event: &'static str,
        reason: &'static str,
    },

    #[error("Failed to encode {event} payload: {source}")]
    Encode {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl GameEvent {
    /// Wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            GameEvent::CountdownStart => event_name::COUNTDOWN_START,
            GameEvent::GameStart => event_name::GAME_START,
            GameEvent::HandPosition(_) => event_name::HAND_POSITION,
            GameEvent::ItemSpawn(_) => event_name::ITEM_SPAWN,
            GameEvent::ItemCollected(_) => event_name::ITEM_COLLECTED,
            GameEvent::ScoreUpdate(_) => event_name::SCORE_UPDATE,
        }
    }

    /// Only the host may originate these.
    pub fn is_host_only(&self) -> bool {
        matches!(
            self,
            GameEvent::CountdownStart | GameEvent::GameStart | GameEvent::ItemSpawn(_)
        )
    }

    /// Encode to `(event name, payload)`.
    pub fn encode(&self) -> Result<(&'static str, Value), ProtocolError> {
        let event = self.name();
        let payload = match self {
            GameEvent::CountdownStart | GameEvent::GameStart => Ok(Value::Object(serde_json::Map::new())),
            GameEvent::HandPosition(p) => serde_json::to_value(p),
            GameEvent::ItemSpawn(item) => serde_json::to_value(item),
            GameEvent::ItemCollected(p) => serde_json::to_value(p),
            GameEvent::ScoreUpdate(p) => serde_json::to_value(p),
        }
        .map_err(|source| ProtocolError::Encode { event, source })?;
        Ok((event, payload))
    }

    /// Decode and validate a received `(event name, payload)` pair.
    pub fn decode(event: &str, payload: Value) -> Result<Self, ProtocolError> {
        let decoded = match event {
            event_name::COUNTDOWN_START => {
                expect_object(event_name::COUNTDOWN_START, &payload)?;
                GameEvent::CountdownStart
            }
            event_name::GAME_START => {
                expect_object(event_name::GAME_START, &payload)?;
                GameEvent::GameStart
            }
            event_name::HAND_POSITION => {
                GameEvent::HandPosition(parse(event_name::HAND_POSITION, payload)?)
            }
            event_name::ITEM_SPAWN => GameEvent::ItemSpawn(parse(event_name::ITEM_SPAWN, payload)?),
            event_name::ITEM_COLLECTED => {
                GameEvent::ItemCollected(parse(event_name::ITEM_COLLECTED, payload)?)
            }
            event_name::SCORE_UPDATE => {
                GameEvent::ScoreUpdate(parse(event_name::SCORE_UPDATE, payload)?)
            }
            other => return Err(ProtocolError::UnknownEvent(other.to_string())),
        };
        decoded.validate()
    }

    fn validate(self) -> Result<Self, ProtocolError> {
        let event = self.name();
        let invalid = |reason| Err(ProtocolError::Invalid { event, reason });
        match &self {
            GameEvent::CountdownStart | GameEvent::GameStart => {}
            GameEvent::HandPosition(p) => {
                if p.player_id.is_empty() {
                    return invalid("empty playerId");
                }
                if !p.position().is_normalized() {
                    return invalid("coordinates outside [0, 1]");
                }
            }
            GameEvent::ItemSpawn(item) => {
                if item.id.is_empty() {
                    return invalid("empty id");
                }
                if !item.position.is_normalized() {
                    return invalid("position outside [0, 1]");
                }
                if !(item.fall_speed.is_finite() && item.fall_speed >= 0.0) {
                    return invalid("negative fallSpeed");
                }
            }
            GameEvent::ItemCollected(p) => {
                if p.item_id.is_empty() {
                    return invalid("empty itemId");
                }
                if p.player_id.is_empty() {
                    return invalid("empty playerId");
                }
            }
            GameEvent::ScoreUpdate(p) => {
                if p.player_id.is_empty() {
                    return invalid("empty playerId");
                }
            }
        }
        Ok(self)
    }
}

fn parse<T: DeserializeOwned>(event: &'static str, payload: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(payload).map_err(|source| ProtocolError::Malformed { event, source })
}

fn expect_object(event: &'static str, payload: &Value) -> Result<(), ProtocolError> {
    if payload.is_object() {
        Ok(())
    } else {
        Err(ProtocolError::Invalid {
            event,
            reason: "expected an object",
        })
    }
}
