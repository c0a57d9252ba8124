//! Takjil War Core Library
//!
//! Pure session logic for the multiplayer hand-tracking game: session codes,
//! the player/item model, the broadcast event protocol, presence roster
//! rebuilds, and the reducer that folds presence and broadcast traffic into a
//! single client-local view. Nothing in here performs I/O.

#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod code;
pub mod config;
pub mod gesture;
pub mod model;
pub mod presence;
pub mod protocol;
pub mod spawn;
pub mod state;

pub use code::{CODE_ALPHABET, CODE_LEN, CodeError, SessionCode};
pub use config::GameConfig;
pub use gesture::{
    HandReading, INDEX_TIP, LANDMARK_COUNT, Landmark, PinchDetector, THUMB_TIP, Viewport,
    item_under_cursor,
};
pub use model::{Color, GameItem, ItemKind, Player, Position, SessionStatus};
pub use presence::{PresenceEntry, PresenceMeta, Roster};
pub use protocol::{
    GameEvent, HandPositionPayload, ItemCollectedPayload, ProtocolError, ScoreUpdatePayload,
};
pub use spawn::ItemSpawner;
pub use state::{COUNTDOWN_TICKS, GamePhase, ROUND_SECS, SessionAction, SessionNotice, SessionState};
