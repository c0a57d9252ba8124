//! Takjil War Session Runtime
//!
//! Connects the pure session logic in `takjil-core` to its collaborators: a
//! row store for session records and the leaderboard, and a pub/sub relay for
//! presence and broadcasts. In-process implementations of both are included.

#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod connection;
pub mod directory;
pub mod error;
pub mod relay;
pub mod store;

pub use config::{MAX_NAME_LEN, SessionConfig};
pub use connection::{SessionConnection, generate_player_id};
pub use directory::SessionDirectory;
pub use error::SessionError;
pub use relay::{MemoryChannel, MemoryRelay, Relay, RelayChannel, RelayError, RelayMessage};
pub use store::{MemoryStore, ScoreRecord, SessionRecord, SessionStore, StoreError};

/// Connection over the in-process store and relay.
pub type MemoryConnection = SessionConnection<MemoryStore, MemoryChannel>;
