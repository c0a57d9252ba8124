//! Runtime configuration for the session layer.

use serde::{Deserialize, Serialize};
use takjil_core::{GameConfig, SessionCode};

/// Longest accepted display name, in characters.
pub const MAX_NAME_LEN: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Prefix of the relay topic for a session (default: "session:")
    pub channel_prefix: String,
    /// Origin used to build join links (default: "http://localhost:3000")
    pub base_url: String,
    /// Name announced when the player has not picked one (default: "Player")
    pub default_player_name: String,
    /// Rows returned by the leaderboard (default: 5)
    pub leaderboard_size: usize,
    pub game: GameConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            channel_prefix: "session:".to_string(),
            base_url: "http://localhost:3000".to_string(),
            default_player_name: "Player".to_string(),
            leaderboard_size: 5,
            game: GameConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Relay topic for `code`.
    pub fn topic(&self, code: &SessionCode) -> String {
        format!("{}{code}", self.channel_prefix)
    }

    pub fn join_url(&self, code: &SessionCode) -> String {
        code.join_url(&self.base_url)
    }

    /// Trimmed display name capped at [`MAX_NAME_LEN`], or the default when
    /// nothing is left.
    pub fn display_name(&self, input: &str) -> String {
        let trimmed: String = input.trim().chars().take(MAX_NAME_LEN).collect();
        if trimmed.is_empty() {
            self.default_player_name.clone()
        } else {
            trimmed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_and_link() {
        let config = SessionConfig::default();
        let code = SessionCode::parse("K7P4M2").unwrap();
        assert_eq!(config.topic(&code), "session:K7P4M2");
        assert_eq!(
            config.join_url(&code),
            "http://localhost:3000/activity-3?session=K7P4M2"
        );
    }

    #[test]
    fn test_display_name() {
        let config = SessionConfig::default();
        assert_eq!(config.display_name("  Ana "), "Ana");
        assert_eq!(config.display_name("   "), "Player");
        assert_eq!(config.display_name(&"x".repeat(30)).len(), MAX_NAME_LEN);
    }
}
