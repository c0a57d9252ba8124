//! Client-local session state and its reducer.
//!
//! Presence and broadcast traffic, local input and timer ticks are all
//! [`SessionAction`]s. The reducer is the only thing that mutates
//! [`SessionState`], so merge behaviour can be tested without a network.

use std::collections::HashSet;

use crate::code::SessionCode;
use crate::config::GameConfig;
use crate::model::{GameItem, Player, Position, SessionStatus};
use crate::presence::{PresenceEntry, PresenceMeta, Roster};
use crate::protocol::GameEvent;

/// Countdown length in ticks (3-2-1).
pub const COUNTDOWN_TICKS: u32 = 3;

/// Round length in seconds.
pub const ROUND_SECS: u32 = 30;

/// Client-local game phase. `Countdown` is never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GamePhase {
    /// In the lobby.
    #[default]
    Waiting,
    /// 3-2-1 before the round.
    Countdown { remaining: u32 },
    /// Round running on this client's clock.
    Playing { remaining_secs: u32 },
    /// This client's round timer ran out.
    Finished,
}

impl GamePhase {
    /// The persisted status this phase corresponds to.
    pub fn status(self) -> SessionStatus {
        match self {
            GamePhase::Waiting | GamePhase::Countdown { .. } => SessionStatus::Waiting,
            GamePhase::Playing { .. } => SessionStatus::Playing,
            GamePhase::Finished => SessionStatus::Finished,
        }
    }

    pub fn is_playing(self) -> bool {
        matches!(self, GamePhase::Playing { .. })
    }
}

/// Everything that can change a [`SessionState`].
#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    // Presence
    PresenceSync(Vec<PresenceEntry>),
    PresenceJoin { key: String, metas: Vec<PresenceMeta> },
    PresenceLeave { key: String },

    /// Decoded broadcast from another client.
    Remote(GameEvent),

    // Local input
    /// Host pressed start.
    StartCountdown,
    /// Host persisted the playing status.
    StartGame,
    LocalHand(Position),
    LocalCollect { item_id: String, score: u32 },
    LocalScore(u32),
    LocalSpawn(GameItem),
    LocalRename(String),

    /// One tick of the countdown or round timer elapsed.
    Tick,
    /// Drop items that have fallen past the bottom edge by `now_ms`.
    ExpireItems { now_ms: u64 },
}

/// Something a caller may want to react to (lobby toasts, sounds, UI flow).
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotice {
    PlayerJoined(Player),
    PlayerLeft(String),
    CountdownStarted,
    CountdownTick(u32),
    GameStarted,
    GameEnded,
    ItemCollected { item_id: String, player_id: String },
}

/// One client's view of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub session_code: SessionCode,
    pub local_player_id: String,
    pub is_host: bool,
    pub players: Roster,
    pub items: Vec<GameItem>,
    pub phase: GamePhase,
    /// Ids of collected items. They are never re-added.
    collected: HashSet<String>,
    local_name: String,
    local_score: u32,
    local_hand: Option<Position>,
    countdown_ticks: u32,
    round_secs: u32,
}

impl SessionState {
    pub fn new(
        session_code: SessionCode,
        local_player_id: String,
        local_name: String,
        is_host: bool,
        config: &GameConfig,
    ) -> Self {
        Self {
            session_code,
            local_player_id,
            is_host,
            players: Roster::new(),
            items: Vec::new(),
            phase: GamePhase::Waiting,
            collected: HashSet::new(),
            local_name,
            local_score: 0,
            local_hand: None,
            countdown_ticks: config.countdown_ticks,
            round_secs: config.round_secs,
        }
    }

    /// Starting phase for a client joining a session already in `status`.
    /// `elapsed_secs` is the time since the persisted start, if known.
    #[must_use]
    pub fn resumed(mut self, status: SessionStatus, elapsed_secs: Option<u64>) -> Self {
        self.phase = match status {
            SessionStatus::Waiting => GamePhase::Waiting,
            SessionStatus::Playing => {
                let elapsed = u32::try_from(elapsed_secs.unwrap_or(0)).unwrap_or(u32::MAX);
                match self.round_secs.saturating_sub(elapsed) {
                    0 => GamePhase::Finished,
                    remaining_secs => GamePhase::Playing { remaining_secs },
                }
            }
            SessionStatus::Finished => GamePhase::Finished,
        };
        self
    }

    pub fn status(&self) -> SessionStatus {
        self.phase.status()
    }

    pub fn local_player(&self) -> Option<&Player> {
        self.players.get(&self.local_player_id)
    }

    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    /// This client's own score. Authoritative regardless of what peers echo.
    pub fn local_score(&self) -> u32 {
        self.local_score
    }

    pub fn item(&self, id: &str) -> Option<&GameItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn was_collected(&self, id: &str) -> bool {
        self.collected.contains(id)
    }

    /// Pure form of [`SessionState::apply`].
    #[must_use]
    pub fn reduce(mut self, action: SessionAction) -> Self {
        self.apply(action);
        self
    }

    /// Apply one action in place.
    pub fn apply(&mut self, action: SessionAction) -> Option<SessionNotice> {
        match action {
            SessionAction::PresenceSync(snapshot) => {
                self.players = self.players.rebuild(&snapshot);
                self.restore_local_entry();
                None
            }
            SessionAction::PresenceJoin { key, metas } => {
                let player = self.players.provisional(&PresenceEntry { key, metas });
                Some(SessionNotice::PlayerJoined(player))
            }
            SessionAction::PresenceLeave { key } => Some(SessionNotice::PlayerLeft(key)),
            SessionAction::Remote(event) => self.apply_remote(event),
            SessionAction::StartCountdown => self.begin_countdown(),
            SessionAction::StartGame => self.begin_round(),
            SessionAction::LocalHand(position) => {
                self.local_hand = Some(position);
                self.restore_local_entry();
                None
            }
            SessionAction::LocalCollect { item_id, score } => {
                self.local_score = score;
                self.restore_local_entry();
                self.remove_item(&item_id).then(|| SessionNotice::ItemCollected {
                    item_id,
                    player_id: self.local_player_id.clone(),
                })
            }
            SessionAction::LocalScore(score) => {
                self.local_score = score;
                self.restore_local_entry();
                None
            }
            SessionAction::LocalSpawn(item) => {
                self.add_item(item);
                None
            }
            SessionAction::LocalRename(name) => {
                self.local_name.clone_from(&name);
                if let Some(player) = self.players.get_mut(&self.local_player_id) {
                    player.name = name;
                }
                None
            }
            SessionAction::Tick => self.tick(),
            SessionAction::ExpireItems { now_ms } => {
                self.items.retain(|item| !item.has_fallen_off(now_ms));
                None
            }
        }
    }

    fn apply_remote(&mut self, event: GameEvent) -> Option<SessionNotice> {
        match event {
            GameEvent::CountdownStart => self.begin_countdown(),
            GameEvent::GameStart => self.begin_round(),
            GameEvent::HandPosition(payload) => {
                let position = payload.position();
                if let Some(player) = self.remote_player_mut(&payload.player_id) {
                    player.hand_position = Some(position);
                }
                None
            }
            GameEvent::ItemSpawn(item) => {
                self.add_item(item);
                None
            }
            GameEvent::ItemCollected(payload) => {
                let newly_collected = self.remove_item(&payload.item_id);
                if let Some(player) = self.remote_player_mut(&payload.player_id) {
                    player.score = payload.score;
                }
                newly_collected.then_some(SessionNotice::ItemCollected {
                    item_id: payload.item_id,
                    player_id: payload.player_id,
                })
            }
            GameEvent::ScoreUpdate(payload) => {
                // Last write wins, even when the new score is lower.
                if let Some(player) = self.remote_player_mut(&payload.player_id) {
                    player.score = payload.score;
                }
                None
            }
        }
    }

    /// A roster entry a remote message may overwrite. Never our own.
    fn remote_player_mut(&mut self, player_id: &str) -> Option<&mut Player> {
        if player_id == self.local_player_id {
            return None;
        }
        self.players.get_mut(player_id)
    }

    fn restore_local_entry(&mut self) {
        let (score, hand) = (self.local_score, self.local_hand);
        if let Some(player) = self.players.get_mut(&self.local_player_id) {
            player.score = score;
            player.hand_position = hand;
        }
    }

    fn add_item(&mut self, item: GameItem) {
        if self.collected.contains(&item.id) || self.item(&item.id).is_some() {
            return;
        }
        self.items.push(item);
    }

    /// Returns true the first time `item_id` is collected.
    fn remove_item(&mut self, item_id: &str) -> bool {
        self.items.retain(|item| item.id != item_id);
        self.collected.insert(item_id.to_string())
    }

    fn begin_countdown(&mut self) -> Option<SessionNotice> {
        if self.phase != GamePhase::Waiting {
            return None;
        }
        self.phase = GamePhase::Countdown {
            remaining: self.countdown_ticks,
        };
        Some(SessionNotice::CountdownStarted)
    }

    fn begin_round(&mut self) -> Option<SessionNotice> {
        if !matches!(self.phase, GamePhase::Waiting | GamePhase::Countdown { .. }) {
            return None;
        }
        self.phase = GamePhase::Playing {
            remaining_secs: self.round_secs,
        };
        Some(SessionNotice::GameStarted)
    }

    fn tick(&mut self) -> Option<SessionNotice> {
        match self.phase {
            GamePhase::Countdown { remaining } if remaining <= 1 => self.begin_round(),
            GamePhase::Countdown { remaining } => {
                self.phase = GamePhase::Countdown {
                    remaining: remaining - 1,
                };
                Some(SessionNotice::CountdownTick(remaining - 1))
            }
            GamePhase::Playing { remaining_secs } if remaining_secs <= 1 => {
                self.phase = GamePhase::Finished;
                Some(SessionNotice::GameEnded)
            }
            GamePhase::Playing { remaining_secs } => {
                self.phase = GamePhase::Playing {
                    remaining_secs: remaining_secs - 1,
                };
                None
            }
            GamePhase::Waiting | GamePhase::Finished => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ItemKind;
    use crate::protocol::{HandPositionPayload, ItemCollectedPayload, ScoreUpdatePayload};

    fn code() -> SessionCode {
        SessionCode::parse("K7P4M2").unwrap()
    }

    fn state_for(local: &str, is_host: bool) -> SessionState {
        SessionState::new(
            code(),
            local.to_string(),
            local.to_string(),
            is_host,
            &GameConfig::default(),
        )
        .reduce(SessionAction::PresenceSync(vec![
            PresenceEntry::new("A", vec![PresenceMeta::announce("Ana", 0)]),
            PresenceEntry::new("B", vec![PresenceMeta::announce("Budi", 0)]),
        ]))
    }

    fn item(id: &str) -> GameItem {
        GameItem {
            id: id.to_string(),
            kind: ItemKind::Tahu,
            position: Position::new(0.5, 0.0),
            spawned_at: 0,
            fall_speed: 0.0,
        }
    }

    fn collected(item_id: &str, player_id: &str, score: u32) -> SessionAction {
        SessionAction::Remote(GameEvent::ItemCollected(ItemCollectedPayload {
            item_id: item_id.to_string(),
            player_id: player_id.to_string(),
            score,
            timestamp: 0,
        }))
    }

    fn score_update(player_id: &str, score: u32) -> SessionAction {
        SessionAction::Remote(GameEvent::ScoreUpdate(ScoreUpdatePayload {
            player_id: player_id.to_string(),
            score,
        }))
    }

    #[test]
    fn test_item_collected_is_idempotent() {
        let mut state = state_for("B", false)
            .reduce(SessionAction::Remote(GameEvent::ItemSpawn(item("x1"))))
            .reduce(SessionAction::Remote(GameEvent::ItemSpawn(item("x2"))));

        assert!(state.apply(collected("x1", "A", 10)).is_some());
        let after_first = state.clone();
        assert!(state.apply(collected("x1", "A", 10)).is_none());

        assert_eq!(state, after_first);
        assert!(state.item("x1").is_none());
        assert!(state.item("x2").is_some());
        assert_eq!(state.players.get("A").unwrap().score, 10);
    }

    #[test]
    fn test_collected_item_never_respawns() {
        let state = state_for("B", false)
            .reduce(collected("x1", "A", 10))
            .reduce(SessionAction::Remote(GameEvent::ItemSpawn(item("x1"))));
        assert!(state.items.is_empty());
        assert!(state.was_collected("x1"));
    }

    #[test]
    fn test_duplicate_spawn_is_ignored() {
        let state = state_for("B", false)
            .reduce(SessionAction::Remote(GameEvent::ItemSpawn(item("x1"))))
            .reduce(SessionAction::Remote(GameEvent::ItemSpawn(item("x1"))));
        assert_eq!(state.items.len(), 1);
    }

    #[test]
    fn test_score_update_is_last_write_wins() {
        let state = state_for("B", false)
            .reduce(score_update("A", 50))
            .reduce(score_update("A", 20));
        assert_eq!(state.players.get("A").unwrap().score, 20);
    }

    #[test]
    fn test_increasing_scores_are_monotonic() {
        let mut state = state_for("B", false);
        let mut last = 0;
        for (i, score) in [10, 20, 30, 40].into_iter().enumerate() {
            let action = if i % 2 == 0 {
                score_update("A", score)
            } else {
                collected(&format!("i{i}"), "A", score)
            };
            state.apply(action);
            let now = state.players.get("A").unwrap().score;
            assert!(now >= last);
            last = now;
        }
        assert_eq!(last, 40);
    }

    #[test]
    fn test_remote_echo_cannot_overwrite_own_entry() {
        let state = state_for("A", false)
            .reduce(SessionAction::LocalScore(30))
            .reduce(score_update("A", 0))
            .reduce(collected("x9", "A", 5));
        assert_eq!(state.players.get("A").unwrap().score, 30);
        assert_eq!(state.local_score(), 30);
    }

    #[test]
    fn test_sync_restores_own_score() {
        let state = state_for("A", false)
            .reduce(SessionAction::LocalScore(40))
            .reduce(SessionAction::PresenceSync(vec![PresenceEntry::new(
                "A",
                vec![PresenceMeta::announce("Ana", 0)],
            )]));
        assert_eq!(state.local_player().unwrap().score, 40);
    }

    #[test]
    fn test_hand_position_updates_known_players_only() {
        let state = state_for("B", false)
            .reduce(SessionAction::Remote(GameEvent::HandPosition(HandPositionPayload {
                player_id: "A".to_string(),
                x: 0.25,
                y: 0.75,
            })))
            .reduce(SessionAction::Remote(GameEvent::HandPosition(HandPositionPayload {
                player_id: "ghost".to_string(),
                x: 0.5,
                y: 0.5,
            })));
        assert_eq!(
            state.players.get("A").unwrap().hand_position,
            Some(Position::new(0.25, 0.75))
        );
        assert!(!state.players.contains("ghost"));
    }

    #[test]
    fn test_join_and_leave_do_not_touch_roster() {
        let mut state = state_for("A", true);
        let joined = state.apply(SessionAction::PresenceJoin {
            key: "C".to_string(),
            metas: vec![PresenceMeta::announce("Citra", 0)],
        });
        let Some(SessionNotice::PlayerJoined(player)) = joined else {
            panic!("Expected join notice");
        };
        assert_eq!(player.name, "Citra");
        assert!(!state.players.contains("C"));

        let left = state.apply(SessionAction::PresenceLeave { key: "B".to_string() });
        assert_eq!(left, Some(SessionNotice::PlayerLeft("B".to_string())));
        assert!(state.players.contains("B"));
    }

    #[test]
    fn test_countdown_to_playing_to_finished() {
        let config = GameConfig {
            round_secs: 2,
            ..GameConfig::default()
        };
        let mut state = SessionState::new(code(), "A".to_string(), "Ana".to_string(), true, &config);

        assert_eq!(state.apply(SessionAction::StartCountdown), Some(SessionNotice::CountdownStarted));
        assert_eq!(state.apply(SessionAction::Tick), Some(SessionNotice::CountdownTick(2)));
        assert_eq!(state.apply(SessionAction::Tick), Some(SessionNotice::CountdownTick(1)));
        assert_eq!(state.apply(SessionAction::Tick), Some(SessionNotice::GameStarted));
        assert_eq!(state.phase, GamePhase::Playing { remaining_secs: 2 });
        assert_eq!(state.apply(SessionAction::Tick), None);
        assert_eq!(state.apply(SessionAction::Tick), Some(SessionNotice::GameEnded));
        assert_eq!(state.status(), SessionStatus::Finished);
        assert_eq!(state.apply(SessionAction::Tick), None);
    }

    #[test]
    fn test_phase_never_regresses() {
        let mut state = state_for("B", false)
            .reduce(SessionAction::Remote(GameEvent::GameStart));
        assert!(state.phase.is_playing());

        assert_eq!(state.apply(SessionAction::Remote(GameEvent::CountdownStart)), None);
        assert_eq!(state.apply(SessionAction::Remote(GameEvent::GameStart)), None);
        assert!(state.phase.is_playing());

        let finished = state.clone().resumed(SessionStatus::Finished, None);
        assert_eq!(
            finished.reduce(SessionAction::Remote(GameEvent::GameStart)).phase,
            GamePhase::Finished
        );
    }

    #[test]
    fn test_game_start_catches_up_missed_countdown() {
        let mut state = state_for("B", false);
        assert_eq!(
            state.apply(SessionAction::Remote(GameEvent::GameStart)),
            Some(SessionNotice::GameStarted)
        );
        assert_eq!(state.phase, GamePhase::Playing { remaining_secs: ROUND_SECS });
    }

    #[test]
    fn test_resumed_playing_uses_elapsed_time() {
        let state = state_for("B", false).resumed(SessionStatus::Playing, Some(12));
        assert_eq!(state.phase, GamePhase::Playing { remaining_secs: 18 });
        let late = state_for("B", false).resumed(SessionStatus::Playing, Some(45));
        assert_eq!(late.phase, GamePhase::Finished);
    }

    #[test]
    fn test_local_collect_removes_and_scores() {
        let mut state = state_for("A", false).reduce(SessionAction::LocalSpawn(item("x1")));
        let notice = state.apply(SessionAction::LocalCollect {
            item_id: "x1".to_string(),
            score: 10,
        });
        assert!(matches!(notice, Some(SessionNotice::ItemCollected { .. })));
        assert!(state.items.is_empty());
        assert_eq!(state.local_player().unwrap().score, 10);
    }

    #[test]
    fn test_fallen_items_expire() {
        let falling = GameItem {
            fall_speed: 0.5,
            ..item("x1")
        };
        let mut state = state_for("B", false)
            .reduce(SessionAction::Remote(GameEvent::ItemSpawn(falling)))
            .reduce(SessionAction::Remote(GameEvent::ItemSpawn(item("x2"))));

        assert_eq!(state.apply(SessionAction::ExpireItems { now_ms: 2_000 }), None);
        assert_eq!(state.items.len(), 2);

        state.apply(SessionAction::ExpireItems { now_ms: 2_500 });
        assert!(state.item("x1").is_none());
        assert!(state.item("x2").is_some());
        // Expired is not collected.
        assert!(!state.was_collected("x1"));
    }

    #[test]
    fn test_local_rename() {
        let state = state_for("A", false).reduce(SessionAction::LocalRename("Ani".to_string()));
        assert_eq!(state.local_name(), "Ani");
        assert_eq!(state.local_player().unwrap().name, "Ani");
    }
}
