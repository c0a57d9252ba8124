//! One client's live connection to a session.
//!
//! A [`SessionConnection`] owns the relay subscription and the client-local
//! [`SessionState`]. Inbound traffic is folded into the state by
//! [`SessionConnection::drain`] (per frame) or [`SessionConnection::recv`]
//! (async). Local actions update the state first and then go out as
//! fire-and-forget broadcasts.

use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use rand::distr::Alphanumeric;
use takjil_core::gesture::item_under_cursor;
use takjil_core::{
    GameConfig, GameEvent, GameItem, GamePhase, HandPositionPayload, ItemCollectedPayload,
    ItemSpawner, Landmark, PinchDetector, Position, PresenceMeta, ScoreUpdatePayload,
    SessionAction, SessionCode, SessionNotice, SessionState, SessionStatus, Viewport,
};

use crate::directory::SessionDirectory;
use crate::error::SessionError;
use crate::relay::{Relay, RelayChannel, RelayMessage};
use crate::store::{SessionRecord, SessionStore};

/// Random suffix length of a generated player id.
const PLAYER_ID_SUFFIX_LEN: usize = 9;

/// A fresh per-connection player id, `player_` plus 9 random characters.
pub fn generate_player_id<R: Rng>(rng: &mut R) -> String {
    let suffix: String = rng
        .sample_iter(Alphanumeric)
        .take(PLAYER_ID_SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("player_{suffix}")
}

fn epoch_ms() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}

pub struct SessionConnection<S, C> {
    directory: SessionDirectory<S>,
    channel: C,
    state: SessionState,
    game: GameConfig,
    pinch: PinchDetector,
    spawner: ItemSpawner,
    /// Elapsed time not yet turned into a tick.
    pending: Duration,
    /// Local clock in epoch milliseconds at the last whole tick.
    clock_ms: u64,
}

impl<S, C> SessionConnection<S, C>
where
    S: SessionStore,
    C: RelayChannel,
{
    /// Create a new session and connect to it as its host.
    pub async fn host<R>(
        directory: &SessionDirectory<S>,
        relay: &R,
        name: &str,
    ) -> Result<Self, SessionError>
    where
        R: Relay<Channel = C>,
    {
        let player_id = generate_player_id(&mut rand::rng());
        let code = directory.create_session(&player_id).await?;
        let record = directory.join_session(&code).await?;
        Self::open(directory, relay, &record, player_id, name).await
    }

    /// Join an existing session from a typed or scanned code.
    pub async fn join<R>(
        directory: &SessionDirectory<S>,
        relay: &R,
        code_input: &str,
        name: &str,
    ) -> Result<Self, SessionError>
    where
        R: Relay<Channel = C>,
    {
        let record = directory.join_with_input(code_input).await?;
        let player_id = generate_player_id(&mut rand::rng());
        Self::open(directory, relay, &record, player_id, name).await
    }

    /// Subscribe to the session topic, announce presence once and apply
    /// whatever the relay already delivered.
    pub async fn open<R>(
        directory: &SessionDirectory<S>,
        relay: &R,
        record: &SessionRecord,
        player_id: String,
        name: &str,
    ) -> Result<Self, SessionError>
    where
        R: Relay<Channel = C>,
    {
        let config = directory.config();
        let code = record.session_code.clone();
        let name = config.display_name(name);
        let is_host = record.host_id == player_id;

        let mut channel = relay.subscribe(&config.topic(&code), &player_id).await?;
        let now = epoch_ms();
        channel.track(PresenceMeta::announce(name.clone(), now)).await?;

        let game = config.game.clone();
        let state = SessionState::new(code.clone(), player_id.clone(), name, is_host, &game)
            .resumed(record.status, record.elapsed_secs(Utc::now()));

        tracing::info!(session_code = %code, player_id = %player_id, is_host, status = %record.status, "Joined session");

        let mut connection = Self {
            directory: directory.clone(),
            channel,
            pinch: PinchDetector::new(game.pinch_threshold_px),
            spawner: ItemSpawner::new(&game),
            game,
            state,
            pending: Duration::ZERO,
            clock_ms: now,
        };
        connection.drain()?;
        Ok(connection)
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn session_code(&self) -> &SessionCode {
        &self.state.session_code
    }

    pub fn player_id(&self) -> &str {
        &self.state.local_player_id
    }

    pub fn is_host(&self) -> bool {
        self.state.is_host
    }

    pub fn join_url(&self) -> String {
        self.directory.join_url(self.session_code())
    }

    /// Local clock in epoch milliseconds, including time not yet ticked.
    pub fn now_ms(&self) -> u64 {
        let pending = u64::try_from(self.pending.as_millis()).unwrap_or(u64::MAX);
        self.clock_ms.saturating_add(pending)
    }

    /// Apply every buffered relay message without waiting.
    pub fn drain(&mut self) -> Result<Vec<SessionNotice>, SessionError> {
        let mut notices = Vec::new();
        while let Some(message) = self.channel.try_recv()? {
            notices.extend(self.apply_message(message));
        }
        Ok(notices)
    }

    /// Wait for the next relay message and apply it.
    pub async fn recv(&mut self) -> Result<Option<SessionNotice>, SessionError> {
        let message = self.channel.recv().await?;
        Ok(self.apply_message(message))
    }

    fn apply_message(&mut self, message: RelayMessage) -> Option<SessionNotice> {
        let action = match message {
            RelayMessage::PresenceSync(snapshot) => SessionAction::PresenceSync(snapshot),
            RelayMessage::PresenceJoin { key, metas } => SessionAction::PresenceJoin { key, metas },
            RelayMessage::PresenceLeave { key, .. } => SessionAction::PresenceLeave { key },
            RelayMessage::Broadcast { event, payload } => match GameEvent::decode(&event, payload) {
                Ok(event) => SessionAction::Remote(event),
                Err(err) => {
                    tracing::warn!(session_code = %self.state.session_code, error = %err, "Dropped broadcast");
                    return None;
                }
            },
        };
        tracing::debug!(session_code = %self.state.session_code, player_id = %self.state.local_player_id, ?action, "Applying");
        let notice = self.state.apply(action);
        if let Some(notice) = &notice {
            self.log_notice(notice);
        }
        notice
    }

    fn log_notice(&self, notice: &SessionNotice) {
        let code = &self.state.session_code;
        match notice {
            SessionNotice::PlayerJoined(player) => {
                tracing::info!(session_code = %code, player_id = %player.id, name = %player.name, "Player joined");
            }
            SessionNotice::PlayerLeft(id) => {
                tracing::info!(session_code = %code, player_id = %id, "Player left");
            }
            SessionNotice::GameStarted => tracing::info!(session_code = %code, "Round started"),
            SessionNotice::GameEnded => tracing::info!(session_code = %code, "Round over"),
            _ => {}
        }
    }

    fn send(&self, event: &GameEvent) -> Result<(), SessionError> {
        self.require_host(event)?;
        let (name, payload) = event.encode()?;
        self.channel.broadcast(name, payload)?;
        Ok(())
    }

    fn require_host(&self, event: &GameEvent) -> Result<(), SessionError> {
        if event.is_host_only() && !self.state.is_host {
            return Err(SessionError::HostOnly(event.name()));
        }
        Ok(())
    }

    /// Host: begin the 3-2-1 countdown on every client.
    pub fn start_countdown(&mut self) -> Result<(), SessionError> {
        self.require_host(&GameEvent::CountdownStart)?;
        if self.state.apply(SessionAction::StartCountdown).is_some() {
            tracing::info!(session_code = %self.state.session_code, "Countdown started");
            self.send(&GameEvent::CountdownStart)?;
        }
        Ok(())
    }

    /// Host: tell everyone the round began, then persist the playing status.
    ///
    /// The broadcast goes out even if the store is down. The store error is
    /// still returned.
    pub async fn start_game(&mut self) -> Result<(), SessionError> {
        self.require_host(&GameEvent::GameStart)?;
        self.state.apply(SessionAction::StartGame);
        self.send(&GameEvent::GameStart)?;
        self.directory.start_game(&self.state.session_code).await?;
        Ok(())
    }

    /// Move this client's own hand and share it.
    pub fn update_hand_position(&mut self, position: Position) -> Result<(), SessionError> {
        self.state.apply(SessionAction::LocalHand(position));
        self.send(&GameEvent::HandPosition(HandPositionPayload {
            player_id: self.state.local_player_id.clone(),
            x: position.x,
            y: position.y,
        }))
    }

    /// Collect `item_id` if it is still on screen. Returns the new score.
    pub fn collect_item(&mut self, item_id: &str) -> Result<Option<u32>, SessionError> {
        if !self.state.phase.is_playing() || self.state.item(item_id).is_none() {
            return Ok(None);
        }
        let score = self.state.local_score().saturating_add(self.game.item_value);
        self.state.apply(SessionAction::LocalCollect {
            item_id: item_id.to_string(),
            score,
        });
        self.send(&GameEvent::ItemCollected(ItemCollectedPayload {
            item_id: item_id.to_string(),
            player_id: self.state.local_player_id.clone(),
            score,
            timestamp: epoch_ms(),
        }))?;
        tracing::debug!(session_code = %self.state.session_code, item_id, score, "Collected item");
        Ok(Some(score))
    }

    /// Host: put an item on every client's screen.
    pub fn spawn_item(&mut self, item: GameItem) -> Result<(), SessionError> {
        let event = GameEvent::ItemSpawn(item.clone());
        self.require_host(&event)?;
        tracing::debug!(session_code = %self.state.session_code, item_id = %item.id, kind = %item.kind, "Spawning item");
        self.state.apply(SessionAction::LocalSpawn(item));
        self.send(&event)
    }

    /// Overwrite this client's score everywhere.
    pub fn update_score(&mut self, score: u32) -> Result<(), SessionError> {
        self.state.apply(SessionAction::LocalScore(score));
        self.send(&GameEvent::ScoreUpdate(ScoreUpdatePayload {
            player_id: self.state.local_player_id.clone(),
            score,
        }))
    }

    /// Change the lobby name. Blank or unchanged names are ignored.
    pub async fn rename(&mut self, name: &str) -> Result<bool, SessionError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Ok(false);
        }
        let name = self.directory.config().display_name(trimmed);
        if name == self.state.local_name() {
            return Ok(false);
        }
        self.state.apply(SessionAction::LocalRename(name.clone()));
        let mut meta = PresenceMeta::announce(name, self.clock_ms);
        meta.score = self.state.local_score();
        self.channel.track(meta).await?;
        Ok(true)
    }

    /// Advance the countdown and round timers by `elapsed`.
    ///
    /// The host also announces and persists the start when its countdown
    /// runs out, marks the session finished when its round ends, and spawns
    /// items while playing. Store failures are logged, not returned, so the
    /// notices produced so far are never lost.
    pub async fn advance(&mut self, elapsed: Duration) -> Result<Vec<SessionNotice>, SessionError> {
        let tick = self.game.tick().max(Duration::from_millis(1));
        let mut notices = Vec::new();
        self.pending += elapsed;

        while self.pending >= tick {
            self.pending -= tick;
            self.clock_ms += u64::try_from(tick.as_millis()).unwrap_or(u64::MAX);
            let was_counting = matches!(self.state.phase, GamePhase::Countdown { .. });

            let Some(notice) = self.state.apply(SessionAction::Tick) else {
                self.spawn_due_item()?;
                continue;
            };
            self.log_notice(&notice);

            if notice == SessionNotice::GameEnded {
                self.pinch.reset();
            }
            if self.state.is_host {
                match notice {
                    SessionNotice::GameStarted if was_counting => {
                        self.send(&GameEvent::GameStart)?;
                        self.persist_start().await;
                    }
                    SessionNotice::GameEnded => self.finish().await,
                    _ => {}
                }
            }
            self.spawn_due_item()?;
            notices.push(notice);
        }

        let now_ms = self.now_ms();
        self.state.apply(SessionAction::ExpireItems { now_ms });
        Ok(notices)
    }

    fn spawn_due_item(&mut self) -> Result<(), SessionError> {
        if !self.state.is_host || !self.state.phase.is_playing() {
            return Ok(());
        }
        match self.spawner.poll(self.clock_ms, &mut rand::rng()) {
            Some(item) => self.spawn_item(item),
            None => Ok(()),
        }
    }

    async fn persist_start(&self) {
        if let Err(err) = self.directory.start_game(&self.state.session_code).await {
            tracing::warn!(session_code = %self.state.session_code, error = %err, "Failed to mark session playing");
        }
    }

    async fn finish(&mut self) {
        self.spawner.reset();
        if let Err(err) = self.directory.finish_session(&self.state.session_code).await {
            tracing::warn!(session_code = %self.state.session_code, error = %err, "Failed to mark session finished");
        }
    }

    /// Process one frame of hand detections.
    ///
    /// While playing, the first hand's cursor is shared and every pinch that
    /// begins over an item, where it has fallen to by now, collects it.
    /// Returns the collected item ids.
    pub fn handle_frame(
        &mut self,
        hands: &[Vec<Landmark>],
        viewport: Viewport,
    ) -> Result<Vec<String>, SessionError> {
        let readings = self.pinch.update(hands, viewport);
        if !self.state.phase.is_playing() {
            return Ok(Vec::new());
        }
        if let Some(first) = readings.first() {
            self.update_hand_position(first.cursor)?;
        }
        let now_ms = self.now_ms();
        self.state.apply(SessionAction::ExpireItems { now_ms });

        let mut collected = Vec::new();
        for reading in readings.iter().filter(|r| r.pinch_started) {
            let hit = item_under_cursor(&self.state.items, reading.cursor, viewport, self.game.item_size_px, now_ms)
                .map(|item| item.id.clone());
            if let Some(item_id) = hit {
                if self.collect_item(&item_id)?.is_some() {
                    collected.push(item_id);
                }
            }
        }
        Ok(collected)
    }

    /// Save this client's final score to the leaderboard.
    ///
    /// Returns `false` without writing anything while the round is still
    /// running on this client.
    pub async fn submit_score(&self) -> Result<bool, SessionError> {
        if self.state.status() != SessionStatus::Finished {
            return Ok(false);
        }
        self.directory.record_score(self.state.local_score()).await?;
        Ok(true)
    }

    /// Untrack presence and unsubscribe.
    pub async fn leave(mut self) -> Result<(), SessionError> {
        self.channel.untrack().await?;
        tracing::info!(session_code = %self.state.session_code, player_id = %self.state.local_player_id, "Left session");
        Ok(())
    }
}
