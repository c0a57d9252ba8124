//! Takjil War headless simulation
//!
//! Plays one full round on the in-process store and relay: a host and a few
//! guests join by code, the host counts down, and scripted hands chase the
//! items the host spawns. Prints the leaderboard at the end.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use takjil_core::SessionStatus;
use takjil_session::{MemoryConnection, MemoryRelay, MemoryStore, SessionConfig, SessionDirectory};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bot::Bot;

mod bot;

/// Simulated frame length.
const FRAME: Duration = Duration::from_millis(100);

struct Settings {
    players: usize,
    seed: u64,
    config: SessionConfig,
}

impl Settings {
    /// Defaults overlaid with `TAKJIL_*` environment variables.
    fn from_env() -> anyhow::Result<Self> {
        let mut config = SessionConfig::default();
        if let Some(secs) = read_env("TAKJIL_ROUND_SECS")? {
            config.game.round_secs = secs;
        }
        if let Ok(base_url) = env::var("TAKJIL_BASE_URL") {
            config.base_url = base_url;
        }
        Ok(Self {
            players: read_env("TAKJIL_PLAYERS")?.unwrap_or(3).max(1),
            seed: read_env("TAKJIL_SEED")?.unwrap_or(7),
            config,
        })
    }
}

fn read_env<T>(key: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .parse()
            .map(Some)
            .with_context(|| format!("{key} is not valid: {value:?}")),
        Err(_) => Ok(None),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::from_env()?;
    let game = settings.config.game.clone();
    let directory = SessionDirectory::new(Arc::new(MemoryStore::new()), settings.config);
    let relay = MemoryRelay::default();
    let mut rng = ChaCha8Rng::seed_from_u64(settings.seed);

    let host = MemoryConnection::host(&directory, &relay, "Host")
        .await
        .context("could not create game")?;
    let code = host.session_code().to_string();
    tracing::info!(session_code = %code, url = %host.join_url(), "Lobby open");

    let mut players = vec![host];
    for i in 1..settings.players {
        let guest = MemoryConnection::join(&directory, &relay, &code, &format!("Guest {i}"))
            .await
            .with_context(|| format!("guest {i} could not join {code}"))?;
        players.push(guest);
    }
    let mut bots: Vec<Bot> = (0..players.len()).map(|lane| Bot::new(lane, &mut rng)).collect();

    for player in &mut players {
        player.drain()?;
    }
    players[0].start_countdown()?;

    let round_frames = (game.countdown_ticks + game.round_secs + 2) * 10;
    for _ in 0..round_frames {
        for (player, bot) in players.iter_mut().zip(bots.iter_mut()) {
            player.drain()?;
            player.advance(FRAME).await?;
            let hand = bot.frame(player.state(), &game, player.now_ms(), &mut rng);
            for item_id in player.handle_frame(&[hand], game.viewport)? {
                tracing::debug!(player_id = %player.player_id(), item_id = %item_id, "Grabbed");
            }
        }
        if players.iter().all(|p| p.state().status() == SessionStatus::Finished) {
            break;
        }
    }

    for player in &mut players {
        player.drain()?;
        if !player.submit_score().await? {
            tracing::warn!(player_id = %player.player_id(), "Round still running, score not saved");
        }
    }

    let host = &players[0];
    for (rank, player) in host.state().players.ranking().iter().enumerate() {
        tracing::info!(rank = rank + 1, name = %player.name, score = player.score, color = %player.color.to_hex(), "Final");
    }
    for (rank, record) in directory.top_scores().await?.iter().enumerate() {
        tracing::info!(rank = rank + 1, score = record.score, "Leaderboard");
    }

    for player in players {
        player.leave().await?;
    }
    Ok(())
}
