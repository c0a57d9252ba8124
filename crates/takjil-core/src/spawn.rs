//! Host-side item spawner.

use rand::Rng;

use crate::config::GameConfig;
use crate::model::{GameItem, ItemKind, Position};

/// Emits one item per spawn interval. Only the host runs one.
#[derive(Debug, Clone)]
pub struct ItemSpawner {
    interval_ms: u64,
    max_x: f32,
    fall_speed: (f32, f32),
    next_at: Option<u64>,
}

impl ItemSpawner {
    pub fn new(config: &GameConfig) -> Self {
        Self {
            interval_ms: config.spawn_interval_ms.max(1),
            max_x: 1.0 - config.item_width_fraction(),
            fall_speed: config.fall_speed_range(),
            next_at: None,
        }
    }

    /// Returns an item if the interval has elapsed at `now_ms`.
    ///
    /// The first poll only arms the timer, so the first item appears one
    /// interval after the round starts.
    pub fn poll<R: Rng>(&mut self, now_ms: u64, rng: &mut R) -> Option<GameItem> {
        let Some(next_at) = self.next_at else {
            self.next_at = Some(now_ms + self.interval_ms);
            return None;
        };
        if now_ms < next_at {
            return None;
        }
        self.next_at = Some(now_ms + self.interval_ms);
        Some(self.spawn(now_ms, rng))
    }

    pub fn spawn<R: Rng>(&self, now_ms: u64, rng: &mut R) -> GameItem {
        let kind = ItemKind::ALL[rng.random_range(0..ItemKind::ALL.len())];
        let x = if self.max_x > 0.0 {
            rng.random_range(0.0..=self.max_x)
        } else {
            0.0
        };
        let (slowest, fastest) = self.fall_speed;
        let fall_speed = if fastest > slowest {
            rng.random_range(slowest..=fastest)
        } else {
            slowest
        };
        GameItem {
            id: uuid::Builder::from_random_bytes(rng.random())
                .into_uuid()
                .to_string(),
            kind,
            position: Position::new(x, 0.0),
            spawned_at: now_ms,
            fall_speed,
        }
    }

    /// Stop spawning until the next [`ItemSpawner::poll`] re-arms.
    pub fn reset(&mut self) {
        self.next_at = None;
    }
}
