//! Gameplay tuning shared by every client of a session.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::gesture::Viewport;
use crate::state::{COUNTDOWN_TICKS, ROUND_SECS};

/// Configuration for countdown, round, gesture and spawn behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Countdown length in ticks (default: 3)
    pub countdown_ticks: u32,
    /// Length of one countdown/round tick in milliseconds (default: 1000)
    pub tick_ms: u64,
    /// Round length in seconds (default: 30)
    pub round_secs: u32,
    /// Thumb-to-index distance below which a hand is pinching (default: 40px)
    pub pinch_threshold_px: f32,
    /// Points awarded per collected item (default: 10)
    pub item_value: u32,
    /// Edge length of an item's square hit box (default: 50px)
    pub item_size_px: f32,
    /// Host spawn interval in milliseconds (default: 1000)
    pub spawn_interval_ms: u64,
    /// Slowest item fall, in viewport heights per second (default: 0.25)
    pub fall_speed_min: f32,
    /// Fastest item fall, in viewport heights per second (default: 0.5)
    pub fall_speed_max: f32,
    /// Pixel space used for pinch distance and hit testing (default: 640x480)
    pub viewport: Viewport,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            countdown_ticks: COUNTDOWN_TICKS,
            tick_ms: 1000,
            round_secs: ROUND_SECS,
            pinch_threshold_px: 40.0,
            item_value: 10,
            item_size_px: 50.0,
            spawn_interval_ms: 1000,
            fall_speed_min: 0.25,
            fall_speed_max: 0.5,
            viewport: Viewport::default(),
        }
    }
}

impl GameConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    /// Item width as a fraction of the viewport width.
    pub fn item_width_fraction(&self) -> f32 {
        if self.viewport.width <= 0.0 {
            return 0.0;
        }
        (self.item_size_px / self.viewport.width).clamp(0.0, 1.0)
    }

    /// Fall speed bounds, sanitized so `min <= max` and neither is negative.
    pub fn fall_speed_range(&self) -> (f32, f32) {
        let min = self.fall_speed_min.max(0.0);
        (min, self.fall_speed_max.max(min))
    }
}
