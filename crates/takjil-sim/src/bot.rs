//! Scripted hand that chases items and pinches them.

use rand::Rng;
use takjil_core::gesture::LANDMARK_COUNT;
use takjil_core::{GameConfig, INDEX_TIP, Landmark, Position, SessionState, THUMB_TIP};

/// Normalized distance the hand can move in one frame.
const MAX_STEP: f32 = 0.06;

pub struct Bot {
    /// Which on-screen item this bot prefers.
    lane: usize,
    cursor: Position,
    pinching: bool,
}

impl Bot {
    pub fn new<R: Rng>(lane: usize, rng: &mut R) -> Self {
        Self {
            lane,
            cursor: Position::new(rng.random_range(0.1..0.9), rng.random_range(0.3..0.9)),
            pinching: false,
        }
    }

    /// Move toward where the chosen item is at `now_ms` and produce this
    /// frame's landmarks.
    pub fn frame<R: Rng>(
        &mut self,
        state: &SessionState,
        game: &GameConfig,
        now_ms: u64,
        rng: &mut R,
    ) -> Vec<Landmark> {
        let half_w = game.item_size_px / game.viewport.width / 2.0;
        let half_h = game.item_size_px / game.viewport.height / 2.0;

        let target = state
            .items
            .get(self.lane % state.items.len().max(1))
            .map(|item| item.position_at(now_ms))
            .map(|at| Position::new(at.x + half_w, at.y + half_h));

        match target {
            Some(target) => {
                let jitter = rng.random_range(0.7..1.0);
                self.cursor = Position::new(
                    step(self.cursor.x, target.x, MAX_STEP * jitter),
                    step(self.cursor.y, target.y, MAX_STEP * jitter),
                );
                let close = (self.cursor.x - target.x).abs() < half_w / 2.0
                    && (self.cursor.y - target.y).abs() < half_h / 2.0;
                // Release between grabs so every pinch is a fresh edge.
                self.pinching = close && !self.pinching;
            }
            None => self.pinching = false,
        }

        self.landmarks()
    }

    fn landmarks(&self) -> Vec<Landmark> {
        let mut landmarks = vec![Landmark::default(); LANDMARK_COUNT];
        let x = 1.0 - self.cursor.x;
        landmarks[INDEX_TIP] = Landmark::new(x, self.cursor.y);
        let gap = if self.pinching { 0.005 } else { 0.2 };
        landmarks[THUMB_TIP] = Landmark::new((x + gap).min(1.0), self.cursor.y);
        landmarks
    }
}

fn step(from: f32, to: f32, max: f32) -> f32 {
    from + (to - from).clamp(-max, max)
}
