//! Pinch detection and hit testing on hand landmarks.
//!
//! The detector hands us 21 normalized keypoints per hand, per frame. A hand
//! pinches when its thumb tip and index tip come within a pixel threshold;
//! only the frame where a pinch begins can collect an item.

use serde::{Deserialize, Serialize};

use crate::model::{GameItem, Position};

/// Landmark index of the thumb tip.
pub const THUMB_TIP: usize = 4;

/// Landmark index of the index finger tip.
pub const INDEX_TIP: usize = 8;

/// Keypoints per detected hand.
pub const LANDMARK_COUNT: usize = 21;

/// One normalized hand keypoint as reported by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

impl Landmark {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y, z: 0.0 }
    }
}

/// Pixel dimensions the normalized coordinates are scaled to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 640.0,
            height: 480.0,
        }
    }
}

impl Viewport {
    pub fn to_px(self, x: f32, y: f32) -> (f32, f32) {
        (x * self.width, y * self.height)
    }

    fn distance_px(self, a: Landmark, b: Landmark) -> f32 {
        let (ax, ay) = self.to_px(a.x, a.y);
        let (bx, by) = self.to_px(b.x, b.y);
        (ax - bx).hypot(ay - by)
    }
}

/// What one hand did this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandReading {
    /// Mirrored index tip, clamped to `[0, 1]`.
    pub cursor: Position,
    pub pinching: bool,
    /// True only on the frame the pinch began.
    pub pinch_started: bool,
}

/// Edge-triggered pinch state, one slot per hand.
#[derive(Debug, Clone, Default)]
pub struct PinchDetector {
    threshold_px: f32,
    was_pinching: Vec<bool>,
}

impl PinchDetector {
    pub fn new(threshold_px: f32) -> Self {
        Self {
            threshold_px,
            was_pinching: Vec::new(),
        }
    }

    /// Feed one frame of detections. Hands missing from the frame forget
    /// their pinch, so a hand that re-enters already pinched fires once.
    pub fn update(&mut self, hands: &[Vec<Landmark>], viewport: Viewport) -> Vec<HandReading> {
        let threshold_px = self.threshold_px;
        self.was_pinching.resize(hands.len(), false);

        hands
            .iter()
            .zip(self.was_pinching.iter_mut())
            .filter_map(|(landmarks, was_pinching)| {
                let (Some(&thumb), Some(&index)) =
                    (landmarks.get(THUMB_TIP), landmarks.get(INDEX_TIP))
                else {
                    *was_pinching = false;
                    return None;
                };
                let pinching = viewport.distance_px(thumb, index) < threshold_px;
                let pinch_started = pinching && !*was_pinching;
                *was_pinching = pinching;
                Some(HandReading {
                    cursor: cursor_for(index),
                    pinching,
                    pinch_started,
                })
            })
            .collect()
    }

    /// Forget every hand, so a pinch still held fires again.
    pub fn reset(&mut self) {
        self.was_pinching.clear();
    }
}

/// Index tip with the x axis mirrored to match the mirrored camera feed.
pub fn cursor_for(index_tip: Landmark) -> Position {
    Position::new(index_tip.x.clamp(0.0, 1.0), index_tip.y.clamp(0.0, 1.0)).mirrored()
}

/// First item whose square hit box contains the cursor at `now_ms`.
pub fn item_under_cursor<'a>(
    items: &'a [GameItem],
    cursor: Position,
    viewport: Viewport,
    size_px: f32,
    now_ms: u64,
) -> Option<&'a GameItem> {
    let (cx, cy) = viewport.to_px(cursor.x, cursor.y);
    items.iter().find(|item| {
        let position = item.position_at(now_ms);
        let (ix, iy) = viewport.to_px(position.x, position.y);
        cx > ix && cx < ix + size_px && cy > iy && cy < iy + size_px
    })
}
