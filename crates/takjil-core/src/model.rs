//! Players, items and session status.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Point in normalized `[0, 1]` screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Both axes are finite and inside `[0, 1]`.
    pub fn is_normalized(&self) -> bool {
        (0.0..=1.0).contains(&self.x) && (0.0..=1.0).contains(&self.y)
    }

    /// Flips the x axis. The camera feed is shown mirrored.
    #[must_use]
    pub fn mirrored(self) -> Self {
        Self::new(1.0 - self.x, self.y)
    }
}

/// RGB color, serialized as `#RRGGBB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub const CORAL: Color = Color::rgb(0xFF, 0x6B, 0x6B);
    pub const TEAL: Color = Color::rgb(0x4E, 0xCD, 0xC4);
    pub const SUNFLOWER: Color = Color::rgb(0xFF, 0xE6, 0x6D);
    pub const MINT: Color = Color::rgb(0x95, 0xE1, 0xD3);
    pub const BLUSH: Color = Color::rgb(0xF3, 0x81, 0x81);
    pub const LAVENDER: Color = Color::rgb(0xAA, 0x96, 0xDA);

    /// Player colors, handed out by roster index.
    pub const PALETTE: [Color; 6] = [
        Self::CORAL,
        Self::TEAL,
        Self::SUNFLOWER,
        Self::MINT,
        Self::BLUSH,
        Self::LAVENDER,
    ];

    pub fn for_index(index: usize) -> Color {
        Self::PALETTE[index % Self::PALETTE.len()]
    }

    pub fn to_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.strip_prefix('#')?;
        if digits.len() != 6 || !digits.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
        Some(Self::rgb(channel(0)?, channel(2)?, channel(4)?))
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_hex()
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Color::from_hex(&value).ok_or_else(|| format!("invalid color: {value}"))
    }
}

/// A participant as seen by one client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: String,
    pub name: String,
    pub score: u32,
    pub hand_position: Option<Position>,
    pub color: Color,
}

impl Player {
    pub fn new(id: String, name: String, color: Color) -> Self {
        Self {
            id,
            name,
            score: 0,
            hand_position: None,
            color,
        }
    }
}

/// The five takjil treats that can be grabbed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemKind {
    Tahu,
    Cireng,
    Bakwan,
    Singkong,
    Risol,
}

impl ItemKind {
    pub const ALL: [ItemKind; 5] = [
        ItemKind::Tahu,
        ItemKind::Cireng,
        ItemKind::Bakwan,
        ItemKind::Singkong,
        ItemKind::Risol,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ItemKind::Tahu => "Tahu",
            ItemKind::Cireng => "Cireng",
            ItemKind::Bakwan => "Bakwan",
            ItemKind::Singkong => "Singkong",
            ItemKind::Risol => "Risol",
        }
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A collectable item spawned by the host.
///
/// `position` is the top-left corner at `spawned_at`. From then on the item
/// falls straight down at `fall_speed`, so every client can place it from
/// its own clock without further traffic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameItem {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    pub position: Position,
    /// Unix epoch milliseconds.
    pub spawned_at: u64,
    /// Viewport heights per second.
    #[serde(default)]
    pub fall_speed: f32,
}

impl GameItem {
    /// Where the item is at `now_ms`. Times before the spawn clamp to it.
    pub fn position_at(&self, now_ms: u64) -> Position {
        let elapsed = Duration::from_millis(now_ms.saturating_sub(self.spawned_at));
        Position::new(
            self.position.x,
            self.position.y + self.fall_speed * elapsed.as_secs_f32(),
        )
    }

    /// The item's top edge has passed the bottom of the screen.
    pub fn has_fallen_off(&self, now_ms: u64) -> bool {
        self.position_at(now_ms).y > 1.0
    }
}

/// Persisted lifecycle of a session record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Waiting,
    Playing,
    Finished,
}

impl SessionStatus {
    pub fn is_joinable(self) -> bool {
        !matches!(self, SessionStatus::Finished)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Waiting => "waiting",
            SessionStatus::Playing => "playing",
            SessionStatus::Finished => "finished",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_palette_wraps() {
        assert_eq!(Color::for_index(0), Color::CORAL);
        assert_eq!(Color::for_index(5), Color::LAVENDER);
        assert_eq!(Color::for_index(6), Color::CORAL);
    }

    #[test]
    fn test_color_hex() {
        assert_eq!(Color::TEAL.to_hex(), "#4ECDC4");
        assert_eq!(Color::from_hex("#aa96da"), Some(Color::LAVENDER));
        assert_eq!(Color::from_hex("AA96DA"), None);
        assert_eq!(Color::from_hex("#AA96D"), None);
    }

    #[test]
    fn test_item_wire_shape() {
        let item = GameItem {
            id: "x1".to_string(),
            kind: ItemKind::Risol,
            position: Position::new(0.25, 0.0),
            spawned_at: 1_700_000_000_000,
            fall_speed: 0.5,
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "Risol");
        assert_eq!(json["spawnedAt"], 1_700_000_000_000_u64);
        assert_eq!(json["position"]["x"], 0.25);
        assert_eq!(json["fallSpeed"], 0.5);
    }

    #[test]
    fn test_item_falls_from_spawn_time() {
        let item = GameItem {
            id: "x1".to_string(),
            kind: ItemKind::Tahu,
            position: Position::new(0.25, 0.0),
            spawned_at: 10_000,
            fall_speed: 0.5,
        };
        assert_eq!(item.position_at(9_000), Position::new(0.25, 0.0));
        assert_eq!(item.position_at(11_000), Position::new(0.25, 0.5));
        assert!(!item.has_fallen_off(12_000));
        assert!(item.has_fallen_off(12_100));
    }

    #[test]
    fn test_item_kind_display() {
        assert_eq!(ItemKind::Singkong.to_string(), "Singkong");
        assert_eq!(format!("{}", ItemKind::Risol), ItemKind::Risol.label());
    }

    #[test]
    fn test_status_order_is_lifecycle_order() {
        assert!(SessionStatus::Waiting < SessionStatus::Playing);
        assert!(SessionStatus::Playing < SessionStatus::Finished);
        assert!(!SessionStatus::Finished.is_joinable());
        assert_eq!(serde_json::to_value(SessionStatus::Playing).unwrap(), "playing");
    }

    #[test]
    fn test_position_bounds() {
        assert!(Position::new(0.0, 1.0).is_normalized());
        assert!(!Position::new(1.01, 0.5).is_normalized());
        assert!(!Position::new(f32::NAN, 0.5).is_normalized());
        assert_eq!(Position::new(0.25, 0.5).mirrored(), Position::new(0.75, 0.5));
    }
}
