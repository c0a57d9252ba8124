//! Presence roster.
//!
//! The relay reports who is subscribed as a full snapshot (`sync`) plus
//! `join`/`leave` deltas. Only `sync` changes the roster. The deltas are
//! notifications and leave the roster alone.

use serde::{Deserialize, Serialize};

use crate::model::{Color, Player, Position};

/// What a client announces about itself when it tracks presence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub score: u32,
    #[serde(default, rename = "handPosition")]
    pub hand_position: Option<Position>,
    /// Unix epoch milliseconds.
    #[serde(default)]
    pub online_at: u64,
}

impl PresenceMeta {
    pub fn announce(name: impl Into<String>, online_at: u64) -> Self {
        Self {
            name: name.into(),
            score: 0,
            hand_position: None,
            online_at,
        }
    }
}

/// All metas tracked under one presence key, in relay order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceEntry {
    pub key: String,
    pub metas: Vec<PresenceMeta>,
}

impl PresenceEntry {
    pub fn new(key: impl Into<String>, metas: Vec<PresenceMeta>) -> Self {
        Self {
            key: key.into(),
            metas,
        }
    }

    fn display_name(&self) -> Option<&str> {
        self.metas
            .first()
            .map(|meta| meta.name.as_str())
            .filter(|name| !name.is_empty())
    }
}

/// Ordered set of players keyed by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Roster {
    players: Vec<Player>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.iter()
    }

    /// Players ordered by score, highest first. Ties keep roster order.
    pub fn ranking(&self) -> Vec<&Player> {
        let mut ranked: Vec<&Player> = self.players.iter().collect();
        ranked.sort_by(|a, b| b.score.cmp(&a.score));
        ranked
    }

    /// Rebuild the roster from a full presence snapshot.
    ///
    /// Colors follow snapshot order, so they can shift when players churn.
    /// Scores and hand positions already learned from broadcasts survive for
    /// ids still present; new ids start from their announced meta.
    pub fn rebuild(&self, snapshot: &[PresenceEntry]) -> Roster {
        let players = snapshot
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let name = entry
                    .display_name()
                    .map_or_else(|| format!("Player {}", index + 1), str::to_string);
                let mut player = Player::new(entry.key.clone(), name, Color::for_index(index));
                if let Some(previous) = self.get(&entry.key) {
                    player.score = previous.score;
                    player.hand_position = previous.hand_position;
                } else if let Some(meta) = entry.metas.first() {
                    player.score = meta.score;
                    player.hand_position = meta.hand_position;
                }
                player
            })
            .collect();
        Roster { players }
    }

    /// Player built from a `join` delta, before the next `sync` lands.
    pub fn provisional(&self, entry: &PresenceEntry) -> Player {
        let name = entry.display_name().unwrap_or("Player").to_string();
        Player::new(entry.key.clone(), name, Color::for_index(self.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(names: &[(&str, &str)]) -> Vec<PresenceEntry> {
        names
            .iter()
            .map(|(key, name)| PresenceEntry::new(*key, vec![PresenceMeta::announce(*name, 0)]))
            .collect()
    }

    #[test]
    fn test_rebuild_assigns_colors_by_snapshot_order() {
        let roster = Roster::new().rebuild(&snapshot(&[("a", "Ana"), ("b", "Budi")]));
        assert_eq!(roster.len(), 2);
        assert_eq!(roster.get("a").unwrap().color, Color::CORAL);
        assert_eq!(roster.get("b").unwrap().color, Color::TEAL);
        assert_eq!(roster.get("b").unwrap().name, "Budi");
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let snap = snapshot(&[("a", "Ana"), ("b", "Budi"), ("c", "")]);
        let once = Roster::new().rebuild(&snap);
        let twice = once.rebuild(&snap);
        assert_eq!(once, twice);
        assert_eq!(twice.get("c").unwrap().name, "Player 3");
    }

    #[test]
    fn test_rebuild_recolors_after_churn() {
        let first = Roster::new().rebuild(&snapshot(&[("a", "Ana"), ("b", "Budi")]));
        let second = first.rebuild(&snapshot(&[("b", "Budi")]));
        assert!(!second.contains("a"));
        assert_eq!(second.get("b").unwrap().color, Color::CORAL);
    }

    #[test]
    fn test_rebuild_keeps_learned_scores() {
        let mut roster = Roster::new().rebuild(&snapshot(&[("a", "Ana")]));
        roster.get_mut("a").unwrap().score = 30;
        let rebuilt = roster.rebuild(&snapshot(&[("a", "Ana"), ("b", "Budi")]));
        assert_eq!(rebuilt.get("a").unwrap().score, 30);
        assert_eq!(rebuilt.get("b").unwrap().score, 0);
    }

    #[test]
    fn test_provisional_player() {
        let roster = Roster::new().rebuild(&snapshot(&[("a", "Ana")]));
        let joined = roster.provisional(&PresenceEntry::new("b", vec![]));
        assert_eq!(joined.name, "Player");
        assert_eq!(joined.color, Color::TEAL);
        assert!(!roster.contains("b"));
    }

    #[test]
    fn test_meta_wire_shape() {
        let mut meta = PresenceMeta::announce("Ana", 7);
        meta.hand_position = Some(Position::new(0.25, 0.5));
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["handPosition"]["x"], 0.25);
        assert!(json.get("hand_position").is_none());
        assert_eq!(json["online_at"], 7);

        let parsed: PresenceMeta =
            serde_json::from_value(serde_json::json!({"name": "Budi", "handPosition": {"x": 0.5, "y": 0.5}}))
                .unwrap();
        assert_eq!(parsed.hand_position, Some(Position::new(0.5, 0.5)));
        assert_eq!(parsed.score, 0);
    }

    #[test]
    fn test_ranking_orders_by_score() {
        let mut roster = Roster::new().rebuild(&snapshot(&[("a", "Ana"), ("b", "Budi")]));
        roster.get_mut("b").unwrap().score = 20;
        let ids: Vec<&str> = roster.ranking().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }
}
