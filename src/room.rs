//! Shared battle room document
//!
//! Each player writes only its own record. Room-level fields (`state`,
//! `countdown_start`, `last_update`) are written by the host only.

use crate::wire::empty_grid;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Room phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomState {
    #[default]
    Waiting,
    Countdown,
    Playing,
}

/// Player slot in a room. P1 is the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    P1,
    P2,
}

impl Slot {
    pub fn other(self) -> Slot {
        match self {
            Slot::P1 => Slot::P2,
            Slot::P2 => Slot::P1,
        }
    }

    /// Key of this slot in the room document
    pub fn as_str(self) -> &'static str {
        match self {
            Slot::P1 => "p1",
            Slot::P2 => "p2",
        }
    }

    pub fn is_host(self) -> bool {
        self == Slot::P1
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One player's sub-record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerRecord {
    pub ready: bool,
    pub grid: String,
    /// Monotonic count of attack lines this player has sent
    pub attack_queue: i64,
    pub score: u64,
    pub stomps: u32,
    pub match_wins: u32,
    /// Monotonic count of rounds this player has lost
    pub losses: u32,
    /// Unix seconds of this player's last write
    pub last_seen: f64,
    /// Write sequence, bumped on every write by the owner
    pub seq: u64,
}

impl Default for PlayerRecord {
    fn default() -> Self {
        Self {
            ready: false,
            grid: empty_grid(),
            attack_queue: 0,
            score: 0,
            stomps: 0,
            match_wins: 0,
            losses: 0,
            last_seen: 0.0,
            seq: 0,
        }
    }
}

impl PlayerRecord {
    /// Fresh record for a player claiming a slot at `now`
    pub fn joined(now: f64) -> Self {
        Self {
            last_seen: now,
            ..Self::default()
        }
    }

    /// True if nobody has written this record within `stale_after` seconds
    pub fn is_stale(&self, now: f64, stale_after: f64) -> bool {
        now - self.last_seen > stale_after
    }
}

/// The whole room document
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BattleRoom {
    pub state: RoomState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p1: Option<PlayerRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p2: Option<PlayerRecord>,
    pub countdown_start: f64,
    pub last_update: f64,
}

impl BattleRoom {
    /// New room with the host's record in place
    pub fn hosted(now: f64) -> Self {
        Self {
            state: RoomState::Waiting,
            p1: Some(PlayerRecord::joined(now)),
            p2: None,
            countdown_start: 0.0,
            last_update: now,
        }
    }

    pub fn player(&self, slot: Slot) -> Option<&PlayerRecord> {
        match slot {
            Slot::P1 => self.p1.as_ref(),
            Slot::P2 => self.p2.as_ref(),
        }
    }

    pub fn is_stale(&self, now: f64, stale_after: f64) -> bool {
        now - self.last_update > stale_after
    }
}

/// Partial update of one player record. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attack_queue: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stomps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_wins: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub losses: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

impl PlayerPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Partial update of the room-level fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoomPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<RoomState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub countdown_start: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<f64>,
}
