pub mod criteria;
pub mod db;
pub mod logging;
pub mod matching;
pub mod store;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Smallest whole-hour offset a profile may carry.
pub const MIN_TIMEZONE_OFFSET: i32 = -12;
/// Largest whole-hour offset a profile may carry.
pub const MAX_TIMEZONE_OFFSET: i32 = 14;

// Data models shared by the stores and the matching functions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub platforms: BTreeSet<String>,
    #[serde(default)]
    pub languages: BTreeSet<String>,
    /// Zero-padded `HH:MM` tokens in the candidate's own local time.
    #[serde(default)]
    pub active_hours_local: BTreeSet<String>,
    #[serde(default)]
    pub mic_available: bool,
    #[serde(default)]
    pub timezone_offset_hours: i32,
}

impl Candidate {
    pub fn has_valid_offset(&self) -> bool {
        (MIN_TIMEZONE_OFFSET..=MAX_TIMEZONE_OFFSET).contains(&self.timezone_offset_hours)
    }
}

/// Hours and stated goal for one (candidate, game) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameStat {
    pub candidate_id: i64,
    pub game_id: i64,
    #[serde(default)]
    pub hours_played: i64,
    #[serde(default)]
    pub goal_id: Option<String>,
}
