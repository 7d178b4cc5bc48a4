//! Query-parameter parsing into a typed [`Criteria`].
//!
//! Parsing never fails as a whole. A key whose value cannot be read as the
//! expected type is dropped and behaves exactly as if it had not been sent;
//! every other key is still honoured. Callers rely on this: a malformed
//! `min_hours_game_abc=50` must not turn a search into an error response.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::debug;

use crate::matching::availability::HourToken;

const KEY_TEXT: &str = "q";
const KEY_PLATFORMS: &str = "platforms";
const KEY_LANGUAGES: &str = "languages";
const KEY_ACTIVE_HOURS: &str = "active_hours";
const KEY_MIC: &str = "mic_available";
const KEY_GAMES: &str = "games";
const KEY_PLAYER_GOALS: &str = "player_goals";
const KEY_MIN_HOURS: &str = "min_hours_played";
const PREFIX_MIN_HOURS_GAME: &str = "min_hours_game_";
const PREFIX_GOALS_GAME: &str = "goals_game_";

/// Parsed, immutable discovery query.
///
/// `None` (or an empty map) means the criterion was not supplied, or was
/// supplied but yielded nothing usable; either way it imposes no constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Criteria {
    pub text: Option<String>,
    pub platforms: Option<BTreeSet<String>>,
    pub languages: Option<BTreeSet<String>>,
    pub active_hours_utc: Option<BTreeSet<HourToken>>,
    pub mic_available: Option<bool>,
    pub games: Option<BTreeSet<i64>>,
    pub player_goals: Option<BTreeSet<String>>,
    pub min_hours_played: Option<i64>,
    pub per_game_min_hours: BTreeMap<i64, i64>,
    pub per_game_goals: BTreeMap<i64, BTreeSet<String>>,
}

impl Criteria {
    /// Parse key/value pairs in order. Repeated `goals_game_<id>` keys
    /// accumulate; any other repeated key keeps the last usable value.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut criteria = Criteria::default();
        for (key, value) in pairs {
            criteria.apply(key.as_ref(), value.as_ref());
        }
        criteria
    }

    pub fn from_map(params: &HashMap<String, String>) -> Self {
        Self::from_pairs(params.iter())
    }

    fn apply(&mut self, key: &str, value: &str) {
        match key {
            KEY_TEXT => self.text = parse_text(value),
            KEY_PLATFORMS => assign_if_some(&mut self.platforms, parse_string_set(value)),
            KEY_LANGUAGES => assign_if_some(&mut self.languages, parse_string_set(value)),
            KEY_ACTIVE_HOURS => assign_if_some(&mut self.active_hours_utc, parse_hour_tokens(value)),
            KEY_MIC => self.mic_available = Some(value.trim().eq_ignore_ascii_case("true")),
            KEY_GAMES => assign_if_some(&mut self.games, parse_game_ids(value)),
            KEY_PLAYER_GOALS => assign_if_some(&mut self.player_goals, parse_string_set(value)),
            KEY_MIN_HOURS => assign_if_some(&mut self.min_hours_played, parse_truncated(value)),
            _ => self.apply_game_scoped(key, value),
        }
    }

    fn apply_game_scoped(&mut self, key: &str, value: &str) {
        if let Some(raw_game) = key.strip_prefix(PREFIX_MIN_HOURS_GAME) {
            match (parse_game_id(raw_game), parse_truncated(value)) {
                (Some(game_id), Some(hours)) => {
                    self.per_game_min_hours.insert(game_id, hours);
                }
                _ => debug!(key, value, "dropping malformed per-game min hours"),
            }
        } else if let Some(raw_game) = key.strip_prefix(PREFIX_GOALS_GAME) {
            let Some(game_id) = parse_game_id(raw_game) else {
                debug!(key, "dropping per-game goals with unparsable game id");
                return;
            };
            if let Some(goals) = parse_string_set(value) {
                self.per_game_goals.entry(game_id).or_default().extend(goals);
            }
        }
    }

    /// True when at least one predicate needs the candidate's game stats.
    pub fn needs_stats(&self) -> bool {
        self.games.is_some()
            || self.player_goals.is_some()
            || self.min_hours_played.is_some()
            || self.has_game_scoped()
    }

    pub fn has_game_scoped(&self) -> bool {
        !self.per_game_min_hours.is_empty() || !self.per_game_goals.is_empty()
    }

    /// Every game id referenced by a per-game constraint, ascending.
    pub fn game_scoped_ids(&self) -> BTreeSet<i64> {
        self.per_game_min_hours
            .keys()
            .chain(self.per_game_goals.keys())
            .copied()
            .collect()
    }

    pub fn is_unconstrained(&self) -> bool {
        self.text.is_none()
            && self.platforms.is_none()
            && self.languages.is_none()
            && self.active_hours_utc.is_none()
            && self.mic_available.is_none()
            && !self.needs_stats()
    }
}

fn assign_if_some<T>(slot: &mut Option<T>, parsed: Option<T>) {
    if parsed.is_some() {
        *slot = parsed;
    }
}

/// The term is kept verbatim; only an empty value counts as absent.
fn parse_text(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|token| !token.is_empty())
}

fn non_empty<T: Ord>(set: BTreeSet<T>) -> Option<BTreeSet<T>> {
    (!set.is_empty()).then_some(set)
}

/// Comma-separated list, trimmed, empty tokens dropped.
pub fn parse_string_set(value: &str) -> Option<BTreeSet<String>> {
    non_empty(split_list(value).map(str::to_string).collect())
}

/// Comma-separated `HH:MM` tokens interpreted as UTC; malformed tokens dropped.
pub fn parse_hour_tokens(value: &str) -> Option<BTreeSet<HourToken>> {
    non_empty(
        split_list(value)
            .filter_map(|token| token.parse::<HourToken>().ok())
            .collect(),
    )
}

fn parse_game_ids(value: &str) -> Option<BTreeSet<i64>> {
    non_empty(split_list(value).filter_map(parse_game_id).collect())
}

fn parse_game_id(raw: &str) -> Option<i64> {
    raw.parse::<i64>().ok()
}

/// Numeric value truncated toward zero. Non-finite numbers are rejected.
pub fn parse_truncated(value: &str) -> Option<i64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|number| number.is_finite())
        .map(|number| number.trunc() as i64)
}
