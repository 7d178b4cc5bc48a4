//! Timezone-aware availability overlap.
//!
//! Searchers send availability as UTC `HH:MM` tokens; profiles store theirs in
//! local time. Each UTC token is shifted by the candidate's whole-hour offset
//! before the overlap test. Only the hour moves: minutes are copied as-is,
//! which is exact because offsets are whole hours.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::Candidate;

static RE_HOUR_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2}):(\d{2})$").expect("hour token regex is valid"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid hour token {0:?}: expected HH:MM")]
pub struct HourTokenError(pub String);

/// A wall-clock `HH:MM` marker with `hour` in `0..=23` and `minute` in `0..=59`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HourToken {
    hour: u8,
    minute: u8,
}

impl HourToken {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    /// Shift the hour by a whole-hour offset, wrapping into `0..=23`.
    pub fn shifted(&self, offset_hours: i32) -> Self {
        Self {
            hour: local_hour(self.hour, offset_hours),
            minute: self.minute,
        }
    }
}

impl fmt::Display for HourToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for HourToken {
    type Err = HourTokenError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || HourTokenError(raw.to_string());
        let caps = RE_HOUR_TOKEN.captures(raw.trim()).ok_or_else(invalid)?;
        let hour = caps[1].parse::<u8>().map_err(|_| invalid())?;
        let minute = caps[2].parse::<u8>().map_err(|_| invalid())?;
        HourToken::new(hour, minute).ok_or_else(invalid)
    }
}

/// `(utc_hour + offset) mod 24`, always normalised into `0..=23`.
pub fn local_hour(utc_hour: u8, offset_hours: i32) -> u8 {
    (i32::from(utc_hour) + offset_hours).rem_euclid(24) as u8
}

/// Render the UTC tokens as the candidate-local tokens they correspond to.
pub fn to_local_tokens<'a, I>(utc_tokens: I, offset_hours: i32) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a HourToken>,
{
    utc_tokens
        .into_iter()
        .map(|token| token.shifted(offset_hours).to_string())
        .collect()
}

/// Availability predicate. An absent or empty UTC set never filters.
pub fn matches_availability(utc_tokens: Option<&BTreeSet<HourToken>>, candidate: &Candidate) -> bool {
    let Some(tokens) = utc_tokens.filter(|tokens| !tokens.is_empty()) else {
        return true;
    };

    tokens.iter().any(|token| {
        let local = token.shifted(candidate.timezone_offset_hours).to_string();
        candidate.active_hours_local.contains(&local)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MAX_TIMEZONE_OFFSET, MIN_TIMEZONE_OFFSET};

    fn candidate(offset: i32, hours: &[&str]) -> Candidate {
        Candidate {
            id: 1,
            username: "alice".into(),
            timezone_offset_hours: offset,
            active_hours_local: hours.iter().map(|h| h.to_string()).collect(),
            ..Candidate::default()
        }
    }

    fn tokens(raw: &[&str]) -> BTreeSet<HourToken> {
        raw.iter().map(|t| t.parse().unwrap()).collect()
    }

    #[test]
    fn local_hour_stays_in_range_for_every_supported_offset() {
        for hour in 0..24u8 {
            for offset in MIN_TIMEZONE_OFFSET..=MAX_TIMEZONE_OFFSET {
                assert!(local_hour(hour, offset) < 24, "hour={hour} offset={offset}");
            }
        }
    }

    #[test]
    fn negative_offsets_wrap_backwards() {
        assert_eq!(local_hour(1, -12), 13);
        assert_eq!(local_hour(0, -1), 23);
        assert_eq!(local_hour(23, 14), 13);
    }

    #[test]
    fn parses_and_pads_tokens() {
        assert_eq!("7:05".parse::<HourToken>().unwrap().to_string(), "07:05");
        assert!("24:00".parse::<HourToken>().is_err());
        assert!("12:60".parse::<HourToken>().is_err());
        assert!("12".parse::<HourToken>().is_err());
        assert!("ab:cd".parse::<HourToken>().is_err());
    }

    #[test]
    fn minutes_are_copied_unchanged() {
        let local = to_local_tokens(&tokens(&["14:30"]), -5);
        assert_eq!(local, BTreeSet::from(["09:30".to_string()]));
    }

    #[test]
    fn utc_noon_matches_local_two_pm_at_plus_two() {
        let alice = candidate(2, &["14:00"]);
        assert!(matches_availability(Some(&tokens(&["12:00"])), &alice));
        assert!(!matches_availability(Some(&tokens(&["14:00"])), &alice));
    }

    #[test]
    fn candidate_storing_exactly_the_converted_set_matches() {
        let search = tokens(&["01:00", "18:15", "23:45"]);
        for offset in MIN_TIMEZONE_OFFSET..=MAX_TIMEZONE_OFFSET {
            let local = to_local_tokens(&search, offset);
            let mut c = candidate(offset, &[]);
            c.active_hours_local = local;
            assert!(matches_availability(Some(&search), &c), "offset={offset}");
        }
    }

    #[test]
    fn absent_or_empty_criterion_never_filters() {
        let nobody_home = candidate(0, &[]);
        assert!(matches_availability(None, &nobody_home));
        assert!(matches_availability(Some(&BTreeSet::new()), &nobody_home));
    }
}
