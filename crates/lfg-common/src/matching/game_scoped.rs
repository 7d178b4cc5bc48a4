//! Per-game constraints (`min_hours_game_<id>`, `goals_game_<id>`).
//!
//! Each referenced game is checked against that game's own stat only. A
//! candidate holds at most one stat per game, so when both an hours floor and
//! a goal set name the same game they are tested against the same record.
//! Distinct games are ANDed; goal ids within one game are ORed.

use std::collections::HashMap;

use super::decision::{FilterDecision, FilterOutcome};
use crate::{GameStat, criteria::Criteria};

pub fn run_game_scoped_checks(criteria: &Criteria, stats: &[GameStat]) -> FilterOutcome {
    if !criteria.has_game_scoped() {
        return FilterOutcome::new(Vec::new());
    }

    let by_game: HashMap<i64, &GameStat> = stats.iter().map(|s| (s.game_id, s)).collect();
    let mut decisions = Vec::new();

    for game_id in criteria.game_scoped_ids() {
        let stat = by_game.get(&game_id).copied();

        if let Some(&threshold) = criteria.per_game_min_hours.get(&game_id) {
            decisions.push(("game_min_hours", check_game_hours(game_id, threshold, stat)));
        }
        if let Some(goals) = criteria.per_game_goals.get(&game_id) {
            let decision = match stat {
                None => FilterDecision::reject(format!("no stats for game {game_id}")),
                Some(stat) => {
                    let goal = stat.goal_id.as_deref();
                    FilterDecision::check(goal.is_some_and(|g| goals.contains(g)), || {
                        format!("game {game_id} goal {goal:?} not in {goals:?}")
                    })
                }
            };
            decisions.push(("game_goals", decision));
        }
    }

    FilterOutcome::new(decisions)
}

fn check_game_hours(game_id: i64, threshold: i64, stat: Option<&GameStat>) -> FilterDecision {
    match stat {
        None => FilterDecision::reject(format!("no stats for game {game_id}")),
        Some(stat) => FilterDecision::check(stat.hours_played >= threshold, || {
            format!(
                "game {game_id} has {} hours, needs {threshold}",
                stat.hours_played
            )
        }),
    }
}
