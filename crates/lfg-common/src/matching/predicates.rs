use std::collections::BTreeSet;

use super::{
    availability::matches_availability,
    decision::{FilterDecision, FilterOutcome},
};
use crate::{Candidate, GameStat, criteria::Criteria};

/// Run every non-game-scoped predicate. Absent criteria are `Skipped`.
pub fn run_all_predicates(criteria: &Criteria, candidate: &Candidate, stats: &[GameStat]) -> FilterOutcome {
    let decisions = vec![
        ("text", check_text(criteria.text.as_deref(), candidate)),
        (
            "platforms",
            check_overlap(criteria.platforms.as_ref(), &candidate.platforms, "platform"),
        ),
        (
            "languages",
            check_overlap(criteria.languages.as_ref(), &candidate.languages, "language"),
        ),
        ("availability", check_availability(criteria, candidate)),
        ("mic", check_mic(criteria.mic_available, candidate)),
        ("games", check_game_membership(criteria.games.as_ref(), stats)),
        ("min_hours", check_min_hours(criteria.min_hours_played, stats)),
        ("player_goals", check_goal_membership(criteria.player_goals.as_ref(), stats)),
    ];

    FilterOutcome::new(decisions)
}

/// Case-insensitive substring of username, display name or bio.
fn check_text(term: Option<&str>, candidate: &Candidate) -> FilterDecision {
    let Some(term) = term else {
        return FilterDecision::Skipped;
    };
    let needle = term.to_lowercase();

    let found = std::iter::once(Some(candidate.username.as_str()))
        .chain([candidate.display_name.as_deref(), candidate.bio.as_deref()])
        .flatten()
        .any(|field| field.to_lowercase().contains(&needle));

    FilterDecision::check(found, || format!("no profile field contains {term:?}"))
}

fn check_overlap(
    requested: Option<&BTreeSet<String>>,
    owned: &BTreeSet<String>,
    label: &str,
) -> FilterDecision {
    let Some(requested) = requested else {
        return FilterDecision::Skipped;
    };

    FilterDecision::check(!requested.is_disjoint(owned), || {
        format!("no {label} in common with {requested:?}")
    })
}

fn check_availability(criteria: &Criteria, candidate: &Candidate) -> FilterDecision {
    let Some(tokens) = criteria.active_hours_utc.as_ref().filter(|t| !t.is_empty()) else {
        return FilterDecision::Skipped;
    };

    FilterDecision::check(matches_availability(Some(tokens), candidate), || {
        format!(
            "no local active hour overlaps the requested UTC hours at offset {:+}",
            candidate.timezone_offset_hours
        )
    })
}

fn check_mic(requested: Option<bool>, candidate: &Candidate) -> FilterDecision {
    match requested {
        None => FilterDecision::Skipped,
        Some(wanted) => FilterDecision::check(candidate.mic_available == wanted, || {
            format!("mic_available is {}, wanted {wanted}", candidate.mic_available)
        }),
    }
}

fn check_game_membership(games: Option<&BTreeSet<i64>>, stats: &[GameStat]) -> FilterDecision {
    let Some(games) = games else {
        return FilterDecision::Skipped;
    };

    FilterDecision::check(stats.iter().any(|s| games.contains(&s.game_id)), || {
        format!("plays none of games {games:?}")
    })
}

/// At least one game must clear the threshold; not every game.
fn check_min_hours(threshold: Option<i64>, stats: &[GameStat]) -> FilterDecision {
    let Some(threshold) = threshold else {
        return FilterDecision::Skipped;
    };

    FilterDecision::check(stats.iter().any(|s| s.hours_played >= threshold), || {
        format!("no game with at least {threshold} hours")
    })
}

fn check_goal_membership(goals: Option<&BTreeSet<String>>, stats: &[GameStat]) -> FilterDecision {
    let Some(goals) = goals else {
        return FilterDecision::Skipped;
    };

    let found = stats
        .iter()
        .filter_map(|s| s.goal_id.as_ref())
        .any(|goal| goals.contains(goal));

    FilterDecision::check(found, || format!("no game goal in {goals:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_candidate() -> Candidate {
        Candidate {
            id: 7,
            username: "NightOwl".into(),
            display_name: Some("Owl".into()),
            bio: Some("Support main, chill vibes".into()),
            platforms: BTreeSet::from(["pc".into(), "switch".into()]),
            languages: BTreeSet::from(["en".into(), "de".into()]),
            active_hours_local: BTreeSet::from(["22:00".into()]),
            mic_available: true,
            timezone_offset_hours: 1,
        }
    }

    fn stat(game_id: i64, hours: i64, goal: Option<&str>) -> GameStat {
        GameStat {
            candidate_id: 7,
            game_id,
            hours_played: hours,
            goal_id: goal.map(str::to_string),
        }
    }

    fn criteria(pairs: &[(&str, &str)]) -> Criteria {
        Criteria::from_pairs(pairs.iter().copied())
    }

    #[test]
    fn empty_criteria_skips_every_predicate() {
        let outcome = run_all_predicates(&Criteria::default(), &base_candidate(), &[]);

        assert!(outcome.is_match);
        assert_eq!(outcome.decisions.len(), 8);
        assert!(outcome.decisions.iter().all(|(_, d)| *d == FilterDecision::Skipped));
    }

    #[test]
    fn text_matches_any_field_case_insensitively() {
        let candidate = base_candidate();
        for term in ["nightowl", "OWL", "chill VIBES"] {
            let outcome = run_all_predicates(&criteria(&[("q", term)]), &candidate, &[]);
            assert!(outcome.is_match, "term {term}");
        }

        let outcome = run_all_predicates(&criteria(&[("q", "tank")]), &candidate, &[]);
        assert!(!outcome.is_match);
    }

    #[test]
    fn surrounding_whitespace_in_text_term_is_significant() {
        let candidate = base_candidate();

        assert!(!run_all_predicates(&criteria(&[("q", " owl")]), &candidate, &[]).is_match);
        assert!(run_all_predicates(&criteria(&[("q", " chill")]), &candidate, &[]).is_match);
    }

    #[test]
    fn platform_mismatch_excludes_even_when_everything_else_passes() {
        let query = criteria(&[
            ("q", "owl"),
            ("platforms", "xbox"),
            ("languages", "en"),
            ("active_hours", "21:00"),
            ("mic_available", "true"),
        ]);

        let outcome = run_all_predicates(&query, &base_candidate(), &[]);
        assert!(!outcome.is_match);
        let rejected: Vec<_> = outcome
            .decisions
            .iter()
            .filter(|(_, d)| d.is_reject())
            .map(|(name, _)| *name)
            .collect();
        assert_eq!(rejected, vec!["platforms"]);
    }

    #[test]
    fn mic_must_equal_requested_value() {
        let mut candidate = base_candidate();
        candidate.mic_available = false;

        assert!(run_all_predicates(&criteria(&[("mic_available", "false")]), &candidate, &[]).is_match);
        assert!(!run_all_predicates(&criteria(&[("mic_available", "true")]), &candidate, &[]).is_match);
    }

    #[test]
    fn min_hours_needs_only_one_game_over_threshold() {
        let stats = [stat(1, 10, None), stat(2, 120, None)];
        let query = criteria(&[("min_hours_played", "100")]);

        assert!(run_all_predicates(&query, &base_candidate(), &stats).is_match);
        assert!(!run_all_predicates(&query, &base_candidate(), &stats[..1]).is_match);
    }

    #[test]
    fn zero_stats_never_satisfy_positive_min_hours() {
        let query = criteria(&[("min_hours_played", "1")]);
        assert!(!run_all_predicates(&query, &base_candidate(), &[]).is_match);
    }

    #[test]
    fn game_and_goal_membership_look_across_all_stats() {
        let stats = [stat(3, 5, Some("casual")), stat(9, 40, Some("competitive"))];

        assert!(run_all_predicates(&criteria(&[("games", "9,11")]), &base_candidate(), &stats).is_match);
        assert!(!run_all_predicates(&criteria(&[("games", "11")]), &base_candidate(), &stats).is_match);
        assert!(
            run_all_predicates(&criteria(&[("player_goals", "competitive")]), &base_candidate(), &stats)
                .is_match
        );
        assert!(
            !run_all_predicates(&criteria(&[("player_goals", "ranked")]), &base_candidate(), &stats)
                .is_match
        );
    }
}
