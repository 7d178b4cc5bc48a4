use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use thiserror::Error;
use tracing::{Instrument, Level, Span, debug, info};

use super::{
    decision::FilterOutcome, game_scoped::run_game_scoped_checks, index::PopulationSnapshot,
    predicates::run_all_predicates,
};
use crate::{
    Candidate, GameStat,
    criteria::Criteria,
    store::{ProfileStore, StatsStore, StoreError},
};

const DEFAULT_PARALLEL_THRESHOLD: usize = 512;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("store failure: {0}")]
    Store(#[from] StoreError),
    #[error("evaluation task failed: {0}")]
    Evaluation(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Populations at least this large are evaluated on the rayon pool.
    pub parallel_threshold: usize,
    /// Narrow the population with the inverted index before evaluating.
    pub use_index: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
            use_index: true,
        }
    }
}

impl DiscoveryConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            parallel_threshold: std::env::var("LFG_DISCOVERY_PARALLEL_THRESHOLD")
                .ok()
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(defaults.parallel_threshold),
            use_index: std::env::var("LFG_DISCOVERY_USE_INDEX")
                .map(|raw| !(raw == "0" || raw.eq_ignore_ascii_case("false")))
                .unwrap_or(defaults.use_index),
        }
    }
}

/// Applies the full predicate conjunction to a population and returns the
/// matches, deduplicated and ordered by candidate id.
///
/// Evaluation is read-only per candidate, so large populations are split
/// across the rayon pool without locking.
#[derive(Debug, Clone)]
pub struct DiscoveryEngine {
    config: DiscoveryConfig,
    span: Span,
}

impl Default for DiscoveryEngine {
    fn default() -> Self {
        Self::new(DiscoveryConfig::default())
    }
}

impl DiscoveryEngine {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self {
            config,
            span: tracing::info_span!("discovery"),
        }
    }

    /// Parent span for everything the engine logs.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Global predicates ANDed with the per-game ones for one candidate.
    pub fn evaluate(&self, criteria: &Criteria, candidate: &Candidate, stats: &[GameStat]) -> FilterOutcome {
        run_all_predicates(criteria, candidate, stats).and(run_game_scoped_checks(criteria, stats))
    }

    /// Pure filtering over an in-hand population.
    pub fn filter_candidates(
        &self,
        criteria: &Criteria,
        candidates: &[Candidate],
        stats: &HashMap<i64, Vec<GameStat>>,
    ) -> Vec<Candidate> {
        let snapshot = PopulationSnapshot::new(candidates.iter().cloned());
        self.filter_snapshot(criteria, &snapshot, stats)
    }

    pub fn filter_snapshot(
        &self,
        criteria: &Criteria,
        snapshot: &PopulationSnapshot,
        stats: &HashMap<i64, Vec<GameStat>>,
    ) -> Vec<Candidate> {
        let _entered = self.span.enter();
        self.assemble(criteria, self.narrow(criteria, snapshot), stats)
    }

    /// Load the population and the stats it needs, then filter on tokio's
    /// blocking pool.
    pub async fn discover(
        &self,
        criteria: &Criteria,
        profiles: &dyn ProfileStore,
        stats_store: &dyn StatsStore,
    ) -> Result<Vec<Candidate>, DiscoveryError> {
        async {
            let started = Instant::now();
            let snapshot = profiles.snapshot().await?;
            let ids: Vec<i64> = self.narrow(criteria, &snapshot).iter().map(|c| c.id).collect();

            let stats = if criteria.needs_stats() && !ids.is_empty() {
                stats_store.for_candidates(&ids).await?
            } else {
                HashMap::new()
            };

            let engine = self.clone();
            let owned_criteria = criteria.clone();
            let population = Arc::clone(&snapshot);
            let matched = tokio::task::spawn_blocking(move || {
                engine.filter_snapshot(&owned_criteria, &population, &stats)
            })
            .await?;

            info!(
                population = snapshot.len(),
                prefiltered = ids.len(),
                matched = matched.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "discovery finished"
            );
            Ok::<_, DiscoveryError>(matched)
        }
        .instrument(self.span.clone())
        .await
    }

    /// Per-predicate decisions for one candidate; `None` if the id is unknown.
    pub async fn explain(
        &self,
        criteria: &Criteria,
        candidate_id: i64,
        profiles: &dyn ProfileStore,
        stats_store: &dyn StatsStore,
    ) -> Result<Option<FilterOutcome>, DiscoveryError> {
        let Some(candidate) = profiles.get(candidate_id).await? else {
            return Ok(None);
        };
        let stats = stats_store.for_candidate(candidate_id).await?;
        Ok(Some(self.evaluate(criteria, &candidate, &stats)))
    }

    fn narrow<'a>(&self, criteria: &Criteria, snapshot: &'a PopulationSnapshot) -> Vec<&'a Candidate> {
        if self.config.use_index {
            snapshot.prefiltered(criteria)
        } else {
            snapshot.candidates().collect()
        }
    }

    fn assemble(
        &self,
        criteria: &Criteria,
        pool: Vec<&Candidate>,
        stats: &HashMap<i64, Vec<GameStat>>,
    ) -> Vec<Candidate> {
        let keep = |candidate: &&Candidate| {
            let candidate_stats = stats.get(&candidate.id).map(Vec::as_slice).unwrap_or(&[]);
            let outcome = self.evaluate(criteria, candidate, candidate_stats);
            if !outcome.is_match && tracing::enabled!(Level::DEBUG) {
                debug!(
                    candidate_id = candidate.id,
                    reasons = outcome.rejection_summary().as_deref().unwrap_or(""),
                    "candidate rejected"
                );
            }
            outcome.is_match
        };

        let matched: Vec<&Candidate> = if pool.len() >= self.config.parallel_threshold {
            pool.into_par_iter().filter(keep).collect()
        } else {
            pool.into_iter().filter(keep).collect()
        };

        // Keyed by id: duplicates collapse and the output is ordered by id.
        matched
            .into_iter()
            .map(|c| (c.id, c.clone()))
            .collect::<BTreeMap<_, _>>()
            .into_values()
            .collect()
    }
}
