//! Read-side collaborators the discovery engine consumes.
//!
//! `ProfileStore` enumerates candidate profiles and `StatsStore` supplies
//! per-game statistics. Both are async because the production backend is
//! Postgres; the in-memory implementation answers immediately.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use deadpool_postgres::PoolError;
use serde::Deserialize;
use thiserror::Error;
use tokio_postgres::Error as PgError;
use tracing::info;

use crate::{Candidate, GameStat, matching::index::PopulationSnapshot};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to get postgres connection: {0}")]
    Pool(#[from] PoolError),
    #[error("postgres error: {0}")]
    Postgres(#[from] PgError),
    #[error("failed to map row: {0}")]
    Mapping(String),
    #[error("failed to load fixtures: {0}")]
    Fixtures(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Every candidate profile.
    async fn all(&self) -> StoreResult<Vec<Candidate>>;

    /// An immutable, indexed view of the population.
    async fn snapshot(&self) -> StoreResult<Arc<PopulationSnapshot>> {
        Ok(Arc::new(PopulationSnapshot::new(self.all().await?)))
    }

    async fn get(&self, id: i64) -> StoreResult<Option<Candidate>> {
        Ok(self.all().await?.into_iter().find(|c| c.id == id))
    }

    /// Cheap reachability probe used by readiness checks.
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[async_trait]
pub trait StatsStore: Send + Sync {
    async fn for_candidate(&self, candidate_id: i64) -> StoreResult<Vec<GameStat>>;

    /// Stats for many candidates at once. Ids with no stats may be absent.
    async fn for_candidates(&self, candidate_ids: &[i64]) -> StoreResult<HashMap<i64, Vec<GameStat>>> {
        let mut stats = HashMap::with_capacity(candidate_ids.len());
        for &id in candidate_ids {
            stats.insert(id, self.for_candidate(id).await?);
        }
        Ok(stats)
    }
}

/// JSON fixture layout accepted by [`InMemoryStore::from_fixture_file`].
#[derive(Debug, Default, Deserialize)]
pub struct Fixtures {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub game_stats: Vec<GameStat>,
}

#[derive(Debug, Default)]
struct MemoryState {
    snapshot: Arc<PopulationSnapshot>,
    /// candidate id → game id → stat; one stat per (candidate, game).
    stats: HashMap<i64, BTreeMap<i64, GameStat>>,
}

/// Process-local store. Writers swap in a fresh snapshot, so readers holding
/// an older `Arc` keep a consistent view.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<MemoryState>,
}

impl InMemoryStore {
    pub fn new(candidates: Vec<Candidate>, stats: Vec<GameStat>) -> Self {
        let store = Self::default();
        store.replace_population(candidates);
        for stat in stats {
            store.upsert_stat(stat);
        }
        store
    }

    pub fn from_fixtures(fixtures: Fixtures) -> Self {
        Self::new(fixtures.candidates, fixtures.game_stats)
    }

    pub fn from_fixture_file(path: &Path) -> StoreResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|err| StoreError::Fixtures(format!("{}: {err}", path.display())))?;
        let fixtures: Fixtures = serde_json::from_str(&raw)
            .map_err(|err| StoreError::Fixtures(format!("{}: {err}", path.display())))?;

        info!(
            candidates = fixtures.candidates.len(),
            game_stats = fixtures.game_stats.len(),
            path = %path.display(),
            "loaded fixtures"
        );
        Ok(Self::from_fixtures(fixtures))
    }

    pub fn replace_population(&self, candidates: Vec<Candidate>) {
        let snapshot = Arc::new(PopulationSnapshot::new(candidates));
        self.write().snapshot = snapshot;
    }

    /// Insert or replace one profile.
    pub fn insert_candidate(&self, candidate: Candidate) {
        let mut state = self.write();
        let mut candidates: Vec<Candidate> = state.snapshot.candidates().cloned().collect();
        candidates.retain(|c| c.id != candidate.id);
        candidates.push(candidate);
        state.snapshot = Arc::new(PopulationSnapshot::new(candidates));
    }

    /// Insert a stat, replacing any existing stat for the same game.
    pub fn upsert_stat(&self, stat: GameStat) {
        self.write()
            .stats
            .entry(stat.candidate_id)
            .or_default()
            .insert(stat.game_id, stat);
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, MemoryState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, MemoryState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ProfileStore for InMemoryStore {
    async fn all(&self) -> StoreResult<Vec<Candidate>> {
        Ok(self.read().snapshot.candidates().cloned().collect())
    }

    async fn snapshot(&self) -> StoreResult<Arc<PopulationSnapshot>> {
        Ok(Arc::clone(&self.read().snapshot))
    }

    async fn get(&self, id: i64) -> StoreResult<Option<Candidate>> {
        Ok(self.read().snapshot.get(id).cloned())
    }
}

#[async_trait]
impl StatsStore for InMemoryStore {
    async fn for_candidate(&self, candidate_id: i64) -> StoreResult<Vec<GameStat>> {
        Ok(self
            .read()
            .stats
            .get(&candidate_id)
            .map(|games| games.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn for_candidates(&self, candidate_ids: &[i64]) -> StoreResult<HashMap<i64, Vec<GameStat>>> {
        let state = self.read();
        Ok(candidate_ids
            .iter()
            .filter_map(|id| {
                state
                    .stats
                    .get(id)
                    .map(|games| (*id, games.values().cloned().collect()))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: i64) -> Candidate {
        Candidate {
            id,
            username: format!("player{id}"),
            ..Candidate::default()
        }
    }

    fn stat(candidate_id: i64, game_id: i64, hours: i64) -> GameStat {
        GameStat {
            candidate_id,
            game_id,
            hours_played: hours,
            goal_id: None,
        }
    }

    #[tokio::test]
    async fn upsert_keeps_one_stat_per_game() {
        let store = InMemoryStore::new(vec![candidate(1)], vec![stat(1, 10, 5), stat(1, 10, 50)]);

        let stats = store.for_candidate(1).await.unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].hours_played, 50);
    }

    #[tokio::test]
    async fn held_snapshot_is_unaffected_by_later_writes() {
        let store = InMemoryStore::new(vec![candidate(1)], vec![]);
        let before = store.snapshot().await.unwrap();

        store.insert_candidate(candidate(2));
        let after = store.snapshot().await.unwrap();

        assert_eq!(before.len(), 1);
        assert_eq!(after.len(), 2);
    }

    #[tokio::test]
    async fn batched_stats_omit_candidates_without_stats() {
        let store = InMemoryStore::new(
            vec![candidate(1), candidate(2)],
            vec![stat(1, 3, 1), stat(1, 4, 2)],
        );

        let stats = store.for_candidates(&[1, 2]).await.unwrap();
        assert_eq!(stats.get(&1).map(Vec::len), Some(2));
        assert!(!stats.contains_key(&2));
    }

    #[test]
    fn parses_fixture_json() {
        let fixtures: Fixtures = serde_json::from_str(
            r#"{
                "candidates": [{"id": 1, "username": "alice", "platforms": ["pc"],
                                "active_hours_local": ["14:00"], "timezone_offset_hours": 2}],
                "game_stats": [{"candidate_id": 1, "game_id": 7, "hours_played": 12, "goal_id": "casual"}]
            }"#,
        )
        .unwrap();

        let store = InMemoryStore::from_fixtures(fixtures);
        assert_eq!(store.read().snapshot.len(), 1);
    }
}
