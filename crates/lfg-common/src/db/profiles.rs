use std::collections::HashMap;

use async_trait::async_trait;
use tokio_postgres::Row;
use tracing::instrument;

use crate::db::PgPool;
use crate::store::{ProfileStore, StatsStore, StoreError, StoreResult};
use crate::{Candidate, GameStat};

const PROFILE_COLUMNS: &str = "id, username, display_name, bio, platforms, languages, \
     active_hours, mic_available, timezone_offset";

/// Postgres-backed profile and stats collaborator.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn map_candidate(row: &Row) -> StoreResult<Candidate> {
    let mapping = |err: tokio_postgres::Error| StoreError::Mapping(err.to_string());

    Ok(Candidate {
        id: row.try_get("id").map_err(mapping)?,
        username: row.try_get("username").map_err(mapping)?,
        display_name: row.try_get("display_name").map_err(mapping)?,
        bio: row.try_get("bio").map_err(mapping)?,
        platforms: row
            .try_get::<_, Vec<String>>("platforms")
            .map_err(mapping)?
            .into_iter()
            .collect(),
        languages: row
            .try_get::<_, Vec<String>>("languages")
            .map_err(mapping)?
            .into_iter()
            .collect(),
        active_hours_local: row
            .try_get::<_, Vec<String>>("active_hours")
            .map_err(mapping)?
            .into_iter()
            .collect(),
        mic_available: row.try_get("mic_available").map_err(mapping)?,
        timezone_offset_hours: row.try_get("timezone_offset").map_err(mapping)?,
    })
}

fn map_game_stat(row: &Row) -> StoreResult<GameStat> {
    let mapping = |err: tokio_postgres::Error| StoreError::Mapping(err.to_string());

    Ok(GameStat {
        candidate_id: row.try_get("user_id").map_err(mapping)?,
        game_id: row.try_get("game_id").map_err(mapping)?,
        hours_played: row.try_get("hours_played").map_err(mapping)?,
        goal_id: row.try_get("goal_id").map_err(mapping)?,
    })
}

#[async_trait]
impl ProfileStore for PgStore {
    #[instrument(skip(self))]
    async fn all(&self) -> StoreResult<Vec<Candidate>> {
        let client = self.pool.get().await?;
        let query = format!("SELECT {PROFILE_COLUMNS} FROM lfg.user_profiles ORDER BY id");
        let rows = client.query(&query, &[]).await?;

        rows.iter().map(map_candidate).collect()
    }

    #[instrument(skip(self))]
    async fn get(&self, id: i64) -> StoreResult<Option<Candidate>> {
        let client = self.pool.get().await?;
        let query = format!("SELECT {PROFILE_COLUMNS} FROM lfg.user_profiles WHERE id = $1");
        let row = client.query_opt(&query, &[&id]).await?;

        row.as_ref().map(map_candidate).transpose()
    }

    async fn ping(&self) -> StoreResult<()> {
        let client = self.pool.get().await?;
        client.simple_query("SELECT 1").await?;
        Ok(())
    }
}

#[async_trait]
impl StatsStore for PgStore {
    #[instrument(skip(self))]
    async fn for_candidate(&self, candidate_id: i64) -> StoreResult<Vec<GameStat>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT user_id, game_id, hours_played, goal_id \
                 FROM lfg.game_stats WHERE user_id = $1 ORDER BY game_id",
                &[&candidate_id],
            )
            .await?;

        rows.iter().map(map_game_stat).collect()
    }

    #[instrument(skip(self, candidate_ids), fields(candidates = candidate_ids.len()))]
    async fn for_candidates(&self, candidate_ids: &[i64]) -> StoreResult<HashMap<i64, Vec<GameStat>>> {
        if candidate_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let client = self.pool.get().await?;
        let ids = candidate_ids.to_vec();
        let rows = client
            .query(
                "SELECT user_id, game_id, hours_played, goal_id \
                 FROM lfg.game_stats WHERE user_id = ANY($1) ORDER BY user_id, game_id",
                &[&ids],
            )
            .await?;

        let mut stats: HashMap<i64, Vec<GameStat>> = HashMap::new();
        for row in &rows {
            let stat = map_game_stat(row)?;
            stats.entry(stat.candidate_id).or_default().push(stat);
        }
        Ok(stats)
    }
}
