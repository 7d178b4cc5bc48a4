use deadpool_postgres::PoolError;
use thiserror::Error;
use tokio_postgres::Error as PgError;
use tracing::{info, instrument};

use crate::db::{DbPoolError, PgPool};

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("failed to get postgres connection: {0}")]
    Pool(#[from] PoolError),
    #[error("failed to run migration: {0}")]
    Postgres(#[from] PgError),
    #[error("failed to build pool: {0}")]
    PoolBuild(#[from] DbPoolError),
}

struct Migration {
    id: i32,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        id: 1,
        description: "profiles and per-game stats",
        sql: r#"
CREATE TABLE IF NOT EXISTS lfg.user_profiles (
    id BIGINT PRIMARY KEY,
    username TEXT NOT NULL,
    display_name TEXT,
    bio TEXT,
    platforms TEXT[] NOT NULL DEFAULT '{}',
    languages TEXT[] NOT NULL DEFAULT '{}',
    active_hours TEXT[] NOT NULL DEFAULT '{}',
    mic_available BOOLEAN NOT NULL DEFAULT FALSE,
    timezone_offset INTEGER NOT NULL DEFAULT 0,
    CONSTRAINT chk_timezone_offset_range CHECK (timezone_offset BETWEEN -12 AND 14)
);

CREATE TABLE IF NOT EXISTS lfg.game_stats (
    user_id BIGINT NOT NULL REFERENCES lfg.user_profiles(id) ON DELETE CASCADE,
    game_id BIGINT NOT NULL,
    hours_played BIGINT NOT NULL DEFAULT 0,
    goal_id TEXT,
    PRIMARY KEY (user_id, game_id),
    CONSTRAINT chk_hours_played_non_negative CHECK (hours_played >= 0)
);
"#,
    },
    Migration {
        id: 2,
        description: "array indexes for overlap filters",
        sql: r#"
CREATE INDEX IF NOT EXISTS idx_user_profiles_platforms
    ON lfg.user_profiles USING GIN (platforms);
CREATE INDEX IF NOT EXISTS idx_user_profiles_languages
    ON lfg.user_profiles USING GIN (languages);
CREATE INDEX IF NOT EXISTS idx_user_profiles_active_hours
    ON lfg.user_profiles USING GIN (active_hours);
CREATE INDEX IF NOT EXISTS idx_game_stats_game_goal
    ON lfg.game_stats(game_id, goal_id);
"#,
    },
];

#[instrument(skip(pool))]
pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrationError> {
    let mut client = pool.get().await?;
    client
        .batch_execute(
            "CREATE SCHEMA IF NOT EXISTS lfg;
             CREATE TABLE IF NOT EXISTS lfg.schema_migrations (
                id INTEGER PRIMARY KEY,
                description TEXT NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
             );",
        )
        .await?;

    for migration in MIGRATIONS {
        let already_applied: bool = client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM lfg.schema_migrations WHERE id = $1)",
                &[&migration.id],
            )
            .await?
            .get(0);

        if already_applied {
            continue;
        }

        let tx = client.transaction().await?;
        tx.batch_execute(migration.sql).await?;
        tx.execute(
            "INSERT INTO lfg.schema_migrations (id, description) VALUES ($1, $2)",
            &[&migration.id, &migration.description],
        )
        .await?;
        tx.commit().await?;

        info!(
            id = migration.id,
            description = migration.description,
            "applied migration"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migration_ids_are_strictly_increasing() {
        assert!(MIGRATIONS.windows(2).all(|w| w[0].id < w[1].id));
        assert!(MIGRATIONS.iter().all(|m| m.sql.contains("lfg.")));
    }
}
