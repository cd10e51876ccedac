//! Schema migrations
//!
//! Each migration runs in its own transaction together with the ledger row
//! recording it, so a failed step leaves the schema at the previous version.

use sqlx::SqlitePool;
use tracing::{debug, info};

/// Latest schema version known to this build
pub const CURRENT_VERSION: i32 = 1;

const LEDGER: &str = r#"
    CREATE TABLE IF NOT EXISTS schema_migrations (
        version INTEGER PRIMARY KEY NOT NULL,
        name TEXT NOT NULL,
        applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );
"#;

const ENTITY_STORE: &str = r#"
    CREATE TABLE IF NOT EXISTS entities (
        kind TEXT NOT NULL,
        key TEXT NOT NULL,
        payload TEXT NOT NULL,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        PRIMARY KEY (kind, key)
    );

    CREATE INDEX IF NOT EXISTS idx_entities_kind ON entities(kind);
    CREATE INDEX IF NOT EXISTS idx_entities_updated_at ON entities(updated_at);
"#;

struct Migration {
    version: i32,
    name: &'static str,
    sql: &'static str,
}

/// Ordered by version
const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "entity store",
    sql: ENTITY_STORE,
}];

async fn schema_version(pool: &SqlitePool) -> anyhow::Result<i32> {
    sqlx::raw_sql(LEDGER).execute(pool).await?;

    let (version,): (i32,) =
        sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
            .fetch_one(pool)
            .await?;
    Ok(version)
}

/// Apply every migration newer than the stored schema version
pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    let current = schema_version(pool).await?;
    if current >= CURRENT_VERSION {
        debug!(version = current, "Schema up to date");
        return Ok(());
    }

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        let mut tx = pool.begin().await?;
        sqlx::raw_sql(migration.sql).execute(&mut *tx).await?;
        sqlx::query("INSERT INTO schema_migrations (version, name) VALUES (?, ?)")
            .bind(migration.version)
            .bind(migration.name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(
            version = migration.version,
            name = migration.name,
            "Applied schema migration"
        );
    }

    Ok(())
}

/// Whether the stored schema is behind [`CURRENT_VERSION`]
pub async fn needs_migration(pool: &SqlitePool) -> anyhow::Result<bool> {
    Ok(migration_status(pool).await?.needs_migration)
}

pub async fn migration_status(pool: &SqlitePool) -> anyhow::Result<MigrationStatus> {
    let current_version = schema_version(pool).await?;
    Ok(MigrationStatus {
        current_version,
        target_version: CURRENT_VERSION,
        needs_migration: current_version < CURRENT_VERSION,
    })
}

/// Stored schema version against the latest one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationStatus {
    pub current_version: i32,
    pub target_version: i32,
    pub needs_migration: bool,
}
