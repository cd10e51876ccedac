//! SQLite connection pool
//!
//! Opens the pool the [`super::SqliteEngine`] runs on and brings the schema
//! up to date when `auto_migrate` is set.

use crate::config::DatabaseSettings;
use crate::storage::migrations::{self, MigrationStatus};
use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const MEMORY_PATH: &str = ":memory:";

/// How to open the SQLite store
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database file, or `:memory:`
    pub path: PathBuf,
    pub max_connections: u32,
    /// Apply pending schema migrations on open
    pub auto_migrate: bool,
    pub journal_mode: SqliteJournalMode,
    pub synchronous: SqliteSynchronous,
    /// Lock wait before a statement fails with SQLITE_BUSY
    pub busy_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::from_parts(&DatabaseSettings::default(), default_database_path())
    }
}

impl DatabaseConfig {
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Private in-memory store; a single connection keeps every query on
    /// the same database
    ///
    /// That connection serializes access: while one unit of work holds a
    /// transaction, other transactions and committed reads wait for the
    /// pool's acquire timeout. Use a file database when units of work run
    /// concurrently.
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::from(MEMORY_PATH),
            max_connections: 1,
            ..Self::default()
        }
    }

    /// Build a config from the `[database]` section of the config file
    pub fn from_settings(settings: &DatabaseSettings) -> Result<Self> {
        let journal_mode = SqliteJournalMode::from_str(&settings.journal_mode)
            .with_context(|| format!("Invalid journal mode: {}", settings.journal_mode))?;

        let mut config = Self::from_parts(settings, settings.path.clone());
        config.journal_mode = journal_mode;
        if config.is_memory() {
            config.max_connections = 1;
        }
        Ok(config)
    }

    fn from_parts(settings: &DatabaseSettings, path: PathBuf) -> Self {
        Self {
            path,
            max_connections: settings.max_connections,
            auto_migrate: settings.auto_migrate,
            journal_mode: SqliteJournalMode::Wal,
            synchronous: SqliteSynchronous::Normal,
            busy_timeout: Duration::from_secs(settings.busy_timeout_secs),
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn no_migrate(mut self) -> Self {
        self.auto_migrate = false;
        self
    }

    fn is_memory(&self) -> bool {
        self.path.as_os_str() == MEMORY_PATH
    }

    /// An in-memory database lives only as long as its connection, so that
    /// connection is never reaped for idleness or age
    fn pool_options(&self) -> SqlitePoolOptions {
        let options = SqlitePoolOptions::new().max_connections(self.max_connections);
        if self.is_memory() {
            options
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            options
        }
    }

    fn connect_options(&self) -> Result<SqliteConnectOptions> {
        let options = if self.is_memory() {
            SqliteConnectOptions::from_str("sqlite::memory:")?
        } else {
            SqliteConnectOptions::new()
                .filename(&self.path)
                .create_if_missing(true)
        };

        Ok(options
            .journal_mode(self.journal_mode)
            .synchronous(self.synchronous)
            .busy_timeout(self.busy_timeout)
            .foreign_keys(true))
    }
}

/// `<data dir>/unitwork/unitwork.db`, or `unitwork.db` in the working
/// directory when the platform has no data dir
pub fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("unitwork").join("unitwork.db"))
        .unwrap_or_else(|| PathBuf::from("unitwork.db"))
}

/// Connection pool plus the config it was opened with
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    config: DatabaseConfig,
}

impl Database {
    pub async fn new(config: DatabaseConfig) -> Result<Self> {
        if !config.is_memory() {
            if let Some(dir) = config.path.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create database directory: {:?}", dir))?;
            }
        }

        let pool = config
            .pool_options()
            .connect_with(config.connect_options()?)
            .await
            .with_context(|| format!("Failed to open database: {:?}", config.path))?;

        let db = Self { pool, config };
        if db.config.auto_migrate {
            db.migrate().await?;
        }

        tracing::debug!(path = ?db.config.path, "Database opened");
        Ok(db)
    }

    pub async fn in_memory() -> Result<Self> {
        Self::new(DatabaseConfig::in_memory()).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub async fn migrate(&self) -> Result<()> {
        migrations::run_migrations(&self.pool)
            .await
            .context("Failed to run database migrations")
    }

    pub async fn migration_status(&self) -> Result<MigrationStatus> {
        migrations::migration_status(&self.pool)
            .await
            .context("Failed to read migration status")
    }

    /// Round-trip a trivial query
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("Database health check failed")?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
