use crate::error::{StorageError, StorageResult};
use crate::models::AdminSeed;
use crate::repositories::{
    SqliteConfigRepository, SqliteRationLedger, SqliteStudentRepository, SqliteTemplateStore,
};
use racion_core::Role;
use sqlx::ConnectOptions;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Where the kiosk database lives and how its pool behaves.
///
/// A kiosk has few concurrent users (the serve loop, operator commands, a
/// sync client), so the pool is small. `busy_timeout` matters more: ledger
/// writers racing for the same ration wait on SQLite's write lock instead of
/// failing with `SQLITE_BUSY`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// SQLite file; parent directories are created on open
    pub database_path: String,

    pub max_connections: u32,

    pub min_connections: u32,

    /// How long a caller waits for a pooled connection
    pub acquire_timeout: Duration,

    /// How long a connection waits on a locked database
    pub busy_timeout: Duration,

    pub create_if_missing: bool,

    /// Apply embedded migrations on open
    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_path: "racion.db".to_string(),
            max_connections: 4,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(5),
            create_if_missing: true,
            auto_migrate: true,
        }
    }
}

impl DatabaseConfig {
    pub fn new(database_path: impl Into<String>) -> Self {
        Self {
            database_path: database_path.into(),
            ..Default::default()
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    pub fn auto_migrate(mut self, migrate: bool) -> Self {
        self.auto_migrate = migrate;
        self
    }

    /// SQLite options for every pooled connection.
    ///
    /// Foreign keys are on (templates cascade with their student, ledger
    /// rows need a roster entry) and the journal is WAL so readers never
    /// block the ledger writer.
    pub fn connect_options(&self) -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .filename(&self.database_path)
            .create_if_missing(self.create_if_missing)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(self.busy_timeout)
            .disable_statement_logging()
    }
}

fn prepare_directory(database_path: &str) -> StorageResult<()> {
    let Some(parent) = Path::new(database_path).parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() || parent.is_dir() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|e| {
        StorageError::Configuration(format!(
            "cannot create database directory {}: {e}",
            parent.display()
        ))
    })
}

/// Pooled handle to the kiosk database. Cloning shares the pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (and by default create and migrate) the database file.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use racion_storage::connection::{Database, DatabaseConfig};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let db = Database::new(DatabaseConfig::new("/var/lib/racion/racion.db")).await?;
    /// db.health_check().await?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// `Configuration` if the parent directory cannot be created, otherwise
    /// the underlying connection or migration failure.
    pub async fn new(config: DatabaseConfig) -> StorageResult<Self> {
        if config.create_if_missing {
            prepare_directory(&config.database_path)?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(config.connect_options())
            .await?;

        let db = Self { pool };
        if config.auto_migrate {
            db.migrate().await?;
        }

        info!(
            path = %config.database_path,
            max_connections = config.max_connections,
            "Database opened"
        );
        Ok(db)
    }

    /// Private in-memory database with the schema applied.
    ///
    /// Limited to a single connection, since each SQLite memory connection
    /// is its own database.
    pub async fn in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::new()
            .in_memory(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Apply the migrations embedded from the workspace `migrations/` directory.
    pub async fn migrate(&self) -> StorageResult<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        debug!("Migrations applied");
        Ok(())
    }

    /// Create the first administrator if that identity is not yet enrolled.
    ///
    /// Returns `true` when a row was inserted. Running it again is a no-op,
    /// and an existing roster entry is never overwritten.
    pub async fn bootstrap_admin(&self, seed: &AdminSeed) -> StorageResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO students (identity, full_name, role, password_hash)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(seed.identity.as_str())
        .bind(&seed.full_name)
        .bind(Role::Administrator.to_i32())
        .bind(&seed.password_hash)
        .execute(&self.pool)
        .await?;

        let created = result.rows_affected() > 0;
        if created {
            info!(identity = %seed.identity, "Administrator created");
        }
        Ok(created)
    }

    pub fn templates(&self) -> SqliteTemplateStore {
        SqliteTemplateStore::new(self.pool.clone())
    }

    pub fn students(&self) -> SqliteStudentRepository {
        SqliteStudentRepository::new(self.pool.clone())
    }

    pub fn ledger(&self) -> SqliteRationLedger {
        SqliteRationLedger::new(self.pool.clone())
    }

    pub fn config(&self) -> SqliteConfigRepository {
        SqliteConfigRepository::new(self.pool.clone())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the pool, waiting for checked-out connections. Idempotent.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn health_check(&self) -> StorageResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
