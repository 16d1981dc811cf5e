#![allow(async_fn_in_trait)]

use crate::error::{StorageError, StorageResult};
use crate::models::TerminalConfig;
use sqlx::SqlitePool;
use tracing::info;

/// Access to the singleton terminal configuration row
pub trait ConfigRepository: Send + Sync {
    /// Current configuration, if one was ever saved
    async fn get(&self) -> StorageResult<Option<TerminalConfig>>;

    /// Create or replace the configuration
    async fn save(&self, config: &TerminalConfig) -> StorageResult<()>;

    /// Configuration the kiosk cannot run without.
    ///
    /// Fails with `MissingConfiguration` if the row is absent or incomplete.
    async fn require(&self) -> StorageResult<TerminalConfig> {
        let config = self.get().await?.ok_or_else(|| {
            StorageError::MissingConfiguration("no terminal configuration stored".to_string())
        })?;
        config.validate()?;
        Ok(config)
    }
}

/// SQLite implementation of ConfigRepository
#[derive(Debug, Clone)]
pub struct SqliteConfigRepository {
    pool: SqlitePool,
}

impl SqliteConfigRepository {
    /// Create a new SQLite configuration repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl ConfigRepository for SqliteConfigRepository {
    async fn get(&self) -> StorageResult<Option<TerminalConfig>> {
        let config = sqlx::query_as::<_, TerminalConfig>(
            "SELECT terminal_id, printer_port FROM terminal_config WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(config)
    }

    async fn save(&self, config: &TerminalConfig) -> StorageResult<()> {
        config.validate()?;

        sqlx::query(
            r#"
            INSERT INTO terminal_config (id, terminal_id, printer_port, updated_at)
            VALUES (1, ?, ?, datetime('now'))
            ON CONFLICT(id) DO UPDATE SET
                terminal_id = excluded.terminal_id,
                printer_port = excluded.printer_port,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&config.terminal_id)
        .bind(&config.printer_port)
        .execute(&self.pool)
        .await?;

        info!(terminal_id = %config.terminal_id, printer_port = %config.printer_port, "Terminal configuration saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Database;

    async fn setup() -> (Database, SqliteConfigRepository) {
        let db = Database::in_memory().await.unwrap();
        let repo = SqliteConfigRepository::new(db.pool().clone());
        (db, repo)
    }

    #[tokio::test]
    async fn test_missing_configuration() {
        let (_db, repo) = setup().await;

        assert_eq!(repo.get().await.unwrap(), None);
        assert!(matches!(
            repo.require().await,
            Err(StorageError::MissingConfiguration(_))
        ));
    }

    #[tokio::test]
    async fn test_save_then_replace() {
        let (db, repo) = setup().await;

        repo.save(&TerminalConfig::new("TOTEM-01")).await.unwrap();
        assert_eq!(repo.require().await.unwrap().terminal_id, "TOTEM-01");

        let updated = TerminalConfig::new("TOTEM-02").with_printer_port("/dev/ttyS0");
        repo.save(&updated).await.unwrap();
        assert_eq!(repo.require().await.unwrap(), updated);

        let rows: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM terminal_config")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(rows.0, 1);
    }

    #[tokio::test]
    async fn test_blank_terminal_id_not_saved() {
        let (_db, repo) = setup().await;

        let err = repo.save(&TerminalConfig::new("")).await.unwrap_err();
        assert!(matches!(err, StorageError::MissingConfiguration(_)));
        assert_eq!(repo.get().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_blank_stored_row_fails_require() {
        let (db, repo) = setup().await;
        sqlx::query("INSERT INTO terminal_config (id, terminal_id) VALUES (1, '')")
            .execute(db.pool())
            .await
            .unwrap();

        assert!(matches!(
            repo.require().await,
            Err(StorageError::MissingConfiguration(_))
        ));
    }
}
