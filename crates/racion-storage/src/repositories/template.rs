#![allow(async_fn_in_trait)]

use crate::error::{StorageError, StorageResult};
use crate::transaction;
use racion_core::Identity;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Durable `identity -> template bytes` storage.
///
/// Templates are opaque vendor bytes; this store never inspects them. The
/// identification cache is built from [`load_all`](TemplateStore::load_all)
/// at startup and updated by the caller after `add`/`remove`.
pub trait TemplateStore: Send + Sync {
    /// Load every enrolled template, sorted by identity.
    async fn load_all(&self) -> StorageResult<BTreeMap<Identity, Vec<u8>>>;

    /// Find one template.
    async fn find(&self, identity: &Identity) -> StorageResult<Option<Vec<u8>>>;

    /// Store a template for an identity already on the roster.
    ///
    /// Fails with `DuplicateIdentity` if the identity already has one.
    async fn add(&self, identity: &Identity, template: &[u8]) -> StorageResult<()>;

    /// Delete a template. The roster entry and ledger history are kept.
    ///
    /// Fails with `NotFound` if the identity has no template.
    async fn remove(&self, identity: &Identity) -> StorageResult<()>;

    /// Number of stored templates.
    async fn count(&self) -> StorageResult<i64>;
}

/// SQLite implementation of TemplateStore
#[derive(Debug, Clone)]
pub struct SqliteTemplateStore {
    pool: SqlitePool,
}

impl SqliteTemplateStore {
    /// Create a new SQLite template store
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl TemplateStore for SqliteTemplateStore {
    async fn load_all(&self) -> StorageResult<BTreeMap<Identity, Vec<u8>>> {
        let rows: Vec<(String, Vec<u8>)> =
            sqlx::query_as("SELECT identity, data FROM templates ORDER BY identity")
                .fetch_all(&self.pool)
                .await?;

        let mut templates = BTreeMap::new();
        for (identity, data) in rows {
            templates.insert(Identity::new(&identity)?, data);
        }

        debug!(count = templates.len(), "Loaded templates");
        Ok(templates)
    }

    async fn find(&self, identity: &Identity) -> StorageResult<Option<Vec<u8>>> {
        let row: Option<(Vec<u8>,)> = sqlx::query_as("SELECT data FROM templates WHERE identity = ?")
            .bind(identity.as_str())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(data,)| data))
    }

    async fn add(&self, identity: &Identity, template: &[u8]) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;
        transaction::insert_template(&mut tx, identity, template).await?;
        tx.commit().await?;

        info!(%identity, "Template stored");
        Ok(())
    }

    async fn remove(&self, identity: &Identity) -> StorageResult<()> {
        let result = sqlx::query("DELETE FROM templates WHERE identity = ?")
            .bind(identity.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::not_found("Template", "identity", identity));
        }

        info!(%identity, "Template removed");
        Ok(())
    }

    async fn count(&self) -> StorageResult<i64> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM templates")
            .fetch_one(&self.pool)
            .await?;

        Ok(result.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Database;
    use crate::models::EnrollmentRequest;
    use crate::repositories::{SqliteStudentRepository, StudentRepository};

    fn id(s: &str) -> Identity {
        Identity::new(s).unwrap()
    }

    async fn setup_test_db() -> Database {
        Database::in_memory().await.unwrap()
    }

    /// Roster entry without going through enrollment
    async fn add_student(db: &Database, identity: &str) {
        sqlx::query("INSERT INTO students (identity, full_name) VALUES (?, 'Test')")
            .bind(identity)
            .execute(db.pool())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_enroll_then_load_round_trip() {
        let db = setup_test_db().await;
        let students = SqliteStudentRepository::new(db.pool().clone());
        let store = SqliteTemplateStore::new(db.pool().clone());

        let template = vec![0xDE, 0xAD, 0xBE, 0xEF];
        students
            .enroll(&EnrollmentRequest::student(id("X"), "Xavier", template.clone()))
            .await
            .unwrap();

        let cache = store.load_all().await.unwrap();
        assert_eq!(cache.get(&id("X")), Some(&template));
        assert_eq!(store.find(&id("X")).await.unwrap(), Some(template));
    }

    #[tokio::test]
    async fn test_add_duplicate_identity() {
        let db = setup_test_db().await;
        let store = SqliteTemplateStore::new(db.pool().clone());
        add_student(&db, "A").await;

        store.add(&id("A"), &[1]).await.unwrap();
        let err = store.add(&id("A"), &[2]).await.unwrap_err();

        assert!(matches!(err, StorageError::DuplicateIdentity(_)));
        assert_eq!(store.find(&id("A")).await.unwrap(), Some(vec![1]));
    }

    #[tokio::test]
    async fn test_add_requires_roster_entry() {
        let db = setup_test_db().await;
        let store = SqliteTemplateStore::new(db.pool().clone());

        let err = store.add(&id("GHOST"), &[1]).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_remove_keeps_student() {
        let db = setup_test_db().await;
        let store = SqliteTemplateStore::new(db.pool().clone());
        let students = SqliteStudentRepository::new(db.pool().clone());
        add_student(&db, "B").await;
        store.add(&id("B"), &[1]).await.unwrap();

        store.remove(&id("B")).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 0);
        assert!(students.exists(&id("B")).await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_missing_template_fails() {
        let db = setup_test_db().await;
        let store = SqliteTemplateStore::new(db.pool().clone());

        let err = store.remove(&id("NOBODY")).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_load_all_sorted() {
        let db = setup_test_db().await;
        let store = SqliteTemplateStore::new(db.pool().clone());
        for name in ["C", "A", "B"] {
            add_student(&db, name).await;
            store.add(&id(name), name.as_bytes()).await.unwrap();
        }

        let keys: Vec<String> = store
            .load_all()
            .await
            .unwrap()
            .into_keys()
            .map(String::from)
            .collect();
        assert_eq!(keys, vec!["A", "B", "C"]);
    }
}
