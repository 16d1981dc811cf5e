#![allow(async_fn_in_trait)]

use crate::error::StorageResult;
use crate::models::{EnrollmentRequest, Student};
use crate::transaction;
use racion_core::Identity;
use sqlx::SqlitePool;
use tracing::info;

/// Repository trait for the roster of people who may receive rations
///
/// Uses native async trait methods (Edition 2024), so no async-trait crate is
/// needed.
pub trait StudentRepository: Send + Sync {
    /// Enroll a person and their template atomically.
    ///
    /// Either both the roster entry and the template are written, or neither.
    async fn enroll(&self, request: &EnrollmentRequest) -> StorageResult<Student>;

    /// Find a roster entry by identity
    async fn find_by_identity(&self, identity: &Identity) -> StorageResult<Option<Student>>;

    /// All roster entries, sorted by identity
    async fn list(&self) -> StorageResult<Vec<Student>>;

    /// Check if an identity is on the roster
    async fn exists(&self, identity: &Identity) -> StorageResult<bool>;
}

/// SQLite implementation of StudentRepository
#[derive(Debug, Clone)]
pub struct SqliteStudentRepository {
    pool: SqlitePool,
}

impl SqliteStudentRepository {
    /// Create a new SQLite student repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const SELECT_STUDENT: &str = r#"
    SELECT identity, full_name, course, role, password_hash, created_at
    FROM students
"#;

impl StudentRepository for SqliteStudentRepository {
    async fn enroll(&self, request: &EnrollmentRequest) -> StorageResult<Student> {
        let mut tx = self.pool.begin().await?;
        transaction::insert_student(&mut tx, request).await?;
        transaction::insert_template(&mut tx, &request.identity, &request.template).await?;

        let student = sqlx::query_as::<_, Student>(&format!("{SELECT_STUDENT} WHERE identity = ?"))
            .bind(request.identity.as_str())
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(
            identity = %student.identity,
            role = ?student.role,
            template_len = request.template.len(),
            "Enrolled"
        );
        Ok(student)
    }

    async fn find_by_identity(&self, identity: &Identity) -> StorageResult<Option<Student>> {
        let student = sqlx::query_as::<_, Student>(&format!("{SELECT_STUDENT} WHERE identity = ?"))
            .bind(identity.as_str())
            .fetch_optional(&self.pool)
            .await?;

        Ok(student)
    }

    async fn list(&self) -> StorageResult<Vec<Student>> {
        let students = sqlx::query_as::<_, Student>(&format!("{SELECT_STUDENT} ORDER BY identity"))
            .fetch_all(&self.pool)
            .await?;

        Ok(students)
    }

    async fn exists(&self, identity: &Identity) -> StorageResult<bool> {
        let result: (i64,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM students WHERE identity = ?)")
                .bind(identity.as_str())
                .fetch_one(&self.pool)
                .await?;

        Ok(result.0 != 0)
    }
}
