use chrono::{DateTime, Utc};
use racion_core::{Identity, Role};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};
use subtle::ConstantTimeEq;

use super::decode_error;

/// Roster member: a person who may receive rations.
///
/// # Database Schema
///
/// Maps to the `students` table. The identity is the natural primary key;
/// the fingerprint template lives in the `templates` table and is deleted
/// with the student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    /// National ID body, primary key
    pub identity: Identity,

    /// Full name printed on the ticket
    pub full_name: String,

    /// Course or class, e.g. "1A"
    pub course: Option<String>,

    pub role: Role,

    /// Credential hash for staff logins; never serialized
    #[serde(skip_serializing, default)]
    pub password_hash: Option<String>,

    /// Record creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Student {
    /// Compare a presented credential hash against the stored one.
    ///
    /// Uses constant-time comparison. Students without a stored hash never
    /// verify.
    pub fn verify_password_hash(&self, candidate: &str) -> bool {
        match &self.password_hash {
            Some(stored) => stored.as_bytes().ct_eq(candidate.as_bytes()).into(),
            None => false,
        }
    }
}

impl<'r> FromRow<'r, SqliteRow> for Student {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let identity: String = row.try_get("identity")?;
        let role: i32 = row.try_get("role")?;

        Ok(Self {
            identity: Identity::new(&identity).map_err(decode_error)?,
            full_name: row.try_get("full_name")?,
            course: row.try_get("course")?,
            role: Role::from_i32(role).map_err(decode_error)?,
            password_hash: row.try_get("password_hash")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Everything needed to enroll one person in a single transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentRequest {
    pub identity: Identity,
    pub full_name: String,
    pub course: Option<String>,
    pub role: Role,
    /// Template bytes captured at enrollment
    pub template: Vec<u8>,
}

impl EnrollmentRequest {
    /// Enrollment of a student with the default role.
    pub fn student(identity: Identity, full_name: impl Into<String>, template: Vec<u8>) -> Self {
        Self {
            identity,
            full_name: full_name.into(),
            course: None,
            role: Role::Student,
            template,
        }
    }

    /// Set the course.
    pub fn with_course(mut self, course: impl Into<String>) -> Self {
        self.course = Some(course.into());
        self
    }

    /// Set the role.
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }
}

/// Administrator account created once by [`Database::bootstrap_admin`].
///
/// [`Database::bootstrap_admin`]: crate::Database::bootstrap_admin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminSeed {
    pub identity: Identity,
    pub full_name: String,
    pub password_hash: String,
}
