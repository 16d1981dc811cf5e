pub mod config;
pub mod ledger;
pub mod student;
pub mod template;

pub use config::{ConfigRepository, SqliteConfigRepository};
pub use ledger::{RationLedger, SqliteRationLedger};
pub use student::{SqliteStudentRepository, StudentRepository};
pub use template::{SqliteTemplateStore, TemplateStore};
