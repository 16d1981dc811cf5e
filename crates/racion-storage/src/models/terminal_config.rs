use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};

/// Default serial port of the ticket printer.
pub const DEFAULT_PRINTER_PORT: &str = "COM3";

/// Singleton terminal configuration, stored in `terminal_config` (id = 1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TerminalConfig {
    /// Identifier written into every ledger row, e.g. "TOTEM-01"
    pub terminal_id: String,

    /// Serial port of the ticket printer
    pub printer_port: String,
}

impl TerminalConfig {
    pub fn new(terminal_id: impl Into<String>) -> Self {
        Self {
            terminal_id: terminal_id.into(),
            printer_port: DEFAULT_PRINTER_PORT.to_string(),
        }
    }

    /// Set the printer port.
    pub fn with_printer_port(mut self, port: impl Into<String>) -> Self {
        self.printer_port = port.into();
        self
    }

    /// Reject blank fields; the kiosk cannot start without both.
    pub fn validate(&self) -> StorageResult<()> {
        if self.terminal_id.trim().is_empty() {
            return Err(StorageError::MissingConfiguration(
                "terminal_id is empty".to_string(),
            ));
        }
        if self.printer_port.trim().is_empty() {
            return Err(StorageError::MissingConfiguration(
                "printer_port is empty".to_string(),
            ));
        }
        Ok(())
    }
}
