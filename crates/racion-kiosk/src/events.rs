//! JSON-lines protocol between the kiosk and its front end.
//!
//! The kiosk writes one [`KioskEvent`] per line on stdout and reads one
//! [`KioskCommand`] per line on stdin.
//!
//! ```text
//! <- {"type":"status","status":"ready"}
//! <- {"type":"ticket","status":"approved","data":{"run":"12345678","nombre":"Ana Rojas","curso":"3B","racion":"Almuerzo","mensaje":"Racion autorizada"}}
//! -> {"cmd":"get_unsynced"}
//! <- {"type":"sync_data","data":[{"id":1,"run":"12345678","fecha":"2025-03-14","tipo":2,"hora":1741968000000,"terminal":"TOTEM-01"}]}
//! -> {"cmd":"mark_synced","ids":[1]}
//! <- {"type":"status","status":"sync_marked_ok"}
//! ```

use chrono::NaiveDate;
use racion_core::constants::SERVICE_DATE_FORMAT;
use racion_storage::{DailyCounts, RationEvent};
use serde::{Deserialize, Serialize};

/// Outcome of a ticket request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Approved,
    RejectedDouble,
    RejectedTime,
    RejectedUnknown,
}

/// Person and ration shown on the ticket screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketData {
    pub run: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nombre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curso: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub racion: Option<String>,
    pub mensaje: String,
}

/// Kiosk and reader states reported to the front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KioskStatus {
    Ready,
    DeviceUnavailable,
    ProcessingFinger,
    PlaceFingerEnroll,
    EnrollSuccess,
    SyncMarkedOk,
    TouchQueued,
    Stopped,
}

/// Machine-readable failure codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    DbError,
    DbSaveFailed,
    InvalidCommand,
    InvalidRun,
    MissingName,
    AlreadyEnrolled,
    EnrollTimeout,
    SensorError,
    SyncMarkFailed,
    NotEmulated,
}

/// One ledger row as sent to the front end or the sync service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: i64,
    pub run: String,
    /// Service date, `YYYY-MM-DD`
    pub fecha: String,
    /// Ration type code (1 breakfast, 2 lunch)
    pub tipo: i32,
    /// Event time, Unix milliseconds
    pub hora: i64,
    pub terminal: String,
}

impl From<&RationEvent> for EventRecord {
    fn from(event: &RationEvent) -> Self {
        Self {
            id: event.id,
            run: event.identity.to_string(),
            fecha: format_date(event.service_date),
            tipo: event.ration_type.to_i32(),
            hora: event.event_time.timestamp_millis(),
            terminal: event.terminal_id.clone(),
        }
    }
}

/// Rations served on one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsData {
    pub fecha: String,
    pub desayunos: i64,
    pub almuerzos: i64,
    pub total: i64,
}

impl From<DailyCounts> for StatsData {
    fn from(counts: DailyCounts) -> Self {
        Self {
            fecha: format_date(counts.service_date),
            desayunos: counts.breakfasts,
            almuerzos: counts.lunches,
            total: counts.total(),
        }
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format(SERVICE_DATE_FORMAT).to_string()
}

/// Line written by the kiosk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KioskEvent {
    Ticket {
        status: TicketStatus,
        data: TicketData,
    },
    /// A finger was read but matched nobody
    NoMatch,
    Status {
        status: KioskStatus,
    },
    Error {
        error: ErrorCode,
    },
    RecentData {
        data: Vec<EventRecord>,
    },
    SyncData {
        data: Vec<EventRecord>,
    },
    Stats {
        data: StatsData,
    },
}

impl KioskEvent {
    pub fn status(status: KioskStatus) -> Self {
        KioskEvent::Status { status }
    }

    pub fn error(error: ErrorCode) -> Self {
        KioskEvent::Error { error }
    }

    /// Whether the event followed a finger on the sensor, which starts the cooldown.
    pub fn is_finger_read(&self) -> bool {
        matches!(self, KioskEvent::Ticket { .. } | KioskEvent::NoMatch)
    }

    /// Encode as one protocol line, without the trailing newline.
    pub fn to_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Line read by the kiosk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum KioskCommand {
    /// Capture a fresh template and enroll a student
    Enroll {
        run: String,
        nombre: String,
        #[serde(default)]
        curso: Option<String>,
    },
    GetRecent,
    GetUnsynced,
    MarkSynced {
        ids: Vec<i64>,
    },
    Stats,
    /// Emulated sensor only: queue a capture of these bytes
    Touch {
        template: String,
    },
    Stop,
}

impl KioskCommand {
    /// Parse one protocol line.
    pub fn parse(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use racion_core::{Identity, RationType, SyncState};
    use serde_json::json;

    #[test]
    fn test_ticket_wire_format() {
        let event = KioskEvent::Ticket {
            status: TicketStatus::RejectedTime,
            data: TicketData {
                run: "123".to_string(),
                nombre: Some("Ana".to_string()),
                curso: None,
                racion: None,
                mensaje: "Fuera de horario de servicio".to_string(),
            },
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "ticket",
                "status": "rejected_time",
                "data": {"run": "123", "nombre": "Ana", "mensaje": "Fuera de horario de servicio"}
            })
        );
    }

    #[test]
    fn test_simple_events() {
        assert_eq!(KioskEvent::NoMatch.to_line().unwrap(), r#"{"type":"no_match"}"#);
        assert_eq!(
            KioskEvent::status(KioskStatus::DeviceUnavailable).to_line().unwrap(),
            r#"{"type":"status","status":"device_unavailable"}"#
        );
        assert_eq!(
            KioskEvent::error(ErrorCode::DbSaveFailed).to_line().unwrap(),
            r#"{"type":"error","error":"db_save_failed"}"#
        );
    }

    #[test]
    fn test_event_record_from_ledger_row() {
        let event = RationEvent {
            id: 4,
            identity: Identity::new("123").unwrap(),
            service_date: NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
            ration_type: RationType::Lunch,
            terminal_id: "TOTEM-01".to_string(),
            event_time: Utc.timestamp_millis_opt(1_741_968_000_000).unwrap(),
            sync_state: SyncState::Pending,
        };

        let value = serde_json::to_value(KioskEvent::SyncData {
            data: vec![EventRecord::from(&event)],
        })
        .unwrap();
        assert_eq!(
            value,
            json!({
                "type": "sync_data",
                "data": [{"id": 4, "run": "123", "fecha": "2025-03-14", "tipo": 2, "hora": 1_741_968_000_000i64, "terminal": "TOTEM-01"}]
            })
        );
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            KioskCommand::parse(r#"{"cmd":"enroll","run":"123","nombre":"Ana"}"#).unwrap(),
            KioskCommand::Enroll {
                run: "123".to_string(),
                nombre: "Ana".to_string(),
                curso: None
            }
        );
        assert_eq!(
            KioskCommand::parse(r#"{"cmd":"mark_synced","ids":[1,2,3]}"#).unwrap(),
            KioskCommand::MarkSynced { ids: vec![1, 2, 3] }
        );
        assert_eq!(
            KioskCommand::parse("  {\"cmd\":\"get_recent\"}\n").unwrap(),
            KioskCommand::GetRecent
        );
        assert!(KioskCommand::parse(r#"{"cmd":"reboot"}"#).is_err());
        assert!(KioskCommand::parse(r#"{"cmd":"enroll","nombre":"Ana"}"#).is_err());
        assert!(KioskCommand::parse("not json").is_err());
    }

    #[test]
    fn test_cooldown_applies_to_finger_reads_only() {
        assert!(KioskEvent::NoMatch.is_finger_read());
        assert!(!KioskEvent::status(KioskStatus::Ready).is_finger_read());
    }
}
