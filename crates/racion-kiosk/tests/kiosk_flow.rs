//! End-to-end kiosk tests over an in-memory database and the mock sensor.
//!
//! Run with: cargo test --package racion-kiosk --test kiosk_flow

use chrono::{DateTime, FixedOffset, TimeZone};
use racion_core::Identity;
use racion_hardware::mock::{MockSensor, MockSensorHandle};
use racion_hardware::{DeviceWorker, InitError};
use racion_kiosk::{
    ErrorCode, Kiosk, KioskCommand, KioskError, KioskEvent, KioskSettings, KioskStatus,
    TicketStatus,
};
use racion_storage::{
    ConfigRepository, Database, EnrollmentRequest, StorageError, StudentRepository,
    TerminalConfig,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::{mpsc, watch};

fn at(hour: u32, minute: u32) -> DateTime<FixedOffset> {
    FixedOffset::west_opt(3 * 3600)
        .unwrap()
        .with_ymd_and_hms(2025, 3, 14, hour, minute, 0)
        .unwrap()
}

fn settings() -> KioskSettings {
    KioskSettings::default()
        .scan_timeout(Duration::from_millis(200))
        .capture_timeout(Duration::from_millis(300))
        .poll_interval(Duration::from_millis(10))
        .cooldown(Duration::from_millis(20))
}

async fn database() -> Database {
    let db = Database::in_memory().await.unwrap();
    db.config().save(&TerminalConfig::new("TOTEM-01")).await.unwrap();
    db.students()
        .enroll(
            &EnrollmentRequest::student(Identity::new("123").unwrap(), "Ana Rojas", b"ana".to_vec())
                .with_course("3B"),
        )
        .await
        .unwrap();
    db
}

fn worker(settings: &KioskSettings, handle: &MockSensorHandle) -> Arc<DeviceWorker> {
    let sensor_handle = handle.clone();
    Arc::new(DeviceWorker::new(settings.worker_config(), move || {
        sensor_handle.sensor()
    }))
}

async fn kiosk_at(hour: u32) -> (Kiosk, UnboundedReceiver<KioskEvent>, MockSensorHandle) {
    let settings = settings();
    let (_sensor, handle) = MockSensor::new();
    let worker = worker(&settings, &handle);

    let (kiosk, events) = Kiosk::with_database(settings, database().await, worker)
        .await
        .unwrap();
    let kiosk = kiosk
        .with_clock(move || at(hour, 0))
        .with_emulator(handle.clone());
    (kiosk, events, handle)
}

fn drain(events: &mut UnboundedReceiver<KioskEvent>) -> Vec<KioskEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

fn ticket_status(event: &KioskEvent) -> TicketStatus {
    match event {
        KioskEvent::Ticket { status, .. } => *status,
        other => panic!("expected ticket, got {other:?}"),
    }
}

#[tokio::test]
async fn test_open_reports_ready_and_loads_cache() {
    let (kiosk, mut events, handle) = kiosk_at(9).await;

    assert_eq!(
        drain(&mut events),
        vec![KioskEvent::status(KioskStatus::Ready)]
    );
    assert_eq!(kiosk.cache().len(), 1);
    assert_eq!(kiosk.terminal().terminal_id, "TOTEM-01");
    assert_eq!(handle.open_count(), 1);

    kiosk.shutdown().await;
    assert_eq!(handle.close_count(), 1);
}

#[tokio::test]
async fn test_missing_configuration_is_fatal() {
    let settings = settings();
    let (_sensor, handle) = MockSensor::new();
    let db = Database::in_memory().await.unwrap();

    let err = Kiosk::with_database(settings.clone(), db, worker(&settings, &handle))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        KioskError::Storage(StorageError::MissingConfiguration(_))
    ));
    // The reader is never touched without a configuration
    assert_eq!(handle.open_count(), 0);
}

#[tokio::test]
async fn test_breakfast_then_double() {
    let (kiosk, mut events, handle) = kiosk_at(9).await;

    handle.queue_capture(b"ana".to_vec());
    let first = kiosk.serve_once().await.unwrap();
    match &first {
        KioskEvent::Ticket { status, data } => {
            assert_eq!(*status, TicketStatus::Approved);
            assert_eq!(data.run, "123");
            assert_eq!(data.nombre.as_deref(), Some("Ana Rojas"));
            assert_eq!(data.curso.as_deref(), Some("3B"));
            assert_eq!(data.racion.as_deref(), Some("Desayuno"));
            assert_eq!(data.mensaje, "Racion autorizada");
        }
        other => panic!("expected ticket, got {other:?}"),
    }

    handle.queue_capture(b"ana".to_vec());
    let second = kiosk.serve_once().await.unwrap();
    assert_eq!(ticket_status(&second), TicketStatus::RejectedDouble);

    assert_eq!(kiosk.pending().await.unwrap().len(), 1);
    assert!(drain(&mut events).contains(&KioskEvent::status(KioskStatus::ProcessingFinger)));
    kiosk.shutdown().await;
}

#[tokio::test]
async fn test_outside_hours_ticket() {
    let (kiosk, _events, handle) = kiosk_at(5).await;

    handle.queue_capture(b"ana".to_vec());
    let event = kiosk.serve_once().await.unwrap();

    assert_eq!(ticket_status(&event), TicketStatus::RejectedTime);
    assert!(kiosk.recent().await.unwrap().is_empty());
    kiosk.shutdown().await;
}

#[tokio::test]
async fn test_unknown_finger_and_empty_sensor() {
    let (kiosk, _events, handle) = kiosk_at(13).await;

    handle.queue_capture(b"stranger".to_vec());
    assert_eq!(kiosk.serve_once().await, Some(KioskEvent::NoMatch));

    // No finger within the scan timeout
    assert_eq!(kiosk.serve_once().await, None);
    kiosk.shutdown().await;
}

#[tokio::test]
async fn test_degraded_reader_keeps_kiosk_up() {
    let settings = settings();
    let (_sensor, handle) = MockSensor::new();
    handle.fail_open(InitError::device_not_found("usb:1-1"));

    let (kiosk, mut events) =
        Kiosk::with_database(settings.clone(), database().await, worker(&settings, &handle))
            .await
            .unwrap();

    assert_eq!(
        drain(&mut events),
        vec![KioskEvent::status(KioskStatus::DeviceUnavailable)]
    );
    assert_eq!(
        kiosk.serve_once().await,
        Some(KioskEvent::status(KioskStatus::DeviceUnavailable))
    );

    // Ledger commands still work
    assert_eq!(
        kiosk.handle_command(KioskCommand::GetRecent).await,
        KioskEvent::RecentData { data: vec![] }
    );
    kiosk.shutdown().await;
}

#[tokio::test]
async fn test_enroll_command_makes_finger_usable() {
    let (kiosk, mut events, handle) = kiosk_at(13).await;
    drain(&mut events);

    handle.queue_capture(b"ben".to_vec());
    let result = kiosk
        .handle_command(KioskCommand::Enroll {
            run: "456".to_string(),
            nombre: "Ben Soto".to_string(),
            curso: Some("2A".to_string()),
        })
        .await;

    assert_eq!(result, KioskEvent::status(KioskStatus::EnrollSuccess));
    assert_eq!(
        drain(&mut events),
        vec![KioskEvent::status(KioskStatus::PlaceFingerEnroll)]
    );
    assert!(kiosk.cache().contains(&Identity::new("456").unwrap()));

    handle.queue_capture(b"ben".to_vec());
    let event = kiosk.serve_once().await.unwrap();
    assert_eq!(ticket_status(&event), TicketStatus::Approved);
    kiosk.shutdown().await;
}

#[tokio::test]
async fn test_enroll_failures() {
    let (kiosk, _events, _handle) = kiosk_at(13).await;

    let enroll = |run: &str, nombre: &str| KioskCommand::Enroll {
        run: run.to_string(),
        nombre: nombre.to_string(),
        curso: None,
    };

    assert_eq!(
        kiosk.handle_command(enroll("123", "Ana Again")).await,
        KioskEvent::error(ErrorCode::AlreadyEnrolled)
    );
    assert_eq!(
        kiosk.handle_command(enroll("", "Nobody")).await,
        KioskEvent::error(ErrorCode::InvalidRun)
    );
    assert_eq!(
        kiosk.handle_command(enroll("789", "  ")).await,
        KioskEvent::error(ErrorCode::MissingName)
    );
    // No finger before the capture timeout
    assert_eq!(
        kiosk.handle_command(enroll("789", "Carla")).await,
        KioskEvent::error(ErrorCode::EnrollTimeout)
    );
    kiosk.shutdown().await;
}

#[tokio::test]
async fn test_sync_commands() {
    let (kiosk, _events, handle) = kiosk_at(13).await;
    handle.queue_capture(b"ana".to_vec());
    kiosk.serve_once().await.unwrap();

    let KioskEvent::SyncData { data } = kiosk.handle_command(KioskCommand::GetUnsynced).await else {
        panic!("expected sync data");
    };
    assert_eq!(data.len(), 1);
    assert_eq!(data[0].run, "123");
    assert_eq!(data[0].fecha, "2025-03-14");
    assert_eq!(data[0].tipo, 2);

    assert_eq!(
        kiosk
            .handle_command(KioskCommand::MarkSynced { ids: vec![data[0].id] })
            .await,
        KioskEvent::status(KioskStatus::SyncMarkedOk)
    );
    assert_eq!(
        kiosk.handle_command(KioskCommand::GetUnsynced).await,
        KioskEvent::SyncData { data: vec![] }
    );

    let KioskEvent::Stats { data } = kiosk.handle_command(KioskCommand::Stats).await else {
        panic!("expected stats");
    };
    assert_eq!((data.desayunos, data.almuerzos, data.total), (0, 1, 1));
    kiosk.shutdown().await;
}

#[tokio::test]
async fn test_remove_template_stops_identification() {
    let (kiosk, _events, handle) = kiosk_at(13).await;
    let ana = Identity::new("123").unwrap();

    kiosk.remove_template(&ana).await.unwrap();
    assert!(!kiosk.cache().contains(&ana));

    handle.queue_capture(b"ana".to_vec());
    assert_eq!(kiosk.serve_once().await, Some(KioskEvent::NoMatch));
    kiosk.shutdown().await;
}

#[tokio::test]
async fn test_touch_requires_emulator() {
    let settings = settings();
    let (_sensor, handle) = MockSensor::new();
    let (kiosk, _events) =
        Kiosk::with_database(settings.clone(), database().await, worker(&settings, &handle))
            .await
            .unwrap();

    assert_eq!(
        kiosk
            .handle_command(KioskCommand::Touch {
                template: "ana".to_string()
            })
            .await,
        KioskEvent::error(ErrorCode::NotEmulated)
    );
    kiosk.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_run_loop_serves_commands_and_fingers() {
    let (kiosk, mut events, _handle) = kiosk_at(13).await;
    let kiosk = Arc::new(kiosk);
    drain(&mut events);

    let (commands_tx, commands) = mpsc::unbounded_channel();
    let (_shutdown_tx, shutdown) = watch::channel(false);

    commands_tx
        .send(KioskCommand::Touch {
            template: "ana".to_string(),
        })
        .unwrap();

    let runner = {
        let kiosk = Arc::clone(&kiosk);
        tokio::spawn(async move { kiosk.run(commands, shutdown).await })
    };

    // Wait for the ticket produced by the touch
    let ticket = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Some(event @ KioskEvent::Ticket { .. }) => break event,
                Some(_) => continue,
                None => panic!("event channel closed"),
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(ticket_status(&ticket), TicketStatus::Approved);

    commands_tx.send(KioskCommand::Stop).unwrap();
    tokio::time::timeout(Duration::from_secs(5), runner)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    kiosk.shutdown().await;
    kiosk.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_signal_stops_loop() {
    let (kiosk, _events, _handle) = kiosk_at(13).await;
    let kiosk = Arc::new(kiosk);

    let (_commands_tx, commands) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown) = watch::channel(false);

    let runner = {
        let kiosk = Arc::clone(&kiosk);
        tokio::spawn(async move { kiosk.run(commands, shutdown).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown_tx.send(true).unwrap();

    tokio::time::timeout(Duration::from_secs(5), runner)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    kiosk.shutdown().await;
}
