//! Ration kiosk runtime.
//!
//! Wires the fingerprint [`DeviceWorker`](racion_hardware::DeviceWorker), the
//! identification engine and the ration ledger into one [`Kiosk`], and
//! speaks a JSON-lines protocol ([`KioskEvent`] out, [`KioskCommand`] in)
//! with whatever front end drives it.
//!
//! # Example
//!
//! ```no_run
//! use racion_hardware::DeviceWorker;
//! use racion_hardware::mock::MockSensor;
//! use racion_kiosk::{Kiosk, KioskSettings};
//! use std::sync::Arc;
//! use tokio::sync::{mpsc, watch};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = KioskSettings::from_env()?;
//! let (_sensor, handle) = MockSensor::new();
//! let worker = Arc::new(DeviceWorker::new(settings.worker_config(), move || handle.sensor()));
//!
//! let (kiosk, mut events) = Kiosk::open(settings, worker).await?;
//! tokio::spawn(async move {
//!     while let Some(event) = events.recv().await {
//!         println!("{}", event.to_line().unwrap_or_default());
//!     }
//! });
//!
//! let (_commands_tx, commands) = mpsc::unbounded_channel();
//! let (_shutdown_tx, shutdown) = watch::channel(false);
//! kiosk.run(commands, shutdown).await?;
//! kiosk.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod events;
pub mod kiosk;
pub mod settings;

pub use error::{KioskError, Result};
pub use events::{
    ErrorCode, EventRecord, KioskCommand, KioskEvent, KioskStatus, StatsData, TicketData,
    TicketStatus,
};
pub use kiosk::{Clock, Kiosk};
pub use settings::KioskSettings;
