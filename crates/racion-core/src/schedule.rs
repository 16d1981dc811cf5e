//! Service windows mapping the hour of day to a ration type.

use crate::{Result, error::Error, types::RationType};
use chrono::{DateTime, NaiveDate, TimeZone, Timelike};
use serde::{Deserialize, Serialize};

/// Half-open hour range `[start_hour, end_hour)` during which one ration is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceWindow {
    pub start_hour: u32,
    pub end_hour: u32,
    pub ration: RationType,
}

impl ServiceWindow {
    /// Create a window, rejecting empty ranges and hours past midnight.
    pub fn new(start_hour: u32, end_hour: u32, ration: RationType) -> Result<Self> {
        let window = Self {
            start_hour,
            end_hour,
            ration,
        };
        window.validate()?;
        Ok(window)
    }

    fn validate(&self) -> Result<()> {
        if self.start_hour >= self.end_hour || self.end_hour > 24 {
            return Err(Error::InvalidServiceWindow {
                start: self.start_hour,
                end: self.end_hour,
                reason: "window must satisfy start < end <= 24".to_string(),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn contains(&self, hour: u32) -> bool {
        (self.start_hour..self.end_hour).contains(&hour)
    }

    fn overlaps(&self, other: &ServiceWindow) -> bool {
        self.start_hour < other.end_hour && other.start_hour < self.end_hour
    }
}

/// Daily service schedule.
///
/// The default schedule serves breakfast from 08:00 to 12:00 and lunch from
/// 12:00 until midnight. Hours not covered by any window are outside service
/// hours.
///
/// # Examples
///
/// ```
/// use racion_core::{RationType, ServiceSchedule};
///
/// let schedule = ServiceSchedule::default();
/// assert_eq!(schedule.ration_for(9), Some(RationType::Breakfast));
/// assert_eq!(schedule.ration_for(13), Some(RationType::Lunch));
/// assert_eq!(schedule.ration_for(5), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ServiceWindow>", into = "Vec<ServiceWindow>")]
pub struct ServiceSchedule {
    windows: Vec<ServiceWindow>,
}

impl ServiceSchedule {
    /// Build a schedule from non-overlapping windows.
    ///
    /// # Errors
    /// Returns `Error::InvalidServiceWindow` if:
    /// - No window is given
    /// - A window is empty or ends past midnight
    /// - Two windows overlap
    pub fn new(mut windows: Vec<ServiceWindow>) -> Result<Self> {
        if windows.is_empty() {
            return Err(Error::InvalidServiceWindow {
                start: 0,
                end: 0,
                reason: "schedule needs at least one window".to_string(),
            });
        }
        for window in &windows {
            window.validate()?;
        }

        windows.sort_by_key(|w| w.start_hour);
        for pair in windows.windows(2) {
            if pair[0].overlaps(&pair[1]) {
                return Err(Error::InvalidServiceWindow {
                    start: pair[1].start_hour,
                    end: pair[1].end_hour,
                    reason: format!(
                        "overlaps {}..{}",
                        pair[0].start_hour, pair[0].end_hour
                    ),
                });
            }
        }
        Ok(Self { windows })
    }

    /// Windows sorted by start hour.
    pub fn windows(&self) -> &[ServiceWindow] {
        &self.windows
    }

    /// Ration served at the given hour (0-23), if any.
    #[must_use]
    pub fn ration_for(&self, hour: u32) -> Option<RationType> {
        self.windows
            .iter()
            .find(|w| w.contains(hour))
            .map(|w| w.ration)
    }

    /// Ration type and service date for a local timestamp.
    ///
    /// The service date is the calendar day in the timestamp's own timezone.
    #[must_use]
    pub fn resolve<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Option<(RationType, NaiveDate)> {
        self.ration_for(now.hour())
            .map(|ration| (ration, now.date_naive()))
    }
}

impl TryFrom<Vec<ServiceWindow>> for ServiceSchedule {
    type Error = Error;

    fn try_from(windows: Vec<ServiceWindow>) -> Result<Self> {
        ServiceSchedule::new(windows)
    }
}

impl From<ServiceSchedule> for Vec<ServiceWindow> {
    fn from(schedule: ServiceSchedule) -> Self {
        schedule.windows
    }
}

impl Default for ServiceSchedule {
    fn default() -> Self {
        Self {
            windows: vec![
                ServiceWindow {
                    start_hour: 8,
                    end_hour: 12,
                    ration: RationType::Breakfast,
                },
                ServiceWindow {
                    start_hour: 12,
                    end_hour: 24,
                    ration: RationType::Lunch,
                },
            ],
        }
    }
}
