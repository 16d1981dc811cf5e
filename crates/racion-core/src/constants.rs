//! Core constants for the ration kiosk.
//!
//! This module centralizes the tuning values shared by the hardware worker,
//! the identification engine and the ration authority. Every value here is a
//! default: the kiosk settings layer may override the ones that are exposed
//! as configuration.
//!
//! # Usage
//!
//! ```
//! use racion_core::constants::*;
//! use std::time::Duration;
//!
//! let timeout = Duration::from_millis(DEFAULT_CAPTURE_TIMEOUT_MS);
//! assert!(timeout > Duration::from_millis(DEFAULT_POLL_INTERVAL_MS));
//! assert!(DEFAULT_MATCH_THRESHOLD > 0);
//! ```

// ============================================================================
// Identification
// ============================================================================

/// Minimum similarity score for a 1:N identification to be accepted.
///
/// Scores are on the vendor scale where higher means more similar. A best
/// match below this value is reported as no match.
///
/// # Examples
///
/// ```
/// use racion_core::constants::DEFAULT_MATCH_THRESHOLD;
///
/// let best_score = 72;
/// assert!(best_score >= DEFAULT_MATCH_THRESHOLD);
/// ```
pub const DEFAULT_MATCH_THRESHOLD: i32 = 60;

/// Stricter threshold for 1:1 verification against a claimed identity.
pub const DEFAULT_VERIFY_THRESHOLD: i32 = 65;

/// Score reported by a match operation that could not be carried out.
///
/// Returned when the worker is degraded, stopped, or the SDK failed while
/// comparing. Identification skips any negative score.
pub const MATCH_ERROR: i32 = -1;

// ============================================================================
// Capture
// ============================================================================

/// Default time a capture command waits for a finger, in milliseconds.
pub const DEFAULT_CAPTURE_TIMEOUT_MS: u64 = 3000;

/// Delay between two sensor polls while no finger is present, in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Maximum time `start()` waits for the worker thread to open the device.
///
/// When the device has not answered by then, the worker is left running in
/// the degraded state.
pub const DEFAULT_START_TIMEOUT_MS: u64 = 5000;

// ============================================================================
// Kiosk loop
// ============================================================================

/// Pause after an identification attempt so the same finger is not read twice.
pub const DEFAULT_COOLDOWN_MS: u64 = 2000;

/// Number of ledger rows returned by the "recent" query when no limit is given.
pub const DEFAULT_RECENT_LIMIT: i64 = 100;

// ============================================================================
// Identity
// ============================================================================

/// Maximum identity length in characters.
///
/// National ID bodies are well below this; the limit only guards the
/// storage column against garbage input.
pub const MAX_IDENTITY_LEN: usize = 32;

/// Format of a service date as stored in the ledger.
///
/// # Examples
///
/// ```
/// use racion_core::constants::SERVICE_DATE_FORMAT;
/// use chrono::NaiveDate;
///
/// let date = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
/// assert_eq!(date.format(SERVICE_DATE_FORMAT).to_string(), "2025-03-14");
/// ```
pub const SERVICE_DATE_FORMAT: &str = "%Y-%m-%d";
