//! Kiosk screen messages
//!
//! All user-facing text shown at the kiosk, in Spanish. Messages stay ASCII
//! so they render on the ticket printer's built-in code page.
//!
//! # Usage
//!
//! ```
//! use racion_storage::messages::DisplayMessages;
//!
//! assert_eq!(DisplayMessages::RATION_APPROVED, "Racion autorizada");
//! ```

/// Display messages for ration decisions and reader state
pub struct DisplayMessages;

impl DisplayMessages {
    /// Ration issued and recorded
    pub const RATION_APPROVED: &'static str = "Racion autorizada";

    /// Same ration type already issued today
    pub const RATION_ALREADY_ISSUED: &'static str = "Racion ya entregada hoy";

    /// No service window covers the current hour
    pub const OUTSIDE_SERVICE_HOURS: &'static str = "Fuera de horario de servicio";

    /// Fingerprint matched an identity that is not on the roster
    pub const IDENTITY_NOT_ENROLLED: &'static str = "Huella no registrada";

    /// A finger was read but no template scored above the threshold
    pub const NO_MATCH: &'static str = "Huella no reconocida";

    /// Idle prompt
    pub const PLACE_FINGER: &'static str = "Coloque su dedo";

    /// The worker could not open the sensor
    pub const READER_UNAVAILABLE: &'static str = "Lector no disponible";

    /// The sensor reported a failure during capture
    pub const READER_ERROR: &'static str = "Error del lector, intente nuevamente";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_ascii_and_short() {
        let messages = [
            DisplayMessages::RATION_APPROVED,
            DisplayMessages::RATION_ALREADY_ISSUED,
            DisplayMessages::OUTSIDE_SERVICE_HOURS,
            DisplayMessages::IDENTITY_NOT_ENROLLED,
            DisplayMessages::NO_MATCH,
            DisplayMessages::PLACE_FINGER,
            DisplayMessages::READER_UNAVAILABLE,
            DisplayMessages::READER_ERROR,
        ];

        for message in messages {
            assert!(!message.is_empty());
            assert!(message.is_ascii(), "{message}");
            assert!(message.len() <= 40, "{message}");
        }
    }
}
