use crate::{Result, constants::MAX_IDENTITY_LEN, error::Error};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of an enrolled person (national ID body).
///
/// The value is normalized (trimmed and uppercased) before validation, so
/// `" 12345k "` and `"12345K"` denote the same person. Identities order
/// lexicographically, which fixes the iteration order of template maps.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    /// Create a new identity with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidIdentity` if:
    /// - The identity is empty after trimming
    /// - It is longer than [`MAX_IDENTITY_LEN`] characters
    /// - It contains non-ASCII, whitespace or control characters
    pub fn new(value: &str) -> Result<Self> {
        let value = value.trim().to_uppercase();

        if value.is_empty() {
            return Err(Error::InvalidIdentity("identity is empty".to_string()));
        }

        let len = value.len();
        if len > MAX_IDENTITY_LEN {
            return Err(Error::InvalidIdentity(format!(
                "identity must be at most {MAX_IDENTITY_LEN} chars, got {len}"
            )));
        }

        if !value.chars().all(|c| c.is_ascii_graphic()) {
            return Err(Error::InvalidIdentity(format!(
                "identity must be printable ASCII without spaces: {value:?}"
            )));
        }

        Ok(Identity(value))
    }

    /// Get the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Identity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Identity::new(s)
    }
}

impl TryFrom<String> for Identity {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Identity::new(&value)
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.0
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Meal service category, persisted as an integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(i32)]
pub enum RationType {
    /// Morning service
    Breakfast = 1,
    /// Midday service
    Lunch = 2,
}

impl RationType {
    /// All ration types in service order.
    pub const ALL: [RationType; 2] = [RationType::Breakfast, RationType::Lunch];

    /// Parse from the persisted integer code.
    pub fn from_i32(code: i32) -> Result<Self> {
        match code {
            1 => Ok(RationType::Breakfast),
            2 => Ok(RationType::Lunch),
            _ => Err(Error::InvalidRationType(code.into())),
        }
    }

    /// Integer code stored in the ledger.
    #[must_use]
    pub fn to_i32(self) -> i32 {
        self as i32
    }

    /// Name printed on tickets and shown on the kiosk screen.
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            RationType::Breakfast => "Desayuno",
            RationType::Lunch => "Almuerzo",
        }
    }
}

impl fmt::Display for RationType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Synchronization state of a ledger row with the central server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(i32)]
pub enum SyncState {
    /// Recorded locally, not yet uploaded
    #[default]
    Pending = 0,
    /// Acknowledged by the central server
    Synced = 1,
}

impl SyncState {
    /// Parse from the persisted integer code.
    pub fn from_i32(code: i32) -> Result<Self> {
        match code {
            0 => Ok(SyncState::Pending),
            1 => Ok(SyncState::Synced),
            _ => Err(Error::InvalidSyncState(code.into())),
        }
    }

    #[must_use]
    pub fn to_i32(self) -> i32 {
        self as i32
    }
}

/// Role of a roster member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(i32)]
pub enum Role {
    Administrator = 1,
    Operator = 2,
    #[default]
    Student = 3,
}

impl Role {
    /// Parse from the persisted integer code.
    pub fn from_i32(code: i32) -> Result<Self> {
        match code {
            1 => Ok(Role::Administrator),
            2 => Ok(Role::Operator),
            3 => Ok(Role::Student),
            _ => Err(Error::InvalidRole(code.into())),
        }
    }

    #[must_use]
    pub fn to_i32(self) -> i32 {
        self as i32
    }

    /// Whether this role may run roster and sync commands.
    #[must_use]
    pub fn is_staff(self) -> bool {
        matches!(self, Role::Administrator | Role::Operator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("12345678", "12345678")]
    #[case(" 12345678 ", "12345678")]
    #[case("7654321k", "7654321K")]
    #[case("ADMIN-01", "ADMIN-01")]
    fn test_identity_valid(#[case] input: &str, #[case] expected: &str) {
        let identity = Identity::new(input).unwrap();
        assert_eq!(identity.as_str(), expected);
        assert_eq!(identity.to_string(), expected);
    }

    #[rstest]
    #[case("")] // empty
    #[case("   ")] // blank
    #[case("123 456")] // inner whitespace
    #[case("123456789012345678901234567890123")] // too long
    #[case("ñandú")] // non-ASCII
    fn test_identity_invalid(#[case] input: &str) {
        let result: Result<Identity> = input.parse();
        assert!(matches!(result, Err(Error::InvalidIdentity(_))));
    }

    #[test]
    fn test_identity_serde_validates() {
        let identity: Identity = serde_json::from_str("\" 1234k \"").unwrap();
        assert_eq!(serde_json::to_string(&identity).unwrap(), "\"1234K\"");
        assert!(serde_json::from_str::<Identity>("\"\"").is_err());
    }

    #[test]
    fn test_identity_ordering_is_lexicographic() {
        let mut ids: Vec<Identity> = ["B", "A", "C"]
            .into_iter()
            .map(|s| Identity::new(s).unwrap())
            .collect();
        ids.sort();
        let sorted: Vec<&str> = ids.iter().map(Identity::as_str).collect();
        assert_eq!(sorted, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_ration_type_codes() {
        assert_eq!(RationType::from_i32(1).unwrap(), RationType::Breakfast);
        assert_eq!(RationType::from_i32(2).unwrap(), RationType::Lunch);
        assert_eq!(
            RationType::from_i32(0).unwrap_err(),
            Error::InvalidRationType(0)
        );

        assert_eq!(RationType::Lunch.to_i32(), 2);
        assert_eq!(RationType::Breakfast.display_name(), "Desayuno");
        assert_eq!(RationType::Lunch.to_string(), "Almuerzo");
    }

    #[test]
    fn test_sync_state_codes() {
        assert_eq!(SyncState::default(), SyncState::Pending);
        assert_eq!(SyncState::from_i32(1).unwrap(), SyncState::Synced);
        assert!(SyncState::from_i32(2).is_err());
        assert_eq!(SyncState::Synced.to_i32(), 1);
    }

    #[rstest]
    #[case(1, Role::Administrator, true)]
    #[case(2, Role::Operator, true)]
    #[case(3, Role::Student, false)]
    fn test_role_codes(#[case] code: i32, #[case] role: Role, #[case] staff: bool) {
        assert_eq!(Role::from_i32(code).unwrap(), role);
        assert_eq!(role.to_i32(), code);
        assert_eq!(role.is_staff(), staff);
    }

    #[test]
    fn test_role_invalid() {
        assert!(Role::from_i32(0).is_err());
        assert_eq!(Role::default(), Role::Student);
    }
}
