//! Network interface identifier.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

/// Identifier of a network interface (NIC) attached to the stack.
///
/// Zero is reserved as "no interface" by the surrounding stack and is
/// rejected here, so every `InterfaceId` names a real interface.
///
/// # Examples
///
/// ```
/// use mfwd_types::InterfaceId;
///
/// let nic = InterfaceId::new(2).unwrap();
/// assert_eq!(nic.get(), 2);
///
/// assert!(InterfaceId::new(0).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct InterfaceId(NonZeroU32);

impl InterfaceId {
    /// Creates a new interface ID.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` is zero.
    pub fn new(id: u32) -> Result<Self, ParseError> {
        NonZeroU32::new(id)
            .map(InterfaceId)
            .ok_or_else(|| ParseError::InvalidInterfaceId(id.to_string()))
    }

    /// Returns the raw identifier.
    pub const fn get(&self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "nic{}", self.0)
    }
}

impl FromStr for InterfaceId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Handle "nic2" format
        let id_str = s.strip_prefix("nic").unwrap_or(s);

        let id: u32 = id_str
            .parse()
            .map_err(|_| ParseError::InvalidInterfaceId(s.to_string()))?;

        InterfaceId::new(id).map_err(|_| ParseError::InvalidInterfaceId(s.to_string()))
    }
}

impl TryFrom<u32> for InterfaceId {
    type Error = ParseError;

    fn try_from(id: u32) -> Result<Self, Self::Error> {
        InterfaceId::new(id)
    }
}

impl From<InterfaceId> for u32 {
    fn from(id: InterfaceId) -> Self {
        id.get()
    }
}

impl From<NonZeroU32> for InterfaceId {
    fn from(id: NonZeroU32) -> Self {
        InterfaceId(id)
    }
}
