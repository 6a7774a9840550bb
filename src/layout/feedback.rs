//! Feedback sensors: track occupancy contacts reported by the control bus.

use core::fmt;

use super::FeedbackId;

/// Hardware address of a feedback contact.
///
/// Feedback modules (S88 chains and similar) are addressed by a device id
/// and a contact number on that device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FeedbackAddress {
    /// Feedback module / device id.
    pub device: u16,
    /// Contact number on the device.
    pub contact: u16,
}

impl FeedbackAddress {
    /// Creates an address from device and contact numbers.
    pub fn new(device: u16, contact: u16) -> Self {
        Self { device, contact }
    }
}

impl fmt::Display for FeedbackAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.device, self.contact)
    }
}

/// An occupancy sensor. The control bus asynchronously flips `detected`.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Feedback {
    /// Stable identifier.
    pub id: FeedbackId,
    /// Human-readable name.
    pub name: String,
    /// Stable hardware address.
    pub address: FeedbackAddress,
    /// Whether the contact currently detects a train. Runtime state.
    #[cfg_attr(feature = "serde", serde(default))]
    pub detected: bool,
}

impl Feedback {
    /// Creates an undetected feedback.
    pub fn new(
        id: impl Into<FeedbackId>,
        name: impl Into<String>,
        address: FeedbackAddress,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            address,
            detected: false,
        }
    }
}
