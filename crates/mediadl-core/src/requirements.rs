//! External preconditions gating the DOWNLOADING state.
//!
//! The engine never probes the OS itself. A platform collaborator reports the
//! currently met set and the engine compares it to the configured required set.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Conditions that must hold for a job to transfer bytes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[repr(transparent)]
    pub struct Requirements: u32 {
        /// Any network connection.
        const NETWORK                = 0b0000_0001;
        /// An unmetered network connection.
        const NETWORK_UNMETERED      = 0b0000_0010;
        /// The device is charging.
        const DEVICE_CHARGING        = 0b0000_0100;
        /// The device is idle.
        const DEVICE_IDLE            = 0b0000_1000;
        /// Storage is not low.
        const DEVICE_STORAGE_NOT_LOW = 0b0001_0000;
    }
}

impl Default for Requirements {
    fn default() -> Self {
        Self::NETWORK
    }
}

impl Serialize for Requirements {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.bits().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Requirements {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bits = u32::deserialize(deserializer)?;
        Ok(Self::from_bits_truncate(bits))
    }
}

impl Requirements {
    /// The subset of `self` (required) that `met` does not satisfy.
    ///
    /// An unmetered connection implies a connection.
    #[must_use]
    pub fn not_met(self, met: Self) -> Self {
        let mut met = met;
        if met.contains(Self::NETWORK_UNMETERED) {
            met |= Self::NETWORK;
        }
        self.difference(met)
    }

    /// Human-readable flag names, e.g. for a foreground indicator.
    #[must_use]
    pub fn describe(self) -> Vec<&'static str> {
        self.iter_names().map(|(name, _)| name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_met_difference() {
        let required = Requirements::NETWORK | Requirements::DEVICE_CHARGING;
        assert_eq!(required.not_met(required), Requirements::empty());
        assert_eq!(
            required.not_met(Requirements::NETWORK),
            Requirements::DEVICE_CHARGING
        );
        assert_eq!(required.not_met(Requirements::empty()), required);
    }

    #[test]
    fn test_unmetered_implies_network() {
        assert!(
            Requirements::NETWORK
                .not_met(Requirements::NETWORK_UNMETERED)
                .is_empty()
        );
        assert_eq!(
            Requirements::NETWORK_UNMETERED.not_met(Requirements::NETWORK),
            Requirements::NETWORK_UNMETERED
        );
    }

    #[test]
    fn test_serde_as_bits() {
        let flags = Requirements::NETWORK | Requirements::DEVICE_IDLE;
        let json = serde_json::to_string(&flags).unwrap();
        assert_eq!(json, "9");
        let parsed: Requirements = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, flags);
        assert_eq!(flags.describe(), vec!["NETWORK", "DEVICE_IDLE"]);
    }
}
