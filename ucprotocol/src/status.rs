//! Axis status bitfield
//!
//! The data word of the `STATUS` object encodes the axis state as a bit
//! field. Note there is no forward/backward limit distinction: the
//! controller only reports a combined "hump detected" condition.

use bitflags::bitflags;

bitflags! {
    /// States of an axis as reported by the `STATUS` object.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AxisStatus: i32 {
        /// Actor running.
        const RUNNING = 0x0001;
        /// Hump detected (obstruction / end of travel).
        const HUMP = 0x0002;
        /// Sensor error.
        const SENSOR_ERROR = 0x0100;
        /// Sensor disconnected.
        const SENSOR_DISCONNECTED = 0x0400;
        /// Reference position is valid.
        const REFERENCE_VALID = 0x0800;
        /// Sensor enabled.
        const SENSOR_ENABLED = 0x1000;
    }
}

impl AxisStatus {
    /// Decode a raw status word, preserving any bits this driver does not
    /// model.
    pub fn from_raw(raw: i32) -> Self {
        Self::from_bits_retain(raw)
    }

    pub fn running(self) -> bool {
        self.contains(Self::RUNNING)
    }

    pub fn hump(self) -> bool {
        self.contains(Self::HUMP)
    }

    pub fn reference_valid(self) -> bool {
        self.contains(Self::REFERENCE_VALID)
    }

    pub fn sensor_error(self) -> bool {
        self.contains(Self::SENSOR_ERROR)
    }

    pub fn sensor_disconnected(self) -> bool {
        self.contains(Self::SENSOR_DISCONNECTED)
    }

    pub fn sensor_enabled(self) -> bool {
        self.contains(Self::SENSOR_ENABLED)
    }
}
