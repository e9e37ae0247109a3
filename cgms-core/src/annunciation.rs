//! Sensor Status Annunciation
//!
//! The annunciation is a 24-bit field made of three octets. The *status* octet contains the state
//! of the session and the device, the *cal/temp* octet contains the calibration and temperature
//! conditions, and the *warning* octet contains the glucose level warnings. Within a CGM
//! Measurement each octet is only transferred when it is non-zero, the CGM Status characteristic
//! always carries the whole field.

use crate::{TransferFormatError, TransferFormatInto, TransferFormatTryFrom};
use enumflags2::{bitflags, BitFlags};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The bits of the Sensor Status Annunciation field
#[bitflags]
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SensorStatus {
    SessionStopped = 1 << 0,
    DeviceBatteryLow = 1 << 1,
    SensorTypeIncorrect = 1 << 2,
    SensorMalfunction = 1 << 3,
    DeviceSpecificAlert = 1 << 4,
    GeneralDeviceFault = 1 << 5,
    TimeSynchronizationRequired = 1 << 8,
    CalibrationNotAllowed = 1 << 9,
    CalibrationRecommended = 1 << 10,
    CalibrationRequired = 1 << 11,
    SensorTemperatureTooHigh = 1 << 12,
    SensorTemperatureTooLow = 1 << 13,
    ResultLowerThanPatientLowLevel = 1 << 16,
    ResultHigherThanPatientHighLevel = 1 << 17,
    ResultLowerThanHypoLevel = 1 << 18,
    ResultHigherThanHyperLevel = 1 << 19,
    RateOfDecreaseExceeded = 1 << 20,
    RateOfIncreaseExceeded = 1 << 21,
    ResultLowerThanDeviceCanProcess = 1 << 22,
    ResultHigherThanDeviceCanProcess = 1 << 23,
}

/// One of the three octets of the annunciation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Octet {
    Status,
    CalTemp,
    Warning,
}

impl Octet {
    fn shift(&self) -> u32 {
        match self {
            Octet::Status => 0,
            Octet::CalTemp => 8,
            Octet::Warning => 16,
        }
    }

    /// Get this octet of `annunciation`
    pub fn of(&self, annunciation: BitFlags<SensorStatus>) -> u8 {
        (annunciation.bits() >> self.shift()) as u8
    }

    /// Get the annunciation bits of this octet for the raw octet `value`
    ///
    /// Reserved bits within `value` are dropped.
    pub fn flags_from(&self, value: u8) -> BitFlags<SensorStatus> {
        BitFlags::from_bits_truncate(u32::from(value) << self.shift())
    }
}

/// Convert the annunciation into its three transferred octets
pub fn to_octets(annunciation: BitFlags<SensorStatus>) -> [u8; 3] {
    let [b0, b1, b2, _] = annunciation.bits().to_le_bytes();

    [b0, b1, b2]
}

/// Create the annunciation from its three transferred octets
///
/// Reserved bits are dropped.
pub fn from_octets(octets: [u8; 3]) -> BitFlags<SensorStatus> {
    BitFlags::from_bits_truncate(u32::from_le_bytes([octets[0], octets[1], octets[2], 0]))
}

impl TransferFormatTryFrom for BitFlags<SensorStatus> {
    fn try_from(raw: &[u8]) -> Result<Self, TransferFormatError> {
        <[u8; 3]>::try_from(raw)
            .map(from_octets)
            .map_err(|_| TransferFormatError::bad_size("Sensor Status Annunciation", 3, raw.len()))
    }
}

impl TransferFormatInto for BitFlags<SensorStatus> {
    fn len_of_into(&self) -> usize {
        3
    }

    fn build_into_ret(&self, into_ret: &mut [u8]) {
        into_ret.copy_from_slice(&to_octets(*self))
    }
}
