//! Characteristics of the Continuous Glucose Monitoring Service
//!
//! This contains the assigned numbers of the service, the table of attribute handles, and the
//! values of the characteristics that are not part of a control point.

use crate::ConfigError;
use cgms_core::{BitFlags, SensorStatus};
use cgms_core::{TransferFormatError, TransferFormatInto, TransferFormatTryFrom};
use enumflags2::bitflags;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Assigned 16-bit UUIDs
pub mod uuid {
    pub const CONTINUOUS_GLUCOSE_MONITORING: u16 = 0x181F;
    pub const CGM_MEASUREMENT: u16 = 0x2AA7;
    pub const CGM_FEATURE: u16 = 0x2AA8;
    pub const CGM_STATUS: u16 = 0x2AA9;
    pub const CGM_SESSION_START_TIME: u16 = 0x2AAA;
    pub const CGM_SESSION_RUN_TIME: u16 = 0x2AAB;
    pub const RECORD_ACCESS_CONTROL_POINT: u16 = 0x2A52;
    pub const CGM_SPECIFIC_OPS_CONTROL_POINT: u16 = 0x2AAC;
    pub const CLIENT_CHARACTERISTIC_CONFIGURATION: u16 = 0x2902;
}

/// The characteristic values and descriptors of the service
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Characteristic {
    Measurement,
    MeasurementClientConfiguration,
    Feature,
    Status,
    SessionStartTime,
    SessionRunTime,
    RecordAccessControlPoint,
    RecordAccessClientConfiguration,
    SpecificOpsControlPoint,
    SpecificOpsClientConfiguration,
}

impl Characteristic {
    /// Get the UUID of the attribute type
    pub fn uuid(&self) -> u16 {
        match self {
            Characteristic::Measurement => uuid::CGM_MEASUREMENT,
            Characteristic::Feature => uuid::CGM_FEATURE,
            Characteristic::Status => uuid::CGM_STATUS,
            Characteristic::SessionStartTime => uuid::CGM_SESSION_START_TIME,
            Characteristic::SessionRunTime => uuid::CGM_SESSION_RUN_TIME,
            Characteristic::RecordAccessControlPoint => uuid::RECORD_ACCESS_CONTROL_POINT,
            Characteristic::SpecificOpsControlPoint => uuid::CGM_SPECIFIC_OPS_CONTROL_POINT,
            Characteristic::MeasurementClientConfiguration
            | Characteristic::RecordAccessClientConfiguration
            | Characteristic::SpecificOpsClientConfiguration => uuid::CLIENT_CHARACTERISTIC_CONFIGURATION,
        }
    }
}

/// The attribute handles of the characteristic values and descriptors
///
/// The default handles are those of a server where the CGM service follows the GAP and GATT
/// services.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct CharacteristicHandles {
    pub measurement: u16,
    pub measurement_cccd: u16,
    pub feature: u16,
    pub status: u16,
    pub session_start_time: u16,
    pub session_run_time: u16,
    pub racp: u16,
    pub racp_cccd: u16,
    pub socp: u16,
    pub socp_cccd: u16,
}

impl CharacteristicHandles {
    fn table(&self) -> [(u16, Characteristic); 10] {
        [
            (self.measurement, Characteristic::Measurement),
            (self.measurement_cccd, Characteristic::MeasurementClientConfiguration),
            (self.feature, Characteristic::Feature),
            (self.status, Characteristic::Status),
            (self.session_start_time, Characteristic::SessionStartTime),
            (self.session_run_time, Characteristic::SessionRunTime),
            (self.racp, Characteristic::RecordAccessControlPoint),
            (self.racp_cccd, Characteristic::RecordAccessClientConfiguration),
            (self.socp, Characteristic::SpecificOpsControlPoint),
            (self.socp_cccd, Characteristic::SpecificOpsClientConfiguration),
        ]
    }

    /// Get the characteristic at `handle`
    pub fn characteristic(&self, handle: u16) -> Option<Characteristic> {
        self.table()
            .into_iter()
            .find(|(characteristic_handle, _)| *characteristic_handle == handle)
            .map(|(_, characteristic)| characteristic)
    }

    /// Check that every handle is valid and unique
    pub fn validate(&self) -> Result<(), ConfigError> {
        let table = self.table();

        for (index, (handle, _)) in table.iter().enumerate() {
            if *handle == 0 {
                return Err(ConfigError::NullHandle);
            }

            if table[..index].iter().any(|(other, _)| other == handle) {
                return Err(ConfigError::DuplicateHandle(*handle));
            }
        }

        Ok(())
    }
}

impl Default for CharacteristicHandles {
    fn default() -> Self {
        CharacteristicHandles {
            measurement: 0x12,
            measurement_cccd: 0x13,
            feature: 0x15,
            status: 0x17,
            session_start_time: 0x19,
            session_run_time: 0x1B,
            racp: 0x1D,
            racp_cccd: 0x1E,
            socp: 0x20,
            socp_cccd: 0x21,
        }
    }
}

/// The bits of a client characteristic configuration descriptor
#[bitflags]
#[repr(u16)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ClientConfiguration {
    Notification = 1 << 0,
    Indication = 1 << 1,
}

/// The value of the CGM Status characteristic
///
/// The time offset is the time offset of the most recent measurement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusValue {
    pub time_offset: u16,
    pub status: BitFlags<SensorStatus>,
}

impl TransferFormatTryFrom for StatusValue {
    fn try_from(raw: &[u8]) -> Result<Self, TransferFormatError> {
        if raw.len() != 5 {
            return Err(TransferFormatError::bad_size("CGM Status", 5, raw.len()));
        }

        Ok(StatusValue {
            time_offset: TransferFormatTryFrom::try_from(&raw[..2])?,
            status: TransferFormatTryFrom::try_from(&raw[2..])?,
        })
    }
}

impl TransferFormatInto for StatusValue {
    fn len_of_into(&self) -> usize {
        5
    }

    fn build_into_ret(&self, into_ret: &mut [u8]) {
        self.time_offset.build_into_ret(&mut into_ret[..2]);

        self.status.build_into_ret(&mut into_ret[2..]);
    }
}

/// The value of the CGM Session Start Time characteristic
///
/// A zero year, month, or day is an unknown value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SessionStartTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
    /// The offset from UTC in 15 minute increments
    pub time_zone: i8,
    pub dst_offset: u8,
}

impl SessionStartTime {
    pub const LEN: usize = 9;

    /// The value of `time_zone` when the time zone is not known
    pub const TIME_ZONE_UNKNOWN: i8 = -128;

    /// The value of `dst_offset` when the daylight saving time offset is not known
    pub const DST_OFFSET_UNKNOWN: u8 = 255;

    /// Check that every field is within the range of its assigned values
    pub fn is_valid(&self) -> bool {
        let year = self.year == 0 || (1582..=9999).contains(&self.year);

        let time_zone = self.time_zone == Self::TIME_ZONE_UNKNOWN || (-48..=56).contains(&self.time_zone);

        let dst_offset = matches!(self.dst_offset, 0 | 2 | 4 | 8 | Self::DST_OFFSET_UNKNOWN);

        year
            && self.month <= 12
            && self.day <= 31
            && self.hours <= 23
            && self.minutes <= 59
            && self.seconds <= 59
            && time_zone
            && dst_offset
    }
}

impl TransferFormatTryFrom for SessionStartTime {
    fn try_from(raw: &[u8]) -> Result<Self, TransferFormatError> {
        if raw.len() != Self::LEN {
            return Err(TransferFormatError::bad_size("CGM Session Start Time", Self::LEN, raw.len()));
        }

        Ok(SessionStartTime {
            year: u16::from_le_bytes([raw[0], raw[1]]),
            month: raw[2],
            day: raw[3],
            hours: raw[4],
            minutes: raw[5],
            seconds: raw[6],
            time_zone: raw[7] as i8,
            dst_offset: raw[8],
        })
    }
}

impl TransferFormatInto for SessionStartTime {
    fn len_of_into(&self) -> usize {
        Self::LEN
    }

    fn build_into_ret(&self, into_ret: &mut [u8]) {
        self.year.build_into_ret(&mut into_ret[..2]);

        into_ret[2..7].copy_from_slice(&[self.month, self.day, self.hours, self.minutes, self.seconds]);

        into_ret[7] = self.time_zone as u8;

        into_ret[8] = self.dst_offset;
    }
}
