//! Glucose calibration records

use alloc::collections::VecDeque;
use cgms_core::{BitFlags, SFloat, TypeSampleLocation};
use cgms_core::{TransferFormatError, TransferFormatInto, TransferFormatTryFrom};
use enumflags2::bitflags;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The calibration status bits of a calibration record
#[bitflags]
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CalibrationStatus {
    Rejected = 1 << 0,
    OutOfRange = 1 << 1,
    ProcessPending = 1 << 2,
}

/// A glucose calibration record
///
/// The calibration time and the next calibration time are in minutes relative to the session
/// start time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CalibrationRecord {
    pub glucose_concentration: SFloat,
    pub calibration_time: u16,
    pub type_sample_location: TypeSampleLocation,
    pub next_calibration_time: u16,
    pub record_number: u16,
    pub status: BitFlags<CalibrationStatus>,
}

impl CalibrationRecord {
    pub const LEN: usize = 10;
}

impl TransferFormatTryFrom for CalibrationRecord {
    fn try_from(raw: &[u8]) -> Result<Self, TransferFormatError> {
        if raw.len() != Self::LEN {
            return Err(TransferFormatError::bad_size("calibration record", Self::LEN, raw.len()));
        }

        Ok(CalibrationRecord {
            glucose_concentration: TransferFormatTryFrom::try_from(&raw[..2])?,
            calibration_time: TransferFormatTryFrom::try_from(&raw[2..4])?,
            type_sample_location: TransferFormatTryFrom::try_from(&raw[4..5])?,
            next_calibration_time: TransferFormatTryFrom::try_from(&raw[5..7])?,
            record_number: TransferFormatTryFrom::try_from(&raw[7..9])?,
            status: BitFlags::from_bits_truncate(raw[9]),
        })
    }
}

impl TransferFormatInto for CalibrationRecord {
    fn len_of_into(&self) -> usize {
        Self::LEN
    }

    fn build_into_ret(&self, into_ret: &mut [u8]) {
        self.glucose_concentration.build_into_ret(&mut into_ret[..2]);

        self.calibration_time.build_into_ret(&mut into_ret[2..4]);

        self.type_sample_location.build_into_ret(&mut into_ret[4..5]);

        self.next_calibration_time.build_into_ret(&mut into_ret[5..7]);

        self.record_number.build_into_ret(&mut into_ret[7..9]);

        into_ret[9] = self.status.bits();
    }
}

/// The store of calibration records
///
/// The store is a ring of records. When the store is full the oldest record is dropped to make
/// room for a new record. Record numbers are assigned by the store and wrap around, skipping
/// [`LAST_RECORD`](CalibrationStore::LAST_RECORD).
#[derive(Clone, Debug)]
pub struct CalibrationStore {
    records: VecDeque<CalibrationRecord>,
    capacity: usize,
    next_record_number: u16,
}

impl CalibrationStore {
    /// The record number used to get the most recent record
    pub const LAST_RECORD: u16 = 0xFFFF;

    /// Create a new `CalibrationStore`
    ///
    /// A store always has room for at least one record.
    pub fn new(capacity: usize) -> Self {
        let capacity = core::cmp::max(capacity, 1);

        CalibrationStore {
            records: VecDeque::new(),
            capacity,
            next_record_number: 0,
        }
    }

    /// Store a calibration
    ///
    /// The record number of `record` is replaced with the next record number, the stored record
    /// is returned.
    pub fn store(&mut self, mut record: CalibrationRecord) -> CalibrationRecord {
        record.record_number = self.next_record_number;

        self.next_record_number = match self.next_record_number.wrapping_add(1) {
            Self::LAST_RECORD => 0,
            number => number,
        };

        if self.records.len() == self.capacity {
            if let Some(dropped) = self.records.pop_front() {
                log::debug!("(SOCP) dropping calibration record {}", dropped.record_number);
            }
        }

        self.records.push_back(record);

        record
    }

    /// Get a calibration record by its record number
    pub fn get(&self, record_number: u16) -> Option<&CalibrationRecord> {
        if record_number == Self::LAST_RECORD {
            self.records.back()
        } else {
            self.records.iter().find(|record| record.record_number == record_number)
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
