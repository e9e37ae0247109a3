//! Glucose records and the record store
//!
//! The record store is the log of glucose measurements that is accessed through the Record Access
//! Control Point. Records are never removed from the store, a deleted record is only marked as
//! [`Deleted`] and is from then on skipped by every selection.
//!
//! [`Deleted`]: RecordStatus::Deleted

use alloc::vec::Vec;
use cgms_core::annunciation::Octet;
use cgms_core::{crc, BitFlags, SFloat, SensorStatus};
use cgms_core::{TransferFormatError, TransferFormatInto, TransferFormatTryFrom};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The status of a record within the store
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RecordStatus {
    Active,
    Deleted,
}

/// A glucose measurement
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GlucoseRecord {
    pub glucose_concentration: SFloat,
    /// Minutes since the start of the session
    pub time_offset: u16,
    pub annunciation: BitFlags<SensorStatus>,
    pub trend: Option<SFloat>,
    pub quality: Option<SFloat>,
    pub status: RecordStatus,
}

impl GlucoseRecord {
    const TREND_PRESENT: u8 = 1 << 0;
    const QUALITY_PRESENT: u8 = 1 << 1;
    const WARNING_OCTET_PRESENT: u8 = 1 << 5;
    const CAL_TEMP_OCTET_PRESENT: u8 = 1 << 6;
    const STATUS_OCTET_PRESENT: u8 = 1 << 7;

    /// Create a new active record without an annunciation, trend, or quality
    pub fn new(glucose_concentration: SFloat, time_offset: u16) -> Self {
        GlucoseRecord {
            glucose_concentration,
            time_offset,
            annunciation: BitFlags::empty(),
            trend: None,
            quality: None,
            status: RecordStatus::Active,
        }
    }

    pub fn with_annunciation<A>(mut self, annunciation: A) -> Self
    where
        A: Into<BitFlags<SensorStatus>>,
    {
        self.annunciation = annunciation.into();
        self
    }

    pub fn with_trend(mut self, trend: SFloat) -> Self {
        self.trend = Some(trend);
        self
    }

    pub fn with_quality(mut self, quality: SFloat) -> Self {
        self.quality = Some(quality);
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == RecordStatus::Active
    }

    /// The annunciation octets that are transferred within a measurement
    ///
    /// The octets are in the order they are transferred.
    fn present_octets(&self) -> impl Iterator<Item = u8> + '_ {
        [Octet::Status, Octet::CalTemp, Octet::Warning]
            .into_iter()
            .map(|octet| octet.of(self.annunciation))
            .filter(|value| *value != 0)
    }

    /// Get the flags field of the CGM Measurement for this record
    pub fn flags(&self) -> u8 {
        let mut flags = 0u8;

        if self.trend.is_some() {
            flags |= Self::TREND_PRESENT
        }

        if self.quality.is_some() {
            flags |= Self::QUALITY_PRESENT
        }

        if Octet::Warning.of(self.annunciation) != 0 {
            flags |= Self::WARNING_OCTET_PRESENT
        }

        if Octet::CalTemp.of(self.annunciation) != 0 {
            flags |= Self::CAL_TEMP_OCTET_PRESENT
        }

        if Octet::Status.of(self.annunciation) != 0 {
            flags |= Self::STATUS_OCTET_PRESENT
        }

        flags
    }
}

/// The CGM Measurement value of a record
///
/// ```text
/// [size][flags][glucose concentration][time offset][status?][cal/temp?][warning?][trend?][quality?][crc?]
/// ```
///
/// The size field is the length of the entire value, the E2E-CRC included.
#[derive(Clone, Copy, Debug)]
pub struct Measurement<'a> {
    pub record: &'a GlucoseRecord,
    pub e2e_crc: bool,
}

impl<'a> Measurement<'a> {
    pub fn new(record: &'a GlucoseRecord, e2e_crc: bool) -> Self {
        Measurement { record, e2e_crc }
    }

    fn payload_len(&self) -> usize {
        let size_and_flags = 2;

        let concentration_and_offset = 4;

        let octets = self.record.present_octets().count();

        let trend = if self.record.trend.is_some() { 2 } else { 0 };

        let quality = if self.record.quality.is_some() { 2 } else { 0 };

        size_and_flags + concentration_and_offset + octets + trend + quality
    }

    /// Parse a received CGM Measurement value
    ///
    /// This is the inverse of the transfer format of a `Measurement`. The returned record is
    /// always [`Active`](RecordStatus::Active).
    pub fn parse(raw: &[u8], e2e_crc: bool) -> Result<GlucoseRecord, TransferFormatError> {
        let min_len = 6 + if e2e_crc { crc::CRC_LEN } else { 0 };

        if raw.len() < min_len {
            return Err(TransferFormatError::bad_min_size("CGM Measurement", min_len, raw.len()));
        }

        let size = usize::from(raw[0]);

        if size != raw.len() {
            return Err(TransferFormatError::bad_size("CGM Measurement", size, raw.len()));
        }

        let payload = if e2e_crc {
            crc::verify(raw, raw.len() - crc::CRC_LEN)
                .map_err(|e| TransferFormatError::from(alloc::format!("{}", e)))?;

            &raw[..raw.len() - crc::CRC_LEN]
        } else {
            raw
        };

        let flags = payload[1];

        let mut record = GlucoseRecord::new(
            <SFloat as TransferFormatTryFrom>::try_from(&payload[2..4])?,
            <u16 as TransferFormatTryFrom>::try_from(&payload[4..6])?,
        );

        let mut index = 6;

        let octet_flags = [
            (GlucoseRecord::STATUS_OCTET_PRESENT, Octet::Status),
            (GlucoseRecord::CAL_TEMP_OCTET_PRESENT, Octet::CalTemp),
            (GlucoseRecord::WARNING_OCTET_PRESENT, Octet::Warning),
        ];

        for (flag, octet) in octet_flags {
            if flags & flag != 0 {
                record.annunciation |= octet.flags_from(next_field(payload, &mut index, 1)?[0]);
            }
        }

        if flags & GlucoseRecord::TREND_PRESENT != 0 {
            let trend = next_field(payload, &mut index, 2)?;

            record.trend = Some(<SFloat as TransferFormatTryFrom>::try_from(trend)?);
        }

        if flags & GlucoseRecord::QUALITY_PRESENT != 0 {
            let quality = next_field(payload, &mut index, 2)?;

            record.quality = Some(<SFloat as TransferFormatTryFrom>::try_from(quality)?);
        }

        if index == payload.len() {
            Ok(record)
        } else {
            Err(TransferFormatError::from("CGM Measurement is longer than its flags"))
        }
    }
}

/// Get the field of `len` bytes at `index` and advance `index` past it
fn next_field<'a>(payload: &'a [u8], index: &mut usize, len: usize) -> Result<&'a [u8], TransferFormatError> {
    let field = payload
        .get(*index..*index + len)
        .ok_or_else(|| TransferFormatError::from("CGM Measurement is shorter than its flags"))?;

    *index += len;

    Ok(field)
}

impl TransferFormatInto for Measurement<'_> {
    fn len_of_into(&self) -> usize {
        self.payload_len() + if self.e2e_crc { crc::CRC_LEN } else { 0 }
    }

    fn build_into_ret(&self, into_ret: &mut [u8]) {
        let payload_len = self.payload_len();

        into_ret[0] = self.len_of_into() as u8;

        into_ret[1] = self.record.flags();

        self.record.glucose_concentration.build_into_ret(&mut into_ret[2..4]);

        self.record.time_offset.build_into_ret(&mut into_ret[4..6]);

        let mut index = 6;

        for octet in self.record.present_octets() {
            into_ret[index] = octet;

            index += 1;
        }

        for value in [self.record.trend, self.record.quality].into_iter().flatten() {
            value.build_into_ret(&mut into_ret[index..index + 2]);

            index += 2;
        }

        crc::append(into_ret, payload_len, self.e2e_crc);
    }
}

/// Error returned when pushing a record into a full [`RecordStore`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("the record store is full (capacity of {capacity} records)")]
pub struct RecordStoreFull {
    pub capacity: usize,
}

/// The store of glucose records
#[derive(Clone, Debug)]
pub struct RecordStore {
    records: Vec<GlucoseRecord>,
    capacity: usize,
}

impl RecordStore {
    pub const DEFAULT_CAPACITY: usize = 64;

    /// Create an empty store
    pub fn new(capacity: usize) -> Self {
        RecordStore {
            records: Vec::new(),
            capacity,
        }
    }

    /// Create a store containing the [demonstration records](RecordStore::demo_records)
    ///
    /// The capacity of the store is never less than the number of demonstration records.
    pub fn with_demo_records(capacity: usize) -> Self {
        let demo = Self::demo_records();

        let mut store = Self::new(core::cmp::max(capacity, demo.len()));

        store.records.extend(demo);

        store
    }

    /// The three demonstration records
    ///
    /// These are at the time offsets of one, two, and three minutes.
    pub fn demo_records() -> [GlucoseRecord; 3] {
        [
            GlucoseRecord::new(SFloat::from_raw(100), 1),
            GlucoseRecord::new(SFloat::from_raw(110), 2).with_trend(SFloat::from_raw(0xF00A)),
            GlucoseRecord::new(SFloat::from_raw(120), 3)
                .with_quality(SFloat::from_raw(0x005A))
                .with_annunciation(SensorStatus::DeviceBatteryLow),
        ]
    }

    /// Append a record to the end of the store
    ///
    /// The index of the record is returned.
    pub fn push(&mut self, record: GlucoseRecord) -> Result<usize, RecordStoreFull> {
        if self.records.len() < self.capacity {
            self.records.push(record);

            Ok(self.records.len() - 1)
        } else {
            Err(RecordStoreFull { capacity: self.capacity })
        }
    }

    pub fn get(&self, index: usize) -> Option<&GlucoseRecord> {
        self.records.get(index)
    }

    /// Iterate over every record (deleted records included) with its index
    pub fn iter(&self) -> impl Iterator<Item = (usize, &GlucoseRecord)> + '_ {
        self.records.iter().enumerate()
    }

    /// Iterate over the active records with their index
    pub fn iter_active(&self) -> impl Iterator<Item = (usize, &GlucoseRecord)> + '_ {
        self.iter().filter(|(_, record)| record.is_active())
    }

    /// Mark the record at `index` as deleted
    ///
    /// False is returned if there is no active record at `index`.
    pub fn delete(&mut self, index: usize) -> bool {
        match self.records.get_mut(index) {
            Some(record) if record.is_active() => {
                record.status = RecordStatus::Deleted;
                true
            }
            _ => false,
        }
    }

    /// Get the most recently stored active record
    pub fn latest_active(&self) -> Option<&GlucoseRecord> {
        self.records.iter().rev().find(|record| record.is_active())
    }

    /// The number of records (deleted records included)
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.iter_active().count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for RecordStore {
    fn default() -> Self {
        RecordStore::new(Self::DEFAULT_CAPACITY)
    }
}
