//! The CGM Feature characteristic
//!
//! The feature characteristic is a read-only value containing the supported features of the
//! sensor, the type of the sample, and the sample location. Unlike the other CGM characteristics
//! the value always has the two octets of the E2E-CRC. When the E2E-CRC is not supported those
//! octets are `0xFFFF`.

use crate::crc;
use crate::{TransferFormatError, TransferFormatInto, TransferFormatTryFrom};
use enumflags2::{bitflags, BitFlags};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The bits of the CGM Feature field
#[bitflags]
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Feature {
    CalibrationSupported = 1 << 0,
    PatientHighLowAlerts = 1 << 1,
    HypoAlerts = 1 << 2,
    HyperAlerts = 1 << 3,
    RateOfIncreaseDecreaseAlerts = 1 << 4,
    DeviceSpecificAlert = 1 << 5,
    SensorMalfunctionDetection = 1 << 6,
    SensorTemperatureHighLowDetection = 1 << 7,
    SensorResultHighLowDetection = 1 << 8,
    LowBatteryDetection = 1 << 9,
    SensorTypeErrorDetection = 1 << 10,
    GeneralDeviceFault = 1 << 11,
    E2eCrc = 1 << 12,
    MultipleBond = 1 << 13,
    MultipleSessions = 1 << 14,
    TrendInformation = 1 << 15,
    Quality = 1 << 16,
}

/// The features of a sensor without the E2E-CRC
///
/// This is every feature except for the E2E-CRC and the support of multiple bonds or sessions.
pub fn default_features() -> BitFlags<Feature> {
    BitFlags::all() & !(Feature::E2eCrc | Feature::MultipleBond | Feature::MultipleSessions)
}

/// The type of the glucose sample
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum GlucoseType {
    CapillaryWholeBlood,
    CapillaryPlasma,
    VenousWholeBlood,
    VenousPlasma,
    ArterialWholeBlood,
    ArterialPlasma,
    UndeterminedWholeBlood,
    UndeterminedPlasma,
    InterstitialFluid,
    ControlSolution,
}

impl GlucoseType {
    pub fn into_raw(self) -> u8 {
        match self {
            GlucoseType::CapillaryWholeBlood => 0x1,
            GlucoseType::CapillaryPlasma => 0x2,
            GlucoseType::VenousWholeBlood => 0x3,
            GlucoseType::VenousPlasma => 0x4,
            GlucoseType::ArterialWholeBlood => 0x5,
            GlucoseType::ArterialPlasma => 0x6,
            GlucoseType::UndeterminedWholeBlood => 0x7,
            GlucoseType::UndeterminedPlasma => 0x8,
            GlucoseType::InterstitialFluid => 0x9,
            GlucoseType::ControlSolution => 0xA,
        }
    }

    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0x1 => Some(GlucoseType::CapillaryWholeBlood),
            0x2 => Some(GlucoseType::CapillaryPlasma),
            0x3 => Some(GlucoseType::VenousWholeBlood),
            0x4 => Some(GlucoseType::VenousPlasma),
            0x5 => Some(GlucoseType::ArterialWholeBlood),
            0x6 => Some(GlucoseType::ArterialPlasma),
            0x7 => Some(GlucoseType::UndeterminedWholeBlood),
            0x8 => Some(GlucoseType::UndeterminedPlasma),
            0x9 => Some(GlucoseType::InterstitialFluid),
            0xA => Some(GlucoseType::ControlSolution),
            _ => None,
        }
    }
}

/// The location of the glucose sample
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SampleLocation {
    Finger,
    AlternateSiteTest,
    Earlobe,
    ControlSolution,
    SubcutaneousTissue,
    NotAvailable,
}

impl SampleLocation {
    pub fn into_raw(self) -> u8 {
        match self {
            SampleLocation::Finger => 0x1,
            SampleLocation::AlternateSiteTest => 0x2,
            SampleLocation::Earlobe => 0x3,
            SampleLocation::ControlSolution => 0x4,
            SampleLocation::SubcutaneousTissue => 0x5,
            SampleLocation::NotAvailable => 0xF,
        }
    }

    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0x1 => Some(SampleLocation::Finger),
            0x2 => Some(SampleLocation::AlternateSiteTest),
            0x3 => Some(SampleLocation::Earlobe),
            0x4 => Some(SampleLocation::ControlSolution),
            0x5 => Some(SampleLocation::SubcutaneousTissue),
            0xF => Some(SampleLocation::NotAvailable),
            _ => None,
        }
    }
}

/// The type and sample location octet
///
/// The type is within the lower nibble and the sample location is within the upper nibble. The
/// octet is kept as it was received so that reserved values pass through unchanged.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct TypeSampleLocation(u8);

impl TypeSampleLocation {
    pub fn new(glucose_type: GlucoseType, location: SampleLocation) -> Self {
        TypeSampleLocation(location.into_raw() << 4 | glucose_type.into_raw())
    }

    pub const fn from_raw(raw: u8) -> Self {
        TypeSampleLocation(raw)
    }

    pub const fn into_raw(self) -> u8 {
        self.0
    }

    pub fn glucose_type(&self) -> Option<GlucoseType> {
        GlucoseType::from_raw(self.0 & 0xF)
    }

    pub fn location(&self) -> Option<SampleLocation> {
        SampleLocation::from_raw(self.0 >> 4)
    }
}

impl Default for TypeSampleLocation {
    fn default() -> Self {
        TypeSampleLocation::new(GlucoseType::InterstitialFluid, SampleLocation::SubcutaneousTissue)
    }
}

impl TransferFormatTryFrom for TypeSampleLocation {
    fn try_from(raw: &[u8]) -> Result<Self, TransferFormatError> {
        <u8 as TransferFormatTryFrom>::try_from(raw).map(TypeSampleLocation)
    }
}

impl TransferFormatInto for TypeSampleLocation {
    fn len_of_into(&self) -> usize {
        1
    }

    fn build_into_ret(&self, into_ret: &mut [u8]) {
        into_ret[0] = self.0
    }
}

/// The value of the CGM Feature characteristic
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeatureValue {
    pub features: BitFlags<Feature>,
    pub type_sample_location: TypeSampleLocation,
}

impl FeatureValue {
    const PAYLOAD_LEN: usize = 4;

    /// The CRC value used when the E2E-CRC is not supported
    pub const NO_CRC: u16 = 0xFFFF;
}

impl TransferFormatInto for FeatureValue {
    fn len_of_into(&self) -> usize {
        Self::PAYLOAD_LEN + crc::CRC_LEN
    }

    fn build_into_ret(&self, into_ret: &mut [u8]) {
        let [f0, f1, f2, _] = self.features.bits().to_le_bytes();

        into_ret[..3].copy_from_slice(&[f0, f1, f2]);

        into_ret[3] = self.type_sample_location.into_raw();

        let crc = if self.features.contains(Feature::E2eCrc) {
            crc::crc16(&into_ret[..Self::PAYLOAD_LEN])
        } else {
            Self::NO_CRC
        };

        into_ret[Self::PAYLOAD_LEN..].copy_from_slice(&crc.to_le_bytes());
    }
}

impl TransferFormatTryFrom for FeatureValue {
    fn try_from(raw: &[u8]) -> Result<Self, TransferFormatError> {
        if raw.len() != Self::PAYLOAD_LEN + crc::CRC_LEN {
            return Err(TransferFormatError::bad_size(
                "CGM Feature",
                Self::PAYLOAD_LEN + crc::CRC_LEN,
                raw.len(),
            ));
        }

        let features = BitFlags::from_bits_truncate(u32::from_le_bytes([raw[0], raw[1], raw[2], 0]));

        if features.contains(Feature::E2eCrc) {
            crc::verify(raw, Self::PAYLOAD_LEN).map_err(|e| TransferFormatError::from(alloc::format!("{}", e)))?;
        }

        Ok(FeatureValue {
            features,
            type_sample_location: TypeSampleLocation(raw[3]),
        })
    }
}
