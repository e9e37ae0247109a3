//! IEEE-11073 16-bit short float (SFLOAT)
//!
//! A SFLOAT is a 12-bit two's complement mantissa in the lower bits and a 4-bit two's complement
//! base-10 exponent in the upper nibble. Five bit patterns with an exponent of zero are reserved as
//! special values; these are never a measurement and are rejected by every setter of the Specific
//! Ops Control Point.

use crate::{TransferFormatError, TransferFormatInto, TransferFormatTryFrom};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The special values of a [`SFloat`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Special {
    NaN,
    NotAtResolution,
    PositiveInfinity,
    NegativeInfinity,
    Reserved,
}

impl core::fmt::Display for Special {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Special::NaN => f.write_str("NaN"),
            Special::NotAtResolution => f.write_str("NRes"),
            Special::PositiveInfinity => f.write_str("+INFINITY"),
            Special::NegativeInfinity => f.write_str("-INFINITY"),
            Special::Reserved => f.write_str("Reserved"),
        }
    }
}

/// A IEEE-11073 short float
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct SFloat(u16);

impl SFloat {
    pub const NAN: SFloat = SFloat(0x07FF);
    pub const NRES: SFloat = SFloat(0x0800);
    pub const INFINITY: SFloat = SFloat(0x07FE);
    pub const NEG_INFINITY: SFloat = SFloat(0x0802);
    pub const RESERVED: SFloat = SFloat(0x0801);

    /// The largest magnitude of a mantissa that is not special
    pub const MANTISSA_LIMIT: i16 = 2045;

    pub const EXPONENT_MAX: i8 = 7;
    pub const EXPONENT_MIN: i8 = -8;

    /// Create a `SFloat` from its transferred bits
    pub const fn from_raw(raw: u16) -> Self {
        SFloat(raw)
    }

    /// Get the transferred bits
    pub const fn into_raw(self) -> u16 {
        self.0
    }

    /// Create a `SFloat` of `mantissa * 10^exponent`
    ///
    /// `None` is returned if the mantissa is outside of ±2045 or the exponent is outside of the
    /// range -8 to 7.
    pub fn new(mantissa: i16, exponent: i8) -> Option<Self> {
        let mantissa_range = -Self::MANTISSA_LIMIT..=Self::MANTISSA_LIMIT;

        let exponent_range = Self::EXPONENT_MIN..=Self::EXPONENT_MAX;

        if mantissa_range.contains(&mantissa) && exponent_range.contains(&exponent) {
            let raw = ((exponent as u16 & 0xF) << 12) | (mantissa as u16 & 0xFFF);

            Some(SFloat(raw))
        } else {
            None
        }
    }

    /// Get the special value if this is one
    pub fn special(&self) -> Option<Special> {
        match self.0 {
            0x07FF => Some(Special::NaN),
            0x0800 => Some(Special::NotAtResolution),
            0x07FE => Some(Special::PositiveInfinity),
            0x0802 => Some(Special::NegativeInfinity),
            0x0801 => Some(Special::Reserved),
            _ => None,
        }
    }

    /// Check if this is one of the five special values
    pub fn is_special(&self) -> bool {
        self.special().is_some()
    }

    /// Get the mantissa
    pub fn mantissa(&self) -> i16 {
        let mantissa = (self.0 & 0xFFF) as i16;

        if mantissa & 0x800 != 0 {
            mantissa - 0x1000
        } else {
            mantissa
        }
    }

    /// Get the exponent
    pub fn exponent(&self) -> i8 {
        let exponent = (self.0 >> 12) as i8;

        if exponent & 0x8 != 0 {
            exponent - 0x10
        } else {
            exponent
        }
    }

    /// Convert to a `f32`
    ///
    /// NaN, NRes, and the reserved value all convert to `f32::NAN`.
    pub fn to_f32(&self) -> f32 {
        match self.special() {
            Some(Special::PositiveInfinity) => f32::INFINITY,
            Some(Special::NegativeInfinity) => f32::NEG_INFINITY,
            Some(_) => f32::NAN,
            None => {
                let exponent = self.exponent();

                (0..exponent.unsigned_abs()).fold(f32::from(self.mantissa()), |value, _| {
                    if exponent > 0 {
                        value * 10.0
                    } else {
                        value / 10.0
                    }
                })
            }
        }
    }

    /// Compare the numeric values of two `SFloat`s
    ///
    /// `None` is returned if either is NaN, NRes, or the reserved value.
    pub fn partial_cmp_value(&self, other: &SFloat) -> Option<core::cmp::Ordering> {
        self.to_f32().partial_cmp(&other.to_f32())
    }
}

impl core::fmt::Debug for SFloat {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "SFloat({})", self)
    }
}

impl core::fmt::Display for SFloat {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.special() {
            Some(special) => core::fmt::Display::fmt(&special, f),
            None => write!(f, "{}e{}", self.mantissa(), self.exponent()),
        }
    }
}

impl TransferFormatTryFrom for SFloat {
    fn try_from(raw: &[u8]) -> Result<Self, TransferFormatError> {
        <u16 as TransferFormatTryFrom>::try_from(raw)
            .map(SFloat)
            .map_err(|_| TransferFormatError::bad_size("SFLOAT", 2, raw.len()))
    }
}

impl TransferFormatInto for SFloat {
    fn len_of_into(&self) -> usize {
        2
    }

    fn build_into_ret(&self, into_ret: &mut [u8]) {
        self.0.build_into_ret(into_ret)
    }
}
