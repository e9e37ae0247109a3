//! Core types of the Continuous Glucose Monitoring Service
//!
//! This crate contains the pieces shared by the control point engines and the service itself. None
//! of it depends on a Bluetooth stack, everything here is a pure transformation of bytes.
//!
//! * [`crc`] is the end-to-end CRC (E2E-CRC) that can be appended to the CGM characteristics.
//! * [`sfloat`] is the IEEE-11073 16-bit short float used for glucose concentrations, trends,
//!   qualities, and alert levels.
//! * [`feature`] and [`annunciation`] are the assigned bit fields of the *CGM Feature* and
//!   *Sensor Status Annunciation* fields.
//! * [`TransferFormatInto`] and [`TransferFormatTryFrom`] convert named structures to and from
//!   the bytes transferred over the GATT bearer.

#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

pub mod annunciation;
pub mod crc;
pub mod feature;
pub mod sfloat;
mod transfer_format;

pub use annunciation::SensorStatus;
pub use enumflags2::{BitFlag, BitFlags};
pub use feature::{Feature, TypeSampleLocation};
pub use sfloat::SFloat;
pub use transfer_format::{TransferFormatError, TransferFormatInto, TransferFormatTryFrom};
