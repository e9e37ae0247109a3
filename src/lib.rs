//! A Continuous Glucose Monitoring Service
//!
//! cgms is the server side of the Bluetooth Continuous Glucose Monitoring Service (CGMS). It does
//! not contain a Bluetooth stack, instead the service is driven by the events of whatever GATT
//! server hosts it. Everything below the [`server`] is usable where only
//! [`core`](https://doc.rust-lang.org/core/) and [`alloc`](https://doc.rust-lang.org/alloc/) are
//! available.
//!
//! * [`core`] contains the E2E-CRC, the SFLOAT type, and the assigned bit fields of the service.
//! * [`racp`] is the engine of the Record Access Control Point.
//! * [`socp`] is the engine of the CGM Specific Ops Control Point.
//! * [`server`] is the service itself.

#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[doc(inline)]
pub use cgms_core as core;

#[doc(inline)]
pub use cgms_racp as racp;

#[doc(inline)]
pub use cgms_socp as socp;

#[cfg(feature = "server")]
#[doc(inline)]
pub use cgms_server as server;
