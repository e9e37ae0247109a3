//! Session configuration
//!
//! The configuration is the state changed through the Specific Ops Control Point. It lives as
//! long as the service and is not reset when a client disconnects.

use crate::AlertLevel;
use cgms_core::{BitFlags, Feature, SFloat, SensorStatus};
use core::cmp::Ordering;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The alert levels
///
/// The glucose levels are in mg/dL and the rates are in mg/dL/min.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct AlertLevels {
    pub patient_high: SFloat,
    pub patient_low: SFloat,
    pub hypo: SFloat,
    pub hyper: SFloat,
    pub rate_of_decrease: SFloat,
    pub rate_of_increase: SFloat,
}

impl AlertLevels {
    pub fn get(&self, level: AlertLevel) -> SFloat {
        match level {
            AlertLevel::PatientHigh => self.patient_high,
            AlertLevel::PatientLow => self.patient_low,
            AlertLevel::Hypo => self.hypo,
            AlertLevel::Hyper => self.hyper,
            AlertLevel::RateOfDecrease => self.rate_of_decrease,
            AlertLevel::RateOfIncrease => self.rate_of_increase,
        }
    }

    pub fn set(&mut self, level: AlertLevel, value: SFloat) {
        let field = match level {
            AlertLevel::PatientHigh => &mut self.patient_high,
            AlertLevel::PatientLow => &mut self.patient_low,
            AlertLevel::Hypo => &mut self.hypo,
            AlertLevel::Hyper => &mut self.hyper,
            AlertLevel::RateOfDecrease => &mut self.rate_of_decrease,
            AlertLevel::RateOfIncrease => &mut self.rate_of_increase,
        };

        *field = value;
    }

    /// Get the warnings of the annunciation for a measurement
    ///
    /// Only warnings for the alerts within `features` are returned. The rate of decrease is
    /// compared against the magnitude of a negative trend.
    pub fn warnings(
        &self,
        concentration: SFloat,
        trend: Option<SFloat>,
        features: BitFlags<Feature>,
    ) -> BitFlags<SensorStatus> {
        let mut warnings = BitFlags::empty();

        let is = |value: SFloat, level: SFloat, ordering: Ordering| value.partial_cmp_value(&level) == Some(ordering);

        if features.contains(Feature::PatientHighLowAlerts) {
            if is(concentration, self.patient_low, Ordering::Less) {
                warnings |= SensorStatus::ResultLowerThanPatientLowLevel
            }

            if is(concentration, self.patient_high, Ordering::Greater) {
                warnings |= SensorStatus::ResultHigherThanPatientHighLevel
            }
        }

        if features.contains(Feature::HypoAlerts) && is(concentration, self.hypo, Ordering::Less) {
            warnings |= SensorStatus::ResultLowerThanHypoLevel
        }

        if features.contains(Feature::HyperAlerts) && is(concentration, self.hyper, Ordering::Greater) {
            warnings |= SensorStatus::ResultHigherThanHyperLevel
        }

        if let Some(trend) = trend.filter(|_| features.contains(Feature::RateOfIncreaseDecreaseAlerts)) {
            let trend = trend.to_f32();

            if -trend > self.rate_of_decrease.to_f32() {
                warnings |= SensorStatus::RateOfDecreaseExceeded
            }

            if trend > self.rate_of_increase.to_f32() {
                warnings |= SensorStatus::RateOfIncreaseExceeded
            }
        }

        warnings
    }
}

impl Default for AlertLevels {
    fn default() -> Self {
        AlertLevels {
            patient_high: SFloat::from_raw(180),
            patient_low: SFloat::from_raw(70),
            hypo: SFloat::from_raw(55),
            hyper: SFloat::from_raw(250),
            rate_of_decrease: SFloat::from_raw(0xF014),
            rate_of_increase: SFloat::from_raw(0xF014),
        }
    }
}

/// The configuration of the Specific Ops Control Point
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct Configuration {
    /// The communication interval in minutes
    ///
    /// Periodic communication is disabled when this is zero.
    pub communication_interval: u8,
    /// The fastest communication interval supported by the sensor
    pub fastest_communication_interval: u8,
    pub alert_levels: AlertLevels,
    /// The maximum number of stored calibration records
    pub calibration_capacity: usize,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            communication_interval: 5,
            fastest_communication_interval: 1,
            alert_levels: AlertLevels::default(),
            calibration_capacity: 8,
        }
    }
}
