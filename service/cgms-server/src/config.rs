use crate::characteristic::CharacteristicHandles;
use crate::error::ConfigError;
use cgms_core::feature::default_features;
use cgms_core::{BitFlags, Feature, TypeSampleLocation};
use cgms_racp::record::RecordStore;
use cgms_socp::config::Configuration;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The configuration of a [`CgmsService`](crate::CgmsService)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct ServiceConfig {
    pub handles: CharacteristicHandles,
    /// The features of the sensor
    ///
    /// The E2E-CRC of the service is enabled by [`Feature::E2eCrc`].
    pub features: BitFlags<Feature>,
    pub type_sample_location: TypeSampleLocation,
    /// The maximum number of glucose records
    pub record_capacity: usize,
    /// Seed the record store with the demonstration records
    pub demo_records: bool,
    /// Start the service with the session stopped
    pub session_stopped: bool,
    /// The expected run time of a session in hours
    pub session_run_time: u16,
    pub specific_ops: Configuration,
}

impl ServiceConfig {
    /// The largest capacity of the record and calibration stores
    ///
    /// Record counts and calibration record numbers are 16 bit values.
    pub const MAX_CAPACITY: usize = u16::MAX as usize;

    pub fn with_e2e_crc(mut self, enabled: bool) -> Self {
        if enabled {
            self.features.insert(Feature::E2eCrc)
        } else {
            self.features.remove(Feature::E2eCrc)
        }

        self
    }

    pub fn is_e2e_crc(&self) -> bool {
        self.features.contains(Feature::E2eCrc)
    }

    /// Check the handles and the store capacities
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.handles.validate()?;

        for capacity in [self.record_capacity, self.specific_ops.calibration_capacity] {
            if capacity > Self::MAX_CAPACITY {
                return Err(ConfigError::CapacityTooLarge(capacity));
            }
        }

        Ok(())
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            handles: CharacteristicHandles::default(),
            features: default_features(),
            type_sample_location: TypeSampleLocation::default(),
            record_capacity: RecordStore::DEFAULT_CAPACITY,
            demo_records: true,
            session_stopped: false,
            session_run_time: 14 * 24,
            specific_ops: Configuration::default(),
        }
    }
}
