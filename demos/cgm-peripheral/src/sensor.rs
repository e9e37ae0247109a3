//! A simulated glucose sensor

use cgms::core::{SFloat, SensorStatus};
use cgms::racp::record::GlucoseRecord;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// The lowest and highest concentrations the simulated sensor can measure in mg/dL
const RANGE: (i16, i16) = (40, 400);

pub struct Sensor {
    rng: StdRng,
    concentration: i16,
    time_offset: u16,
    interval: u16,
}

impl Sensor {
    /// Create a new sensor
    ///
    /// A measurement is made every `interval` minutes starting from `time_offset`.
    pub fn new(seed: Option<u64>, time_offset: u16, interval: u16) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Sensor {
            rng,
            concentration: 110,
            time_offset,
            interval: interval.max(1),
        }
    }

    /// Make the next measurement
    ///
    /// The trend is the rate of change in tenths of mg/dL per minute.
    pub fn measure(&mut self) -> GlucoseRecord {
        let previous = self.concentration;

        self.concentration = (previous + self.rng.gen_range(-12..=12)).clamp(RANGE.0, RANGE.1);

        self.time_offset = self.time_offset.wrapping_add(self.interval);

        let trend = (self.concentration - previous) * 10 / self.interval as i16;

        let quality = self.rng.gen_range(80..=100);

        let concentration = SFloat::new(self.concentration, 0).unwrap_or(SFloat::NRES);

        let mut record = GlucoseRecord::new(concentration, self.time_offset)
            .with_trend(SFloat::new(trend, -1).unwrap_or(SFloat::NRES))
            .with_quality(SFloat::new(quality, 0).unwrap_or(SFloat::NRES));

        if self.concentration == RANGE.0 {
            record = record.with_annunciation(SensorStatus::ResultLowerThanDeviceCanProcess)
        } else if self.concentration == RANGE.1 {
            record = record.with_annunciation(SensorStatus::ResultHigherThanDeviceCanProcess)
        }

        record
    }
}
