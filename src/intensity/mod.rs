use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod calc;
pub mod filter;
pub mod ring;

pub use calc::IntensityEstimator;
pub use filter::{composite_acceleration, AxisFilter};
pub use ring::RingBuffer;

/// Accelerometer axis, in the order samples are read each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// ADC channel index (0, 1, 2).
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
        };
        f.write_str(name)
    }
}

/// What the scheduler does when the sampling source cannot produce a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReadFailurePolicy {
    /// Stop the loop and return the error. No axis advances on the failed tick.
    #[default]
    FailFast,
    /// Reuse the axis's previous filtered value and keep running.
    HoldLast,
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigurationError {
    #[error("sampling rate must be > 0")]
    ZeroSamplingRate,
    #[error("intensity window must span at least one second")]
    ZeroWindow,
    #[error("percentile fraction must be finite and >= 0, got {0}")]
    InvalidPercentileFraction(f64),
    #[error("percentile rank {rank} is outside a window of {capacity} samples")]
    PercentileRankOutOfRange { rank: usize, capacity: usize },
    #[error("{0} must be a finite number")]
    NonFiniteConstant(&'static str),
}

/// Construction-time parameters of the intensity pipeline.
///
/// Defaults are the reference values for a KXR94-2050 behind a 12-bit MCP3204
/// sampled at 200 Hz.
#[derive(Debug, Clone, PartialEq)]
pub struct SeismometerConfig {
    pub sampling_rate_hz: u32,
    pub window_seconds: u32,
    pub percentile_fraction: f64,
    pub smoothing_retain: f32,
    pub smoothing_gain: f32,
    pub adc_to_gal: f32,
    pub intensity_multiplier: f64,
    pub intensity_offset: f64,
    pub read_failure: ReadFailurePolicy,
}

impl Default for SeismometerConfig {
    fn default() -> Self {
        Self {
            sampling_rate_hz: 200,
            window_seconds: 5,
            percentile_fraction: 0.3,
            smoothing_retain: 0.94,
            smoothing_gain: 0.06,
            adc_to_gal: 1.13426,
            intensity_multiplier: 2.0,
            intensity_offset: 0.94,
            read_failure: ReadFailurePolicy::FailFast,
        }
    }
}

impl SeismometerConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.sampling_rate_hz == 0 {
            return Err(ConfigurationError::ZeroSamplingRate);
        }
        if self.window_seconds == 0 {
            return Err(ConfigurationError::ZeroWindow);
        }
        if !self.percentile_fraction.is_finite() || self.percentile_fraction < 0.0 {
            return Err(ConfigurationError::InvalidPercentileFraction(
                self.percentile_fraction,
            ));
        }

        let finite_f32 = [
            ("smoothing_retain", self.smoothing_retain),
            ("smoothing_gain", self.smoothing_gain),
            ("adc_to_gal", self.adc_to_gal),
        ];
        for (name, value) in finite_f32 {
            if !value.is_finite() {
                return Err(ConfigurationError::NonFiniteConstant(name));
            }
        }
        if !self.intensity_multiplier.is_finite() {
            return Err(ConfigurationError::NonFiniteConstant("intensity_multiplier"));
        }
        if !self.intensity_offset.is_finite() {
            return Err(ConfigurationError::NonFiniteConstant("intensity_offset"));
        }

        let rank = self.percentile_rank();
        let capacity = self.window_capacity();
        if rank >= capacity {
            return Err(ConfigurationError::PercentileRankOutOfRange { rank, capacity });
        }
        Ok(())
    }

    /// Samples held by each axis's offset history (one second).
    pub fn history_capacity(&self) -> usize {
        self.sampling_rate_hz as usize
    }

    /// Samples held by the composite-acceleration window.
    pub fn window_capacity(&self) -> usize {
        self.sampling_rate_hz as usize * self.window_seconds as usize
    }

    /// Index into the descending window: `floor(fraction * rate)`, scaled by the
    /// per-second rate rather than the window length.
    pub fn percentile_rank(&self) -> usize {
        // Nudge so products like 0.3 * 10 = 2.9999999999999996 floor to 3.
        (self.percentile_fraction * self.sampling_rate_hz as f64 + 1e-9).floor() as usize
    }

    /// Target duration of one tick.
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.sampling_rate_hz.max(1) as f64)
    }
}

/// One tick's result, handed to the consumer through the overwrite channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntensityEvent {
    pub frame: u32,
    pub intensity: f64,
    /// Filtered per-axis acceleration in Gal, ordered X, Y, Z.
    pub acceleration: [f32; 3],
    pub composite: f32,
    pub timestamp: DateTime<Utc>,
    /// Set once the intensity window has been filled with real samples.
    pub warmed_up: bool,
}

impl IntensityEvent {
    pub fn shindo_class(&self) -> &'static str {
        shindo_class(self.intensity)
    }
}

/// JMA seismic intensity class for a computed scale value.
pub fn shindo_class(intensity: f64) -> &'static str {
    if intensity < 0.5 { "0" }
    else if intensity < 1.5 { "1" }
    else if intensity < 2.5 { "2" }
    else if intensity < 3.5 { "3" }
    else if intensity < 4.5 { "4" }
    else if intensity < 5.0 { "5-" }
    else if intensity < 5.5 { "5+" }
    else if intensity < 6.0 { "6-" }
    else if intensity < 6.5 { "6+" }
    else { "7" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_config_is_valid() {
        let config = SeismometerConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.history_capacity(), 200);
        assert_eq!(config.window_capacity(), 1000);
        assert_eq!(config.percentile_rank(), 60);
        assert_eq!(config.period(), Duration::from_millis(5));
    }

    #[test]
    fn test_percentile_rank_floors_without_float_drift() {
        let config = SeismometerConfig {
            sampling_rate_hz: 10,
            ..Default::default()
        };
        assert_eq!(config.percentile_rank(), 3);

        let config = SeismometerConfig {
            sampling_rate_hz: 105,
            ..Default::default()
        };
        // 31.5 floors, it does not round
        assert_eq!(config.percentile_rank(), 31);
    }

    #[test]
    fn test_rejects_zero_rate_and_window() {
        let config = SeismometerConfig {
            sampling_rate_hz: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigurationError::ZeroSamplingRate));

        let config = SeismometerConfig {
            window_seconds: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigurationError::ZeroWindow));
    }

    #[test]
    fn test_rejects_rank_outside_window() {
        let config = SeismometerConfig {
            window_seconds: 1,
            percentile_fraction: 1.0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigurationError::PercentileRankOutOfRange {
                rank: 200,
                capacity: 200
            })
        );
    }

    #[test]
    fn test_rejects_bad_constants() {
        let config = SeismometerConfig {
            percentile_fraction: -0.1,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidPercentileFraction(_))
        ));

        let config = SeismometerConfig {
            adc_to_gal: f32::NAN,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigurationError::NonFiniteConstant("adc_to_gal"))
        );
    }

    #[test]
    fn test_shindo_class_boundaries() {
        assert_eq!(shindo_class(-3.0), "0");
        assert_eq!(shindo_class(0.49), "0");
        assert_eq!(shindo_class(0.5), "1");
        assert_eq!(shindo_class(2.94), "3");
        assert_eq!(shindo_class(4.5), "5-");
        assert_eq!(shindo_class(5.2), "5+");
        assert_eq!(shindo_class(5.9), "6-");
        assert_eq!(shindo_class(6.4), "6+");
        assert_eq!(shindo_class(7.1), "7");
    }
}
