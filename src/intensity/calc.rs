use crate::intensity::{RingBuffer, SeismometerConfig};

/// Rolling-window intensity from composite accelerations.
///
/// The window holds `window_seconds * rate` samples and the reported value is the
/// sample at `percentile_rank` in the descending order, which rejects short spikes
/// in favour of sustained shaking:
///
/// ```text
/// I = multiplier * log10(a) + offset     (a > 0)
/// I = 0                                  (a <= 0)
/// ```
#[derive(Debug, Clone)]
pub struct IntensityEstimator {
    window: RingBuffer<f32>,
    percentile_rank: usize,
    multiplier: f64,
    offset: f64,
    intensity: f64,
}

impl IntensityEstimator {
    /// Build from a validated config.
    pub fn new(config: &SeismometerConfig) -> Self {
        Self::with_window(
            config.window_capacity(),
            config.percentile_rank(),
            config.intensity_multiplier,
            config.intensity_offset,
        )
    }

    /// # Panics
    ///
    /// Panics if `capacity` is zero or `percentile_rank >= capacity`.
    pub fn with_window(capacity: usize, percentile_rank: usize, multiplier: f64, offset: f64) -> Self {
        assert!(
            percentile_rank < capacity,
            "percentile rank {} outside window of {}",
            percentile_rank,
            capacity
        );
        Self {
            window: RingBuffer::new(capacity),
            percentile_rank,
            multiplier,
            offset,
            intensity: 0.0,
        }
    }

    /// Push one composite acceleration (Gal) and return the updated intensity.
    pub fn update(&mut self, composite: f32) -> f64 {
        self.window.push(composite);
        let pick = self.pick();

        self.intensity = if pick > 0.0 {
            self.multiplier * f64::from(pick).log10() + self.offset
        } else {
            0.0
        };
        self.intensity
    }

    /// Value at the configured rank of the current window.
    pub fn pick(&self) -> f32 {
        self.window.sorted_descending()[self.percentile_rank]
    }

    pub fn intensity(&self) -> f64 {
        self.intensity
    }

    pub fn percentile_rank(&self) -> usize {
        self.percentile_rank
    }

    pub fn capacity(&self) -> usize {
        self.window.capacity()
    }
}
