use crate::intensity::{RingBuffer, SeismometerConfig};

/// Per-axis DC-offset removal and smoothing.
///
/// The offset is a trailing one-second mean of raw counts, so slow drift such as
/// gravity misalignment is tracked. The smoothed value is a single-pole low-pass:
///
/// ```text
/// offset   = sum(history) / capacity
/// smoothed = smoothed * retain + raw * gain
/// filtered = (smoothed - offset) * adc_to_gal
/// ```
#[derive(Debug, Clone)]
pub struct AxisFilter {
    history: RingBuffer<f32>,
    smoothed: f32,
    filtered: f32,
    retain: f32,
    gain: f32,
    adc_to_gal: f32,
}

impl AxisFilter {
    pub fn new(config: &SeismometerConfig) -> Self {
        Self {
            history: RingBuffer::new(config.history_capacity()),
            smoothed: 0.0,
            filtered: 0.0,
            retain: config.smoothing_retain,
            gain: config.smoothing_gain,
            adc_to_gal: config.adc_to_gal,
        }
    }

    /// Feed one raw ADC count and return the filtered acceleration in Gal.
    pub fn update(&mut self, raw: u16) -> f32 {
        let raw = f32::from(raw);
        self.history.push(raw);

        let offset = self.history.sum() / self.history.capacity() as f32;
        self.smoothed = self.smoothed * self.retain + raw * self.gain;
        self.filtered = (self.smoothed - offset) * self.adc_to_gal;
        self.filtered
    }

    /// Last value returned by `update`.
    pub fn filtered(&self) -> f32 {
        self.filtered
    }

    pub fn smoothed(&self) -> f32 {
        self.smoothed
    }
}

/// Euclidean norm of the three filtered axis accelerations.
pub fn composite_acceleration(axes: [f32; 3]) -> f32 {
    let [x, y, z] = axes;
    (x * x + y * y + z * z).sqrt()
}
