use std::f64::consts::PI;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::intensity::Axis;

/// Largest count of the reference 12-bit converter.
pub const ADC_MAX: u16 = 4095;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SampleReadError {
    #[error("ADC read failed on {axis} axis: {reason}")]
    Device { axis: Axis, reason: String },
    #[error("sample source exhausted on {axis} axis")]
    Exhausted { axis: Axis },
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("replay file {0:?} contains no samples")]
    Empty(PathBuf),
}

/// Raw per-channel ADC access. One call per axis per tick, in X, Y, Z order.
pub trait SampleSource {
    fn read_axis(&mut self, axis: Axis) -> Result<u16, SampleReadError>;
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn read_axis(&mut self, axis: Axis) -> Result<u16, SampleReadError> {
        (**self).read_axis(axis)
    }
}

/// Synthetic burst added on top of the resting signal.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticQuake {
    pub start_secs: f64,
    pub duration_secs: f64,
    /// Peak amplitude in ADC counts on the horizontal axes.
    pub amplitude: f64,
    pub frequency_hz: f64,
}

/// Accelerometer at rest around the ADC midpoint, with deterministic noise and an
/// optional quake. Used when no hardware is attached.
#[derive(Debug, Clone)]
pub struct SimulatedSource {
    sample_rate: f64,
    midpoint: f64,
    noise: f64,
    quake: Option<SyntheticQuake>,
    reads: [u64; 3],
}

impl SimulatedSource {
    pub fn new(sample_rate: u32, midpoint: u16, noise: f64) -> Self {
        Self {
            sample_rate: f64::from(sample_rate.max(1)),
            midpoint: f64::from(midpoint),
            noise,
            quake: None,
            reads: [0; 3],
        }
    }

    pub fn with_quake(mut self, quake: SyntheticQuake) -> Self {
        self.quake = Some(quake);
        self
    }

    fn sample_at(&self, axis: Axis, n: u64) -> f64 {
        let t = n as f64 / self.sample_rate;
        let phase = axis.index() as f64 * 2.1;

        let noise = self.noise
            * (0.6 * (n as f64 * 1.3 + phase).sin() + 0.4 * (n as f64 * 7.9 + phase).sin());

        let shake = match &self.quake {
            Some(q) if t >= q.start_secs && t < q.start_secs + q.duration_secs => {
                let progress = (t - q.start_secs) / q.duration_secs;
                let envelope = (PI * progress).sin();
                // Vertical motion is weaker than horizontal.
                let scale = if axis == Axis::Z { 0.5 } else { 1.0 };
                scale * q.amplitude * envelope * (2.0 * PI * q.frequency_hz * t + phase).sin()
            }
            _ => 0.0,
        };

        self.midpoint + noise + shake
    }
}

impl SampleSource for SimulatedSource {
    fn read_axis(&mut self, axis: Axis) -> Result<u16, SampleReadError> {
        let n = self.reads[axis.index()];
        self.reads[axis.index()] += 1;
        let value = self.sample_at(axis, n).round().clamp(0.0, f64::from(ADC_MAX));
        Ok(value as u16)
    }
}

#[derive(Debug, Deserialize)]
struct ReplayRow {
    x: u16,
    y: u16,
    z: u16,
}

/// Replays recorded raw counts from a CSV file with an `x,y,z` header.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    rows: Vec<[u16; 3]>,
    cursors: [usize; 3],
    looped: bool,
}

impl ReplaySource {
    pub fn from_path(path: &Path, looped: bool) -> Result<Self, SourceError> {
        let mut rdr = csv::Reader::from_path(path)?;
        let mut rows = Vec::new();
        for record in rdr.deserialize() {
            let row: ReplayRow = record?;
            rows.push([row.x, row.y, row.z]);
        }
        let source = Self::from_rows(rows, looped);
        if source.is_empty() {
            return Err(SourceError::Empty(path.to_path_buf()));
        }
        info!(
            "Loaded {} replay samples from {:?} (loop={})",
            source.len(),
            path,
            looped
        );
        Ok(source)
    }

    pub fn from_rows(rows: Vec<[u16; 3]>, looped: bool) -> Self {
        Self {
            rows,
            cursors: [0; 3],
            looped,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl SampleSource for ReplaySource {
    fn read_axis(&mut self, axis: Axis) -> Result<u16, SampleReadError> {
        let cursor = &mut self.cursors[axis.index()];
        if *cursor >= self.rows.len() {
            if !self.looped || self.rows.is_empty() {
                return Err(SampleReadError::Exhausted { axis });
            }
            *cursor = 0;
        }
        let value = self.rows[*cursor][axis.index()];
        *cursor += 1;
        Ok(value)
    }
}
