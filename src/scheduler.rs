use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::intensity::{
    composite_acceleration, Axis, AxisFilter, ConfigurationError, IntensityEstimator,
    IntensityEvent, ReadFailurePolicy, SeismometerConfig,
};
use crate::sink::{event_channel, EventReceiver, EventSink};
use crate::source::{SampleReadError, SampleSource};

#[derive(Debug, Error, PartialEq)]
pub enum SchedulerError {
    #[error("sampling halted: {0}")]
    SampleRead(#[from] SampleReadError),
}

/// Observational tick counter. When an increment would overflow `u32`, the
/// counter continues from `(u32::MAX + 1) mod sampling_rate`, so `frame %
/// sampling_rate` stays continuous across the wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCounter {
    value: u32,
    modulus: u32,
}

impl FrameCounter {
    pub fn new(sampling_rate_hz: u32) -> Self {
        Self::starting_at(0, sampling_rate_hz)
    }

    pub fn starting_at(value: u32, sampling_rate_hz: u32) -> Self {
        Self {
            value,
            modulus: sampling_rate_hz.max(1),
        }
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    pub fn advance(&mut self) -> u32 {
        self.value = match self.value.checked_add(1) {
            Some(next) => next,
            None => ((u64::from(self.value) + 1) % u64::from(self.modulus)) as u32,
        };
        self.value
    }
}

/// Outcome of scheduling the next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pace {
    /// On time: wait this long before the next tick.
    Sleep(Duration),
    /// The target already passed by this much: run the next tick immediately.
    Behind(Duration),
}

/// Drift-compensated deadlines: each target is the previous target plus one
/// period, never `now + period`, so processing time does not lower the rate.
#[derive(Debug, Clone)]
pub struct Pacer {
    period: Duration,
    target: Instant,
}

impl Pacer {
    pub fn new(period: Duration, start: Instant) -> Self {
        Self {
            period,
            target: start,
        }
    }

    pub fn target(&self) -> Instant {
        self.target
    }

    pub fn advance(&mut self, now: Instant) -> Pace {
        self.target += self.period;
        match self.target.checked_duration_since(now) {
            Some(wait) => Pace::Sleep(wait),
            None => Pace::Behind(now.duration_since(self.target)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub ticks: u64,
    /// Ticks that finished after the next tick was already due.
    pub behind: u64,
    /// Axis reads that failed and were substituted under `HoldLast`.
    pub read_failures: u64,
}

/// Fixed-rate sampling loop: three axis filters, the composite magnitude, and the
/// intensity window, publishing one event per tick.
pub struct SamplingScheduler<S> {
    source: S,
    axes: [AxisFilter; 3],
    estimator: IntensityEstimator,
    frames: FrameCounter,
    policy: ReadFailurePolicy,
    period: Duration,
    sampling_rate_hz: u32,
    warm_after: u64,
    stats: SchedulerStats,
    sink: EventSink,
}

impl<S: SampleSource> SamplingScheduler<S> {
    /// Validate `config` and build the pipeline. Nothing is read from `source`
    /// until the first tick.
    pub fn new(
        config: &SeismometerConfig,
        source: S,
    ) -> Result<(Self, EventReceiver), ConfigurationError> {
        config.validate()?;

        info!(
            "Seismometer: rate={}Hz, window={}s ({} samples), rank={}, adc_to_gal={}, on_read_failure={:?}",
            config.sampling_rate_hz,
            config.window_seconds,
            config.window_capacity(),
            config.percentile_rank(),
            config.adc_to_gal,
            config.read_failure
        );

        let (sink, receiver) = event_channel();
        let scheduler = Self {
            source,
            axes: [
                AxisFilter::new(config),
                AxisFilter::new(config),
                AxisFilter::new(config),
            ],
            estimator: IntensityEstimator::new(config),
            frames: FrameCounter::new(config.sampling_rate_hz),
            policy: config.read_failure,
            period: config.period(),
            sampling_rate_hz: config.sampling_rate_hz,
            warm_after: config.window_capacity() as u64,
            stats: SchedulerStats::default(),
            sink,
        };
        Ok((scheduler, receiver))
    }

    /// Resume the frame counter from `frame` instead of zero.
    pub fn with_frame(mut self, frame: u32) -> Self {
        self.frames = FrameCounter::starting_at(frame, self.sampling_rate_hz);
        self
    }

    pub fn frame(&self) -> u32 {
        self.frames.value()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sink.subscribe()
    }

    /// Run one tick without waiting: read, filter, combine, estimate, publish.
    ///
    /// Under `FailFast` all three samples are read before any filter advances, so
    /// a failed tick leaves every axis untouched.
    pub fn tick(&mut self) -> Result<IntensityEvent, SampleReadError> {
        let frame = self.frames.advance();

        let mut samples = [None; 3];
        for axis in Axis::ALL {
            match self.source.read_axis(axis) {
                Ok(raw) => samples[axis.index()] = Some(raw),
                Err(e) => match self.policy {
                    ReadFailurePolicy::FailFast => return Err(e),
                    ReadFailurePolicy::HoldLast => {
                        self.stats.read_failures += 1;
                        warn!("Frame {}: {}. Holding previous {} value.", frame, e, axis);
                    }
                },
            }
        }

        let mut acceleration = [0.0_f32; 3];
        let outputs = self.axes.iter_mut().zip(samples).zip(acceleration.iter_mut());
        for ((filter, sample), out) in outputs {
            *out = match sample {
                Some(raw) => filter.update(raw),
                None => filter.filtered(),
            };
        }

        let composite = composite_acceleration(acceleration);
        let intensity = self.estimator.update(composite);
        self.stats.ticks += 1;

        let event = IntensityEvent {
            frame,
            intensity,
            acceleration,
            composite,
            timestamp: Utc::now(),
            warmed_up: self.stats.ticks >= self.warm_after,
        };
        self.sink.publish(event.clone());
        Ok(event)
    }

    /// Tick at the configured rate until the read policy halts the loop.
    ///
    /// Only returns on a fail-fast read error; stop it otherwise by dropping the
    /// future or the task that owns it.
    pub async fn run(&mut self) -> Result<(), SchedulerError> {
        let mut pacer = Pacer::new(self.period, Instant::now());
        info!("Sampling loop started, period {:?}", self.period);

        loop {
            if let Err(e) = self.tick() {
                error!("Sampling halted at frame {}: {}", self.frames.value(), e);
                return Err(e.into());
            }

            match pacer.advance(Instant::now()) {
                Pace::Sleep(wait) => tokio::time::sleep(wait).await,
                Pace::Behind(lag) => {
                    self.stats.behind += 1;
                    if (self.stats.behind - 1) % u64::from(self.sampling_rate_hz) == 0 {
                        debug!(
                            "Sampling loop {:?} behind schedule ({} late ticks so far)",
                            lag, self.stats.behind
                        );
                    }
                    tokio::task::yield_now().await;
                }
            }
        }
    }
}
