use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::intensity::IntensityEvent;
use crate::mqtt::MqttPublisher;
use crate::settings::{ReportFormat, ReportSettings};
use crate::sink::EventReceiver;

/// JSON object per report: one line on stdout, or one MQTT message payload.
#[derive(Debug, Clone, Serialize)]
pub struct IntensityReport {
    pub frame: u32,
    pub seismic_scale: f64,
    pub shindo: &'static str,
    pub x_acceleration: f32,
    pub y_acceleration: f32,
    pub z_acceleration: f32,
    pub timestamp: DateTime<Utc>,
}

impl From<&IntensityEvent> for IntensityReport {
    fn from(event: &IntensityEvent) -> Self {
        let [x, y, z] = event.acceleration;
        Self {
            frame: event.frame,
            seismic_scale: event.intensity,
            shindo: event.shindo_class(),
            x_acceleration: x,
            y_acceleration: y,
            z_acceleration: z,
            timestamp: event.timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    Log(String),
    Json(String),
    Mqtt(String),
}

/// Throttled consumer of the event stream.
///
/// Events arrive as a latest-value stream, so throttling counts frames since the
/// last report instead of matching `frame % interval` exactly.
pub struct Reporter {
    settings: ReportSettings,
    last_frame: Option<u32>,
}

impl Reporter {
    pub fn new(settings: ReportSettings) -> Self {
        Self {
            settings,
            last_frame: None,
        }
    }

    fn due(&self, frame: u32) -> bool {
        match self.last_frame {
            None => true,
            Some(last) => frame.wrapping_sub(last) >= self.settings.interval_frames.max(1),
        }
    }

    /// Decide what, if anything, to emit for `event`.
    ///
    /// MQTT payloads are never sent before warm-up, whatever `wait_for_warmup` says.
    pub fn render(&mut self, event: &IntensityEvent) -> Option<Report> {
        let gate = self.settings.wait_for_warmup || self.settings.format == ReportFormat::Mqtt;
        if gate && !event.warmed_up {
            return None;
        }
        if !self.due(event.frame) {
            return None;
        }

        let report = match self.settings.format {
            ReportFormat::Log => {
                if event.intensity <= self.settings.threshold {
                    return None;
                }
                Report::Log(format!(
                    "Scale: {:.2} ({}) Frame: {}",
                    event.intensity,
                    event.shindo_class(),
                    event.frame
                ))
            }
            ReportFormat::Json => {
                let line = serde_json::to_string(&IntensityReport::from(event)).ok()?;
                Report::Json(line)
            }
            ReportFormat::Mqtt => {
                let payload = serde_json::to_string(&IntensityReport::from(event)).ok()?;
                Report::Mqtt(payload)
            }
        };
        self.last_frame = Some(event.frame);
        Some(report)
    }

    /// Consume events until the producer is gone. `publisher` receives the
    /// `Mqtt` reports and is required when the format is `mqtt`.
    pub async fn run(mut self, mut rx: EventReceiver, publisher: Option<MqttPublisher>) {
        info!(
            "Reporter started: format={:?}, threshold={}, every {} frames",
            self.settings.format, self.settings.threshold, self.settings.interval_frames
        );
        let mut refused = 0u64;
        while let Some(event) = rx.recv().await {
            match self.render(&event) {
                Some(Report::Log(line)) => info!("{}", line),
                Some(Report::Json(line)) => println!("{}", line),
                Some(Report::Mqtt(payload)) => match &publisher {
                    Some(publisher) => match publisher.publish(payload) {
                        Ok(()) => debug!("Published to {}: frame {}", publisher.topic(), event.frame),
                        Err(e) => {
                            refused += 1;
                            if refused % 100 == 1 {
                                warn!("MQTT publish refused ({} so far): {}", refused, e);
                            }
                        }
                    },
                    None => warn!("MQTT report for frame {} dropped: no publisher", event.frame),
                },
                None => {}
            }
        }
        if let Some(publisher) = &publisher {
            publisher.disconnect().await;
        }
        debug!("Event stream closed, reporter exiting");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(frame: u32, intensity: f64, warmed_up: bool) -> IntensityEvent {
        IntensityEvent {
            frame,
            intensity,
            acceleration: [1.0, -2.0, 0.5],
            composite: 2.29,
            timestamp: Utc::now(),
            warmed_up,
        }
    }

    #[test]
    fn test_log_respects_threshold_and_interval() {
        let mut reporter = Reporter::new(ReportSettings::default());
        assert_eq!(reporter.render(&event(1, 0.4, true)), None);

        let first = reporter.render(&event(2, 3.1, true));
        assert_eq!(first, Some(Report::Log("Scale: 3.10 (3) Frame: 2".to_string())));

        // Throttled until 20 frames have passed.
        assert_eq!(reporter.render(&event(21, 3.1, true)), None);
        assert!(reporter.render(&event(22, 3.1, true)).is_some());
    }

    #[test]
    fn test_waits_for_warmup() {
        let mut reporter = Reporter::new(ReportSettings::default());
        assert_eq!(reporter.render(&event(5, 4.0, false)), None);

        let mut eager = Reporter::new(ReportSettings {
            wait_for_warmup: false,
            ..Default::default()
        });
        assert!(eager.render(&event(5, 4.0, false)).is_some());
    }

    #[test]
    fn test_json_report_ignores_threshold() {
        let mut reporter = Reporter::new(ReportSettings {
            format: ReportFormat::Json,
            ..Default::default()
        });
        let Some(Report::Json(line)) = reporter.render(&event(40, 0.1, true)) else {
            panic!("expected a JSON report");
        };
        let v: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(v["frame"], 40);
        assert_eq!(v["seismic_scale"], 0.1);
        assert_eq!(v["shindo"], "0");
        assert_eq!(v["y_acceleration"], -2.0);
    }

    #[test]
    fn test_mqtt_payload_waits_for_warmup_and_ignores_threshold() {
        let mut reporter = Reporter::new(ReportSettings {
            format: ReportFormat::Mqtt,
            wait_for_warmup: false,
            ..Default::default()
        });
        assert_eq!(reporter.render(&event(10, 0.1, false)), None);

        let Some(Report::Mqtt(payload)) = reporter.render(&event(11, 0.1, true)) else {
            panic!("expected an MQTT payload");
        };
        let v: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(v["seismic_scale"], 0.1);
        assert_eq!(v["x_acceleration"], 1.0);
        assert_eq!(v["y_acceleration"], -2.0);
        assert_eq!(v["z_acceleration"], 0.5);

        // Throttled like the other formats.
        assert_eq!(reporter.render(&event(12, 4.0, true)), None);
    }

    #[test]
    fn test_interval_counts_frames_since_last_report() {
        let mut reporter = Reporter::new(ReportSettings::default());
        // Frames 7 and 27 are not multiples of 20, yet both are reported.
        assert!(reporter.render(&event(7, 2.0, true)).is_some());
        assert_eq!(reporter.render(&event(20, 2.0, true)), None);
        assert!(reporter.render(&event(27, 2.0, true)).is_some());
    }

    #[test]
    fn test_interval_survives_frame_wrap() {
        let mut reporter = Reporter::new(ReportSettings::default());
        assert!(reporter.render(&event(u32::MAX - 5, 2.0, true)).is_some());
        assert!(reporter.render(&event(96, 2.0, true)).is_some());
    }
}
