use crate::intensity::{ReadFailurePolicy, SeismometerConfig};
use crate::source::SyntheticQuake;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use config::{Config, ConfigError, Environment, File};
use tracing::warn;

const SECTIONS: [&str; 6] = ["settings", "sampling", "filter", "intensity", "source", "report"];

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "lowercase")]
pub struct Settings {
    #[serde(alias = "SETTINGS")]
    pub settings: SettingsSection,
    #[serde(alias = "SAMPLING")]
    pub sampling: SamplingSettings,
    #[serde(alias = "FILTER")]
    pub filter: FilterSettings,
    #[serde(alias = "INTENSITY")]
    pub intensity: IntensitySettings,
    #[serde(alias = "SOURCE")]
    pub source: SourceSettings,
    #[serde(alias = "REPORT")]
    pub report: ReportSettings,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "lowercase")]
pub struct SettingsSection {
    #[serde(alias = "DEBUG")]
    pub debug: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "lowercase")]
pub struct SamplingSettings {
    #[serde(alias = "RATE_HZ")]
    pub rate_hz: u32,
    #[serde(alias = "WINDOW_SECONDS")]
    pub window_seconds: u32,
    #[serde(alias = "PERCENTILE_FRACTION")]
    pub percentile_fraction: f64,
    #[serde(alias = "READ_FAILURE")]
    pub read_failure: ReadFailurePolicy,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "lowercase")]
pub struct FilterSettings {
    #[serde(alias = "SMOOTHING_RETAIN")]
    pub smoothing_retain: f32,
    #[serde(alias = "SMOOTHING_GAIN")]
    pub smoothing_gain: f32,
    #[serde(alias = "ADC_TO_GAL")]
    pub adc_to_gal: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "lowercase")]
pub struct IntensitySettings {
    #[serde(alias = "MULTIPLIER")]
    pub multiplier: f64,
    #[serde(alias = "OFFSET")]
    pub offset: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Simulated,
    Replay,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "lowercase")]
pub struct SourceSettings {
    #[serde(alias = "KIND")]
    pub kind: SourceKind,
    #[serde(alias = "REPLAY_FILE")]
    pub replay_file: Option<PathBuf>,
    #[serde(alias = "REPLAY_LOOP")]
    pub replay_loop: bool,
    #[serde(alias = "MIDPOINT")]
    pub midpoint: u16,
    #[serde(alias = "NOISE")]
    pub noise: f64,
    #[serde(alias = "QUAKE_START_SECS")]
    pub quake_start_secs: Option<f64>,
    #[serde(alias = "QUAKE_DURATION_SECS")]
    pub quake_duration_secs: f64,
    #[serde(alias = "QUAKE_AMPLITUDE")]
    pub quake_amplitude: f64,
    #[serde(alias = "QUAKE_FREQUENCY")]
    pub quake_frequency: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Log,
    Json,
    Mqtt,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "lowercase")]
pub struct ReportSettings {
    #[serde(alias = "THRESHOLD")]
    pub threshold: f64,
    #[serde(alias = "INTERVAL_FRAMES")]
    pub interval_frames: u32,
    #[serde(alias = "FORMAT")]
    pub format: ReportFormat,
    #[serde(alias = "WAIT_FOR_WARMUP")]
    pub wait_for_warmup: bool,
    #[serde(alias = "BROKER")]
    pub broker: String,
    #[serde(alias = "PORT")]
    pub port: u16,
    #[serde(alias = "TOPIC")]
    pub topic: String,
}

impl Default for SettingsSection {
    fn default() -> Self {
        Self { debug: false }
    }
}

impl Default for SamplingSettings {
    fn default() -> Self {
        let core = SeismometerConfig::default();
        Self {
            rate_hz: core.sampling_rate_hz,
            window_seconds: core.window_seconds,
            percentile_fraction: core.percentile_fraction,
            read_failure: core.read_failure,
        }
    }
}

impl Default for FilterSettings {
    fn default() -> Self {
        let core = SeismometerConfig::default();
        Self {
            smoothing_retain: core.smoothing_retain,
            smoothing_gain: core.smoothing_gain,
            adc_to_gal: core.adc_to_gal,
        }
    }
}

impl Default for IntensitySettings {
    fn default() -> Self {
        let core = SeismometerConfig::default();
        Self {
            multiplier: core.intensity_multiplier,
            offset: core.intensity_offset,
        }
    }
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            kind: SourceKind::Simulated,
            replay_file: None,
            replay_loop: false,
            midpoint: 2048,
            noise: 1.5,
            quake_start_secs: None,
            quake_duration_secs: 20.0,
            quake_amplitude: 400.0,
            quake_frequency: 1.5,
        }
    }
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            interval_frames: 20,
            format: ReportFormat::Log,
            wait_for_warmup: true,
            broker: "localhost".to_string(),
            port: 1883,
            topic: "seismometer".to_string(),
        }
    }
}

impl SourceSettings {
    pub fn quake(&self) -> Option<SyntheticQuake> {
        self.quake_start_secs.map(|start_secs| SyntheticQuake {
            start_secs,
            duration_secs: self.quake_duration_secs,
            amplitude: self.quake_amplitude,
            frequency_hz: self.quake_frequency,
        })
    }
}

impl Settings {
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        // 1. Load defaults
        let default_settings = Settings::default();
        builder = builder.add_source(config::Config::try_from(&default_settings)?);

        // 2. Load from file if specified
        if let Some(path) = config_path {
            if path.exists() {
                builder = builder.add_source(File::from(path));
            } else {
                warn!("Configuration file not found: {:?}", path);
            }
        } else {
            // Standard search path
            if let Some(home) = dirs::home_dir() {
                let toml_path = home.join(".seismo").join("settings.toml");
                let yaml_path = home.join(".seismo").join("settings.yaml");

                if toml_path.exists() {
                    builder = builder.add_source(File::from(toml_path));
                } else if yaml_path.exists() {
                    builder = builder.add_source(File::from(yaml_path));
                }
            }
        }

        // 3. Environment variables
        builder = builder.add_source(
            Environment::with_prefix("SEISMO")
                .separator("__")
                .try_parsing(true)
        );

        let config = builder.build()?;

        if let Ok(serde_json::Value::Object(map)) = config.clone().try_deserialize() {
            for key in map.keys() {
                if !SECTIONS.iter().any(|known| known.eq_ignore_ascii_case(key)) {
                    warn!("Unknown configuration section: {}", key);
                }
            }
        }

        let settings: Settings = config.try_deserialize()?;
        // Reject an unusable pipeline here, before any source is opened.
        settings
            .seismometer_config()
            .validate()
            .map_err(|e| ConfigError::Message(format!("invalid seismometer settings: {}", e)))?;
        Ok(settings)
    }

    pub fn dump(&self, format: &str) -> Result<String, Box<dyn std::error::Error>> {
        match format.to_lowercase().as_str() {
            "toml" => Ok(toml::to_string_pretty(self)?),
            "yaml" | "yml" => Ok(serde_yaml::to_string(self)?),
            _ => Err("Unsupported format".into()),
        }
    }

    /// Core pipeline parameters. Validated when the scheduler is built.
    pub fn seismometer_config(&self) -> SeismometerConfig {
        SeismometerConfig {
            sampling_rate_hz: self.sampling.rate_hz,
            window_seconds: self.sampling.window_seconds,
            percentile_fraction: self.sampling.percentile_fraction,
            smoothing_retain: self.filter.smoothing_retain,
            smoothing_gain: self.filter.smoothing_gain,
            adc_to_gal: self.filter.adc_to_gal,
            intensity_multiplier: self.intensity.multiplier,
            intensity_offset: self.intensity.offset,
            read_failure: self.sampling.read_failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File as StdFile;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.sampling.rate_hz, 200);
        assert_eq!(settings.sampling.window_seconds, 5);
        assert_eq!(settings.report.interval_frames, 20);
        assert_eq!(settings.seismometer_config(), SeismometerConfig::default());
    }

    #[test]
    fn test_load_toml() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("settings.toml");
        let mut file = StdFile::create(&config_path).unwrap();
        writeln!(
            file,
            "[sampling]\nrate_hz = 100\nread_failure = \"hold_last\"\n[source]\nkind = \"replay\"\nreplay_file = \"quake.csv\""
        )
        .unwrap();

        let settings = Settings::new(Some(config_path)).unwrap();
        assert_eq!(settings.sampling.rate_hz, 100);
        assert_eq!(settings.sampling.read_failure, ReadFailurePolicy::HoldLast);
        assert_eq!(settings.sampling.window_seconds, 5);
        assert_eq!(settings.source.kind, SourceKind::Replay);
        assert_eq!(settings.source.replay_file, Some(PathBuf::from("quake.csv")));
        assert_eq!(settings.seismometer_config().percentile_rank(), 30);
    }

    #[test]
    fn test_load_yaml() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("settings.yaml");
        let mut file = StdFile::create(&config_path).unwrap();
        writeln!(
            file,
            "report:\n  threshold: 1.5\n  format: mqtt\n  broker: broker.local\n  topic: home/seismometer"
        )
        .unwrap();

        let settings = Settings::new(Some(config_path)).unwrap();
        assert_eq!(settings.report.threshold, 1.5);
        assert_eq!(settings.report.format, ReportFormat::Mqtt);
        assert_eq!(settings.report.broker, "broker.local");
        assert_eq!(settings.report.port, 1883);
        assert_eq!(settings.report.topic, "home/seismometer");
        assert_eq!(settings.filter.adc_to_gal, 1.13426);
    }

    #[test]
    fn test_dump_toml() {
        let settings = Settings::default();
        let dumped = settings.dump("toml").unwrap();
        assert!(dumped.contains("rate_hz = 200"));
        assert!(dumped.contains("read_failure = \"fail_fast\""));
        assert!(settings.dump("ini").is_err());
    }

    #[test]
    fn test_invalid_core_parameters_fail_to_load() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("settings.toml");
        let mut file = StdFile::create(&config_path).unwrap();
        writeln!(file, "[sampling]\npercentile_fraction = -0.1").unwrap();

        let err = Settings::new(Some(config_path)).unwrap_err();
        assert!(err.to_string().contains("invalid seismometer settings"), "{}", err);
    }

    #[test]
    fn test_quake_only_when_start_configured() {
        let mut source = SourceSettings::default();
        assert!(source.quake().is_none());
        source.quake_start_secs = Some(10.0);
        let quake = source.quake().unwrap();
        assert_eq!(quake.start_secs, 10.0);
        assert_eq!(quake.amplitude, 400.0);
    }
}
