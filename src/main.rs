use std::path::PathBuf;

use clap::Parser;
use seismo_rust::mqtt::{self, MqttPublisher};
use seismo_rust::reporter::Reporter;
use seismo_rust::scheduler::{SamplingScheduler, SchedulerError};
use seismo_rust::settings::{ReportFormat, Settings, SourceKind};
use seismo_rust::source::{ReplaySource, SampleReadError, SampleSource, SimulatedSource};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML or YAML settings file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the effective settings to this path and exit
    #[arg(long)]
    dump_config: Option<PathBuf>,

    /// Replay raw x,y,z counts from a CSV file instead of the configured source
    #[arg(short, long)]
    replay: Option<PathBuf>,

    /// Print one JSON object per report instead of log lines
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Publish reports to this MQTT broker instead of logging them
    #[arg(long)]
    broker: Option<String>,

    /// MQTT topic for published reports
    #[arg(long)]
    topic: Option<String>,

    /// Enable debug logging
    #[arg(short, long, default_value_t = false)]
    debug: bool,
}

fn build_source(settings: &Settings) -> Result<Box<dyn SampleSource + Send>, Box<dyn std::error::Error>> {
    match settings.source.kind {
        SourceKind::Replay => {
            let path = settings
                .source
                .replay_file
                .as_ref()
                .ok_or("source.kind = \"replay\" needs source.replay_file")?;
            Ok(Box::new(ReplaySource::from_path(path, settings.source.replay_loop)?))
        }
        SourceKind::Simulated => {
            let mut source = SimulatedSource::new(
                settings.sampling.rate_hz,
                settings.source.midpoint,
                settings.source.noise,
            );
            if let Some(quake) = settings.source.quake() {
                tracing::info!("Simulating a quake at {}s for {}s", quake.start_secs, quake.duration_secs);
                source = source.with_quake(quake);
            }
            Ok(Box::new(source))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let mut settings = Settings::new(args.config.clone())?;

    if args.debug {
        settings.settings.debug = true;
    }
    if args.json {
        settings.report.format = ReportFormat::Json;
    }
    if let Some(broker) = args.broker {
        settings.report.format = ReportFormat::Mqtt;
        settings.report.broker = broker;
    }
    if let Some(topic) = args.topic {
        settings.report.topic = topic;
    }
    if let Some(path) = args.replay {
        settings.source.kind = SourceKind::Replay;
        settings.source.replay_file = Some(path);
    }

    let default_level = if settings.settings.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Some(path) = args.dump_config {
        let format = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("toml")
            .to_string();
        std::fs::write(&path, settings.dump(&format)?)?;
        tracing::info!("Settings written to {:?}", path);
        return Ok(());
    }

    let source = build_source(&settings)?;
    let (mut scheduler, events) = SamplingScheduler::new(&settings.seismometer_config(), source)?;

    let (publisher, mqtt_handle) = match settings.report.format {
        ReportFormat::Mqtt => {
            let (publisher, eventloop) = MqttPublisher::new(&settings.report);
            tracing::info!(
                "Publishing to MQTT {}:{} topic {:?}",
                settings.report.broker,
                settings.report.port,
                publisher.topic()
            );
            (Some(publisher), Some(tokio::spawn(mqtt::drive(eventloop))))
        }
        _ => (None, None),
    };
    let broker_lost = async {
        match mqtt_handle {
            Some(handle) => handle.await,
            None => std::future::pending().await,
        }
    };

    let reporter = Reporter::new(settings.report.clone());
    let reporter_handle = tokio::spawn(reporter.run(events, publisher));

    let sampling = tokio::spawn(async move {
        let result = scheduler.run().await;
        (result, scheduler.stats())
    });

    tokio::select! {
        joined = sampling => {
            let (result, stats) = joined?;
            tracing::info!(
                "Sampling stopped after {} ticks ({} late, {} read failures held)",
                stats.ticks, stats.behind, stats.read_failures
            );
            match result {
                Err(SchedulerError::SampleRead(SampleReadError::Exhausted { .. })) => {
                    tracing::info!("Replay finished.");
                }
                Err(e) => {
                    reporter_handle.abort();
                    return Err(e.into());
                }
                Ok(()) => {}
            }
            // Scheduler dropped: the reporter drains the last event and exits.
            let _ = reporter_handle.await;
        }
        joined = broker_lost => {
            reporter_handle.abort();
            if let Err(e) = joined? {
                return Err(e.into());
            }
        }
        _ = shutdown_signal() => {
            reporter_handle.abort();
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, stopping seismometer...");
}
