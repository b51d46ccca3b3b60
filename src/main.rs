use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::time::Duration;
use tokio::net::TcpListener;

use page_tracker_rs::config::{FusionConfig, ServerConfig};
use page_tracker_rs::sensors::{MockSource, SampleSource};
use page_tracker_rs::server;
use page_tracker_rs::session::Session;
use page_tracker_rs::tracker::{fusion_channels, Tracker};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum SensorKind {
    /// No physical source; only the simulation driver advances position
    None,
    /// Synthetic sweep through the full fusion path
    Mock,
}

#[derive(Parser, Debug)]
#[command(name = "page_tracker")]
#[command(about = "Glove position server - fuses orientation into a page position and streams it", long_about = None)]
struct Args {
    /// Address to accept consumers on
    #[arg(long, default_value = "127.0.0.1:8765")]
    bind: String,

    /// Simulation step in milliseconds
    #[arg(long, default_value = "400")]
    tick_ms: u64,

    /// Position source feeding the fusion loop
    #[arg(long, value_enum, default_value = "none")]
    sensor: SensorKind,

    /// Fusion sample interval in milliseconds
    #[arg(long, default_value = "50")]
    sample_ms: u64,

    /// Gyro trust coefficient of the complementary filter
    #[arg(long, default_value = "0.95")]
    alpha: f32,

    /// Degrees of combined movement per character
    #[arg(long, default_value = "5.0")]
    scale: f32,

    /// Do not capture the origin from the first fused sample
    #[arg(long)]
    no_auto_calibrate: bool,

    /// Use the simulation driver even when a calibrated sensor is attached
    #[arg(long)]
    force_simulation: bool,

    /// Per-frame write timeout towards a consumer, in milliseconds
    #[arg(long, default_value = "2000")]
    send_timeout_ms: u64,

    /// Events buffered per consumer before it is dropped as stalled
    #[arg(long, default_value = "64")]
    client_queue: usize,
}

impl Args {
    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            bind: self.bind.clone(),
            tick: Duration::from_millis(self.tick_ms.max(1)),
            send_timeout: Duration::from_millis(self.send_timeout_ms.max(1)),
            client_queue: self.client_queue,
            force_simulation: self.force_simulation,
        }
    }

    fn fusion_config(&self) -> FusionConfig {
        let sample_interval = Duration::from_millis(self.sample_ms.max(1));
        FusionConfig {
            alpha: self.alpha,
            scale: self.scale,
            sample_interval,
            read_timeout: sample_interval.mul_f32(0.8),
            auto_calibrate: !self.no_auto_calibrate,
            ..FusionConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let server_config = args.server_config();
    let fusion_config = args.fusion_config();

    log::info!("Page Tracker starting");
    log::info!("  Bind: {}", server_config.bind);
    log::info!("  Tick: {:?}", server_config.tick);
    log::info!("  Sensor: {:?}", args.sensor);

    let source: Option<Box<dyn SampleSource>> = match args.sensor {
        SensorKind::None => None,
        SensorKind::Mock => Some(Box::new(MockSource::new(fusion_config.sample_interval.as_secs_f32()))),
    };

    let session = match source {
        Some(source) => {
            let (link, control) = fusion_channels();
            let session = Session::new(&server_config, Some(link));
            let tracker = Tracker::new(source, fusion_config);
            tokio::spawn(tracker.run(session.clone(), control));
            session
        }
        None => Session::new(&server_config, None),
    };

    let listener = TcpListener::bind(&server_config.bind)
        .await
        .with_context(|| format!("binding {}", server_config.bind))?;

    tokio::select! {
        result = server::serve(listener, session, server_config.send_timeout) => result,
        _ = tokio::signal::ctrl_c() => {
            log::info!("Shutting down");
            Ok(())
        }
    }
}
