use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::time::Duration;

use page_tracker_rs::backoff::Backoff;
use page_tracker_rs::braille::Actuator;
use page_tracker_rs::client::{ClientEvent, PositionClient};
use page_tracker_rs::protocol::{Command, ServerEvent};

#[derive(Parser, Debug)]
#[command(name = "reader")]
#[command(about = "Headless reading consumer - follows the glove position and drives the braille cell", long_about = None)]
struct Args {
    /// Plain-text file to read
    #[arg(value_name = "TEXT_FILE")]
    text: PathBuf,

    /// Position server endpoint
    #[arg(long, default_value = "ws://127.0.0.1:8765")]
    url: String,

    /// Device or file receiving one cell byte per position
    #[arg(long)]
    actuator: Option<PathBuf>,

    /// Send a calibrate command before starting
    #[arg(long)]
    calibrate: bool,

    /// Start the position driver once the text is loaded
    #[arg(long)]
    start: bool,

    /// Initial reconnect delay in milliseconds
    #[arg(long, default_value = "2000")]
    retry_ms: u64,

    /// Handshake and per-command send timeout in milliseconds
    #[arg(long, default_value = "5000")]
    timeout_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let text: Vec<char> = std::fs::read_to_string(&args.text)
        .with_context(|| format!("reading {}", args.text.display()))?
        .chars()
        .collect();
    if text.is_empty() {
        anyhow::bail!("{} is empty", args.text.display());
    }

    let mut actuator = match &args.actuator {
        Some(path) => Actuator::new(
            OpenOptions::new()
                .write(true)
                .open(path)
                .with_context(|| format!("opening actuator {}", path.display()))?,
        ),
        None => Actuator::disconnected(),
    };

    let total = total_chars(text.len()).with_context(|| format!("loading {}", args.text.display()))?;

    let backoff = Backoff::new(Duration::from_millis(args.retry_ms.max(1)), Duration::from_secs(30));
    let io_timeout = Duration::from_millis(args.timeout_ms.max(1));
    let mut client = PositionClient::spawn_with_timeout(&args.url, backoff, io_timeout)?;

    // Queued until the first connection succeeds.
    client.send(Command::SetTotal { total })?;
    if args.calibrate {
        client.send(Command::Calibrate)?;
    }
    if args.start {
        client.send(Command::StartSim)?;
    }

    println!("[{}] Loaded {} chars, waiting for {}", ts_now(), text.len(), args.url);

    loop {
        tokio::select! {
            event = client.next_event() => match event {
                Some(ClientEvent::Connected) => println!("[{}] Connected", ts_now()),
                Some(ClientEvent::Disconnected) => println!("[{}] Disconnected, retrying", ts_now()),
                Some(ClientEvent::Server(ServerEvent::Position { position })) => {
                    show(&text, position, &mut actuator);
                }
                Some(ClientEvent::Server(ServerEvent::State { position, total_chars, .. })) => {
                    println!("[{}] Server at {}/{}", ts_now(), position, total_chars);
                    show(&text, position, &mut actuator);
                }
                Some(ClientEvent::Server(ServerEvent::Calibrated { .. })) => {
                    println!("[{}] Calibrated", ts_now());
                }
                Some(ClientEvent::Server(ServerEvent::Done)) => {
                    println!("[{}] ✔ Complete! Full text read.", ts_now());
                    break;
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                client.send(Command::StopSim)?;
                break;
            }
        }
    }

    if actuator.failures() > 0 {
        log::warn!("{} actuator writes failed", actuator.failures());
    }
    Ok(())
}

/// Character count as sent in `set_total`; texts past `u32::MAX` are refused.
fn total_chars(len: usize) -> Result<u32> {
    u32::try_from(len).with_context(|| format!("text has {} characters, more than a session can address", len))
}

fn show<W: std::io::Write>(text: &[char], position: u32, actuator: &mut Actuator<W>) {
    let index = (position as usize).min(text.len() - 1);
    let ch = text[index];
    let dots = actuator.show(ch);
    let shown = if ch.is_whitespace() { '␣' } else { ch };
    println!(
        "[{}] Char {}/{} '{}' dots {:06b} byte 0x{:02X}",
        ts_now(),
        index + 1,
        text.len(),
        shown,
        dots,
        dots
    );
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}
