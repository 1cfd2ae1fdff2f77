//! # AMR Decoder
//!
//! Replays a captured line-sample stream through the receiver and prints
//! every accepted SCM, SCM+ and IDM record as a JSON line.
//!
//! A blocking thread plays the role of the bit-clock interrupt, feeding
//! samples at the configured rate. The async runtime plays the poll loop,
//! draining the frame ring on a fixed interval.

use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use amr_decoder::amr::protocol::{AmrMessage, MessageKind};
use amr_decoder::config::{Config, LoggingConfig};
use amr_decoder::receiver::{BitSampler, Dispatcher, Receiver};

/// Configuration file used when none is given on the command line
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Replay batch length; the sampler thread sleeps between batches
const BATCH_PERIOD_MS: u64 = 1;

/// One output line
#[derive(Serialize)]
struct RecordLine<'a> {
    received_at: String,
    kind: String,
    raw: String,
    message: &'a AmrMessage,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;

    // Keep the guard alive so the file writer flushes on exit
    let _log_guard = init_logging(&config.logging);

    info!("AMR Decoder v{} starting...", env!("CARGO_PKG_VERSION"));

    let samples = load_capture(&config.capture.path)?;
    info!(
        "Loaded {} samples from {} ({:.1} s at {} Hz)",
        samples.len(),
        config.capture.path,
        samples.len() as f64 / config.capture.bit_rate_hz as f64,
        config.capture.bit_rate_hz
    );

    let mut receiver = Receiver::new(config.receiver.ring_capacity);
    receiver.set_enabled(config.receiver.start_enabled);
    if !receiver.is_enabled() {
        warn!("Receiver starts disabled; no records will be decoded");
    }
    receiver.register_callback(emit_record);

    let (sampler, mut dispatcher) = receiver.split();

    let stop = Arc::new(AtomicBool::new(false));
    let replay_stop = Arc::clone(&stop);
    let bit_rate_hz = config.capture.bit_rate_hz;
    let mut replay_task =
        tokio::task::spawn_blocking(move || replay(sampler, &samples, bit_rate_hz, &replay_stop));

    let mut drain_interval = interval(Duration::from_millis(config.dispatch.drain_interval_ms));
    let stats_enabled = config.dispatch.stats_interval_s > 0;
    let mut stats_interval = interval(Duration::from_secs(config.dispatch.stats_interval_s.max(1)));
    // The first tick fires immediately
    stats_interval.tick().await;

    let mut dropped: u64 = 0;
    let mut replay_done = false;

    info!("Press Ctrl+C to exit");

    loop {
        tokio::select! {
            _ = drain_interval.tick() => {
                dispatcher.process_messages();
                dropped += dispatcher.overflow_count() as u64;
            }

            _ = stats_interval.tick(), if stats_enabled => {
                log_stats(&dispatcher, dropped);
            }

            result = &mut replay_task => {
                replay_done = true;
                match result {
                    Ok(fed) => info!("Replay finished after {} samples", fed),
                    Err(e) => warn!("Replay thread failed: {}", e),
                }
                break;
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                stop.store(true, Ordering::Relaxed);
                break;
            }
        }
    }

    if !replay_done {
        if let Err(e) = replay_task.await {
            warn!("Replay thread failed: {}", e);
        }
    }

    dispatcher.process_messages();
    dropped += dispatcher.overflow_count() as u64;
    log_stats(&dispatcher, dropped);

    Ok(())
}

/// Install the tracing subscriber
///
/// `RUST_LOG` overrides the configured level. With a log directory set,
/// events also go to a daily rolling file.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
    };

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    if config.log_dir.is_empty() {
        tracing_subscriber::registry()
            .with(filter())
            .with(stderr_layer)
            .init();
        return None;
    }

    let appender = tracing_appender::rolling::daily(&config.log_dir, "amr-decoder.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(filter())
        .with(stderr_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer),
        )
        .init();

    Some(guard)
}

/// Read a capture file of ASCII '0'/'1' samples
fn load_capture<P: AsRef<Path>>(path: P) -> Result<Vec<bool>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read capture {}", path.display()))?;
    Ok(parse_samples(&text))
}

/// Samples from '0'/'1' characters; every other byte is ignored
fn parse_samples(text: &str) -> Vec<bool> {
    text.bytes()
        .filter_map(|b| match b {
            b'0' => Some(false),
            b'1' => Some(true),
            _ => None,
        })
        .collect()
}

/// Feed samples at `bit_rate_hz`, one batch per millisecond
///
/// Returns the number of samples fed before finishing or being stopped.
fn replay(mut sampler: BitSampler, samples: &[bool], bit_rate_hz: u32, stop: &AtomicBool) -> usize {
    let batch = ((bit_rate_hz as u64 * BATCH_PERIOD_MS) / 1000).max(1) as usize;
    let start = Instant::now();
    let mut fed = 0;

    for chunk in samples.chunks(batch) {
        if stop.load(Ordering::Relaxed) {
            break;
        }

        for &sample in chunk {
            sampler.process_bit(sample);
        }
        fed += chunk.len();

        // Pace against the start time so sleep jitter does not accumulate
        let due = start + Duration::from_secs_f64(fed as f64 / bit_rate_hz as f64);
        let now = Instant::now();
        if due > now {
            std::thread::sleep(due - now);
        }
    }

    fed
}

fn emit_record(message: &AmrMessage, kind: MessageKind, raw: &[u8]) {
    match record_line(message, kind, raw) {
        Ok(line) => {
            let mut stdout = std::io::stdout().lock();
            if let Err(e) = writeln!(stdout, "{}", line) {
                warn!("Failed to write record: {}", e);
            }
        }
        Err(e) => warn!("Failed to serialize {} record: {}", kind, e),
    }
}

fn record_line(message: &AmrMessage, kind: MessageKind, raw: &[u8]) -> serde_json::Result<String> {
    let line = RecordLine {
        received_at: Utc::now().to_rfc3339(),
        kind: kind.to_string(),
        raw: raw.iter().map(|b| format!("{:02x}", b)).collect(),
        message,
    };
    serde_json::to_string(&line)
}

fn log_stats(dispatcher: &Dispatcher, dropped: u64) {
    let stats = dispatcher.stats();
    info!(
        "Accepted {} records ({} checksum failures, {} unknown, {} malformed, {} dropped)",
        stats.accepted, stats.crc_failures, stats.unknown_kind, stats.malformed, dropped
    );
    debug!("Dispatch stats: {:?}", stats);
}
