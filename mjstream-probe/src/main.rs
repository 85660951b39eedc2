//! Headless latency probe — entry point.
//!
//! Connects to a running server, emits ticks at a fixed rate, and
//! measures the span from tick to reassembled frame. The tick's
//! `frame_time` is the probe's own clock, so each completed frame
//! carries its request timestamp back and latency is a simple
//! subtraction — no clock sync needed.
//!
//! ```text
//! mjstream-probe                          Probe localhost defaults
//! mjstream-probe --addr <ip:port>         Target server
//! mjstream-probe --fps 30 --duration 20   Rate and run length
//! ```

use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use mjstream_core::{StreamError, Tick, ViewClient};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "mjstream-probe", about = "Motion-JPEG latency probe")]
struct Cli {
    /// Server address.
    #[arg(short, long, default_value = "127.0.0.1:7333")]
    addr: String,

    /// Ticks per second.
    #[arg(short, long, default_value_t = 60.0)]
    fps: f64,

    /// Run length in seconds.
    #[arg(short, long, default_value_t = 10)]
    duration: u64,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("mjstream-probe v{}", env!("CARGO_PKG_VERSION"));

    let client = ViewClient::connect(&cli.addr).await?;
    let spec = client.spec();
    info!(
        addr = %cli.addr,
        width = spec.width,
        height = spec.height,
        fps = cli.fps,
        "connected"
    );

    let mut frames = client.frames();
    let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / cli.fps));
    let deadline = tokio::time::Instant::now() + Duration::from_secs(cli.duration);
    let start = Instant::now();

    let mut next_frame_id = 1u64;
    let mut sent = 0u64;
    let mut skipped = 0u64;
    let mut displayed = 0u64;
    let mut latency_sum_ms = 0.0;
    let mut last_logged_rate = 0.0;

    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => break,

            _ = ticker.tick() => {
                let now_ms = start.elapsed().as_secs_f64() * 1000.0;
                let tick = Tick {
                    frame_id: next_frame_id,
                    frame_time: now_ms,
                    circle_time: now_ms,
                };
                next_frame_id += 1;

                match client.send_tick(tick).await {
                    Ok(()) => sent += 1,
                    Err(StreamError::ServerBusy { buffered }) => {
                        skipped += 1;
                        debug!(buffered, "transport backed up, tick skipped");
                    }
                    Err(e) => {
                        error!("tick failed: {e}");
                        break;
                    }
                }
            },

            changed = frames.changed() => {
                if changed.is_err() {
                    warn!("connection lost");
                    break;
                }
                let Some(frame) = frames.borrow_and_update().clone() else {
                    continue;
                };

                let now_ms = start.elapsed().as_secs_f64() * 1000.0;
                let latency_ms = now_ms - frame.header.frame_time;
                displayed += 1;
                latency_sum_ms += latency_ms;
                debug!(frame = frame.frame_id(), latency_ms = format_args!("{latency_ms:.1}"), "frame");

                // Windowed stats change once per closed window; log each
                // new window at info.
                let stats = frame.header;
                if stats.frame_rate > 0.0 && stats.frame_rate != last_logged_rate {
                    last_logged_rate = stats.frame_rate;
                    info!(
                        frame_rate = format_args!("{:.1}", stats.frame_rate),
                        bandwidth_mbit = format_args!("{:.2}", stats.bandwidth),
                        render_ms = format_args!("{:.1}", stats.render_duration),
                        compress_ms = format_args!("{:.1}", stats.compress_duration),
                        transmit_ms = format_args!("{:.1}", stats.transmit_duration),
                        frame_ms = format_args!("{:.1}", stats.frame_duration),
                        "window"
                    );
                }
            },
        }
    }

    client.close();

    let mean_latency = if displayed > 0 {
        latency_sum_ms / displayed as f64
    } else {
        f64::NAN
    };
    info!(
        sent,
        skipped,
        displayed,
        mean_latency_ms = format_args!("{mean_latency:.1}"),
        "probe finished"
    );
    Ok(())
}
