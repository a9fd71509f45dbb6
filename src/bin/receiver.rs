//! Reference receiver: connects to a sender and validates the frame stream

use anyhow::{Context, Result};
use clap::Parser;
use std::collections::BTreeMap;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};
use supercam_stream::wire::{FrameReader, ReceivedFrame};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "supercam-receiver")]
#[command(about = "Connect to a supercam sender and report per-camera frame statistics")]
#[command(version)]
struct Cli {
    /// Sender host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Sender port
    #[arg(short, long, default_value_t = 9000)]
    port: u16,

    /// Connect timeout in seconds
    #[arg(short, long, default_value_t = 5)]
    timeout: u64,

    /// Log statistics every N frames (0 = never)
    #[arg(long, default_value_t = 120)]
    log_every: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Default)]
struct SourceStats {
    frames: u64,
    bytes: u64,
    /// Sequence numbers skipped by the sender (overwritten frames)
    skipped: u64,
    last_sequence: Option<u32>,
}

impl SourceStats {
    fn record(&mut self, frame: &ReceivedFrame) {
        let seq = frame.header.sequence;
        if let Some(last) = self.last_sequence {
            if seq > last {
                self.skipped += u64::from(seq - last - 1);
            } else {
                warn!(
                    source = %frame.header.source_id,
                    last = %last,
                    seq = %seq,
                    "Sequence went backwards"
                );
            }
        }
        self.last_sequence = Some(seq);
        self.frames += 1;
        self.bytes += frame.payload.len() as u64;
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    fmt().with_env_filter(filter).with_target(false).init();

    let addr = resolve(&cli.host, cli.port)?;
    let stream = TcpStream::connect_timeout(&addr, Duration::from_secs(cli.timeout))
        .with_context(|| format!("failed to connect to {}", addr))?;
    info!(addr = %addr, "Connected");

    let mut reader = FrameReader::new(stream);
    let mut sources: BTreeMap<u16, SourceStats> = BTreeMap::new();
    let mut window_start = Instant::now();
    let mut window_frames = 0u64;

    // Any validation failure propagates: disconnect and exit non-zero
    while let Some(frame) = reader.read_frame().context("invalid frame stream")? {
        sources.entry(frame.header.source_id).or_default().record(&frame);
        window_frames += 1;

        if cli.log_every > 0 && reader.frames_read() % cli.log_every == 0 {
            let elapsed = window_start.elapsed().as_secs_f64();
            let fps = if elapsed > 0.0 {
                window_frames as f64 / elapsed
            } else {
                0.0
            };
            info!(
                total = %reader.frames_read(),
                fps = %format!("{:.1}", fps),
                "Receive stats"
            );
            for (source, stats) in &sources {
                info!(
                    source = %source,
                    frames = %stats.frames,
                    skipped = %stats.skipped,
                    bytes = %stats.bytes,
                    "Source stats"
                );
            }

            window_start = Instant::now();
            window_frames = 0;
        }
    }

    info!(total = %reader.frames_read(), "Sender closed the stream");
    for (source, stats) in &sources {
        info!(
            source = %source,
            frames = %stats.frames,
            skipped = %stats.skipped,
            "Final source stats"
        );
    }

    Ok(())
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()
        .with_context(|| format!("failed to resolve {}", host))?
        .next()
        .with_context(|| format!("no address for {}", host))
}
