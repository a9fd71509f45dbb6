//! Single-client TCP frame streamer

mod pacer;
mod stats;

pub use pacer::FramePacer;
pub use stats::{StreamCounters, StreamerStats};

use crate::mux::FrameMultiplexer;
use crate::wire::{WireError, WireHeader};
use std::io::{self, ErrorKind, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// How often the accept loop re-checks the shutdown flag
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Error, Debug)]
pub enum StreamerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Configuration for the TCP streamer
#[derive(Debug, Clone)]
pub struct StreamerConfig {
    pub bind: String,
    pub port: u16,
    /// 0 = unlimited
    pub max_fps: u32,
    /// Log aggregate stats every N sent frames (0 = never)
    pub log_every: u64,
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 9000,
            max_fps: 0,
            log_every: 120,
        }
    }
}

/// Why a client session ended
#[derive(Debug)]
enum ClientEnd {
    Stopped,
    WriteFailed(io::Error),
}

/// Listening socket plus the accept/send loop
///
/// One client is served at a time; the next connection is accepted only after
/// the current one ends.
pub struct StreamServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: StreamerConfig,
}

impl StreamServer {
    /// Binds and listens on `config.bind:config.port`
    pub fn bind(config: StreamerConfig) -> Result<Self, StreamerError> {
        let addr = format!("{}:{}", config.bind, config.port);
        let listener = TcpListener::bind(&addr).map_err(|source| StreamerError::Bind {
            addr: addr.clone(),
            source,
        })?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        info!(
            addr = %local_addr,
            max_fps = %config.max_fps,
            log_every = %config.log_every,
            "Stream server listening"
        );

        Ok(Self {
            listener,
            local_addr,
            config,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn config(&self) -> &StreamerConfig {
        &self.config
    }

    /// Accepts and serves clients until `shutdown` is set
    ///
    /// Accept and client errors are logged and never end the loop.
    pub fn run(&self, mux: &FrameMultiplexer, counters: &StreamCounters, shutdown: &AtomicBool) {
        while !shutdown.load(Ordering::SeqCst) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nonblocking(false) {
                        warn!(peer = %peer, error = %e, "Failed to set blocking mode for client");
                        continue;
                    }

                    counters.record_client();
                    info!(peer = %peer, "Client connected");

                    match self.serve_client(stream, mux, counters) {
                        ClientEnd::Stopped => info!(peer = %peer, "Client closed: stream stopped"),
                        ClientEnd::WriteFailed(e) => {
                            info!(peer = %peer, error = %e, "Client disconnected")
                        }
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => {
                    error!(error = %e, "Accept failed");
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }

        let stats = counters.snapshot(mux.dropped_count());
        info!(
            sent = %stats.frames_sent,
            clients = %stats.clients_served,
            "Stream server stopped"
        );
    }

    fn serve_client(
        &self,
        mut stream: TcpStream,
        mux: &FrameMultiplexer,
        counters: &StreamCounters,
    ) -> ClientEnd {
        let mut pacer = FramePacer::new(self.config.max_fps);
        let mut last_report = (Instant::now(), counters.snapshot(mux.dropped_count()));

        loop {
            let Some(frame) = mux.wait_next() else {
                return ClientEnd::Stopped;
            };

            let header = match WireHeader::for_frame(&frame) {
                Ok(header) => header,
                Err(WireError::PayloadTooLarge { size, max }) => {
                    counters.record_oversized();
                    warn!(
                        source = %frame.source_id,
                        seq = %frame.sequence,
                        size = %size,
                        max = %max,
                        "Skipping oversized frame"
                    );
                    continue;
                }
                Err(e) => {
                    debug!(error = %e, "Skipping unencodable frame");
                    continue;
                }
            };

            pacer.wait();

            let encoded = header.encode();
            if let Err(e) = stream
                .write_all(&encoded)
                .and_then(|_| stream.write_all(&frame.payload))
            {
                return ClientEnd::WriteFailed(e);
            }

            let sent = counters.record_sent(encoded.len() + frame.payload.len());

            if self.config.log_every > 0 && sent % self.config.log_every == 0 {
                let now = Instant::now();
                let stats = counters.snapshot(mux.dropped_count());
                let elapsed = now.duration_since(last_report.0).as_secs_f64();

                info!(
                    captured = %stats.frames_captured,
                    sent = %stats.frames_sent,
                    overwritten = %stats.frames_overwritten,
                    fps = %format!("{:.1}", stats.calculate_fps(&last_report.1, elapsed)),
                    kbps = %format!("{:.0}", stats.calculate_bitrate_kbps(&last_report.1, elapsed)),
                    "Stream stats"
                );

                last_report = (now, stats);
            }
        }
    }
}
