//! Sender pipeline: capture threads, multiplexer and stream server wired together

use crate::capture::{CaptureError, CaptureEvent, CaptureHandle, PacketSource};
use crate::config::{Config, ConfigError};
use crate::frame::CapturedFrame;
use crate::mux::FrameMultiplexer;
use crate::streamer::{StreamCounters, StreamServer, StreamerError, StreamerStats};
use crossbeam_channel::Receiver;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Streamer(#[from] StreamerError),

    #[error("no camera sources to capture from")]
    NoSources,

    #[error("too many camera sources ({0})")]
    TooManySources(usize),

    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Clonable trigger for the ordered stop
///
/// Sets the shutdown flag, asks every capture thread to stop and stops the
/// multiplexer so the server thread leaves `wait_next`.
#[derive(Clone)]
pub struct ShutdownHandle {
    shutdown: Arc<AtomicBool>,
    capture_stops: Vec<Arc<AtomicBool>>,
    mux: Arc<FrameMultiplexer>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        if !self.shutdown.swap(true, Ordering::SeqCst) {
            info!("Shutdown requested");
        }
        for stop in &self.capture_stops {
            stop.store(true, Ordering::Relaxed);
        }
        self.mux.stop();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

/// Running sender
pub struct SenderApp {
    captures: Vec<CaptureHandle>,
    server: Option<JoinHandle<StreamServer>>,
    events: Option<JoinHandle<()>>,
    local_addr: SocketAddr,
    handle: ShutdownHandle,
    mux: Arc<FrameMultiplexer>,
    counters: Arc<StreamCounters>,
}

impl SenderApp {
    /// Starts one capture thread per transport, then binds and starts the server
    ///
    /// Source ids are assigned by position in `transports`. When the last
    /// capture thread exits the whole sender shuts down. A bind failure stops
    /// the already running captures before the error is returned.
    pub fn start(config: &Config, transports: Vec<Box<dyn PacketSource>>) -> Result<Self, AppError> {
        config.validate()?;

        if transports.is_empty() {
            return Err(AppError::NoSources);
        }
        let source_count =
            u16::try_from(transports.len()).map_err(|_| AppError::TooManySources(transports.len()))?;

        let mux = Arc::new(FrameMultiplexer::new(source_count));
        let counters = Arc::new(StreamCounters::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let active = Arc::new(AtomicUsize::new(transports.len()));
        let (event_tx, event_rx) = crossbeam_channel::unbounded();

        let mut captures = Vec::with_capacity(transports.len());
        for (source_id, transport) in (0..source_count).zip(transports) {
            let sink = {
                let mux = Arc::clone(&mux);
                let counters = Arc::clone(&counters);
                move |frame: CapturedFrame| {
                    counters.record_captured();
                    mux.push(frame);
                }
            };

            let on_exit = {
                let mux = Arc::clone(&mux);
                let shutdown = Arc::clone(&shutdown);
                let active = Arc::clone(&active);
                move || {
                    if active.fetch_sub(1, Ordering::SeqCst) == 1 {
                        warn!("All capture sources ended, stopping stream");
                        shutdown.store(true, Ordering::SeqCst);
                        mux.stop();
                    }
                }
            };

            match CaptureHandle::spawn(
                source_id,
                transport,
                config.capture_options(),
                Some(event_tx.clone()),
                sink,
                on_exit,
            ) {
                Ok(handle) => captures.push(handle),
                Err(e) => {
                    abort(&mut captures, &mux, &shutdown);
                    return Err(e.into());
                }
            }
        }
        drop(event_tx);

        let handle = ShutdownHandle {
            shutdown: Arc::clone(&shutdown),
            capture_stops: captures.iter().map(CaptureHandle::stop_flag).collect(),
            mux: Arc::clone(&mux),
        };

        let server = match StreamServer::bind(config.streamer_config()) {
            Ok(server) => server,
            Err(e) => {
                error!(error = %e, "Stream server failed to start");
                abort(&mut captures, &mux, &shutdown);
                return Err(e.into());
            }
        };
        let local_addr = server.local_addr();

        let server_thread = {
            let mux = Arc::clone(&mux);
            let counters = Arc::clone(&counters);
            let shutdown = Arc::clone(&shutdown);
            thread::Builder::new()
                .name("stream-server".to_string())
                .spawn(move || {
                    server.run(&mux, &counters, &shutdown);
                    server
                })
        };
        let server_thread = match server_thread {
            Ok(thread) => thread,
            Err(source) => {
                abort(&mut captures, &mux, &shutdown);
                return Err(AppError::Spawn {
                    name: "stream-server",
                    source,
                });
            }
        };

        let events = match thread::Builder::new()
            .name("capture-events".to_string())
            .spawn(move || log_events(event_rx))
        {
            Ok(thread) => Some(thread),
            Err(e) => {
                warn!(error = %e, "Button events will not be logged");
                None
            }
        };

        info!(
            sources = %source_count,
            addr = %local_addr,
            "Sender started"
        );

        Ok(Self {
            captures,
            server: Some(server_thread),
            events,
            local_addr,
            handle,
            mux,
            counters,
        })
    }

    /// Address the server is listening on
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.handle.clone()
    }

    /// Live statistics
    pub fn stats(&self) -> StreamerStats {
        self.counters.snapshot(self.mux.dropped_count())
    }

    /// Blocks until shutdown, then joins the server and capture threads
    ///
    /// The listening socket is closed last.
    pub fn wait(mut self) -> StreamerStats {
        self.join_all()
    }

    fn join_all(&mut self) -> StreamerStats {
        let server = self.server.take().and_then(|thread| match thread.join() {
            Ok(server) => Some(server),
            Err(_) => {
                error!("Stream server thread panicked");
                None
            }
        });

        for capture in &mut self.captures {
            capture.join();
        }

        if let Some(events) = self.events.take() {
            if events.join().is_err() {
                error!("Event logger thread panicked");
            }
        }

        drop(server);

        let stats = self.stats();
        info!(
            captured = %stats.frames_captured,
            sent = %stats.frames_sent,
            overwritten = %stats.frames_overwritten,
            oversized = %stats.oversized_skipped,
            "Sender stopped"
        );
        stats
    }
}

impl Drop for SenderApp {
    fn drop(&mut self) {
        if self.server.is_some() {
            self.handle.shutdown();
            self.join_all();
        }
    }
}

/// Stops and joins whatever capture threads were started
fn abort(captures: &mut Vec<CaptureHandle>, mux: &FrameMultiplexer, shutdown: &AtomicBool) {
    shutdown.store(true, Ordering::SeqCst);
    for capture in captures.iter() {
        capture.request_stop();
    }
    mux.stop();
    for capture in captures.iter_mut() {
        capture.join();
    }
    captures.clear();
}

fn log_events(events: Receiver<CaptureEvent>) {
    for event in events.iter() {
        match event {
            CaptureEvent::ButtonPressed { source_id } => {
                info!(source = %source_id, "Camera button pressed")
            }
        }
    }
}
