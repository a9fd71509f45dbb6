//! Camera capture: transport reads, reassembly and per-source capture threads

pub mod fragment;
mod reassembler;
mod transport;
#[cfg(feature = "usb")]
pub mod usb;

pub use reassembler::{CaptureEvent, Reassembler, ReassemblerStats};
pub use transport::{PacketSource, ReplayItem, ReplayTransport, TransportError};

use crate::frame::CapturedFrame;
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("camera setup failed at {stage}: {reason}")]
    Setup { stage: &'static str, reason: String },

    #[error("camera index {index} not found (available: {available})")]
    DeviceNotFound { index: u16, available: usize },

    #[error("failed to spawn capture thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Why a capture session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Stopped,
    DeviceGone,
}

/// Capture tuning
#[derive(Debug, Clone, Default)]
pub struct CaptureOptions {
    /// Sleep after a transient (non-timeout) transport error; zero retries immediately
    pub retry_backoff: Duration,
}

/// Lazy sequence of frames read from one transport
///
/// The stop flag is checked before every read. When the session ends, by stop
/// request or device loss, the in-progress frame is flushed as the final item
/// (it may be truncated).
pub struct CaptureSession<T: PacketSource> {
    transport: T,
    reassembler: Reassembler,
    stop: Arc<AtomicBool>,
    options: CaptureOptions,
    buf: Vec<u8>,
    end: Option<SessionEnd>,
}

impl<T: PacketSource> CaptureSession<T> {
    pub fn new(transport: T, reassembler: Reassembler, stop: Arc<AtomicBool>) -> Self {
        Self {
            transport,
            reassembler,
            stop,
            options: CaptureOptions::default(),
            buf: Vec::with_capacity(0x400),
            end: None,
        }
    }

    pub fn with_options(mut self, options: CaptureOptions) -> Self {
        self.options = options;
        self
    }

    /// Set once the session is over
    pub fn end_reason(&self) -> Option<SessionEnd> {
        self.end
    }

    pub fn reassembler(&self) -> &Reassembler {
        &self.reassembler
    }

    /// Returns the parts so a new session can be started on the same transport
    pub fn into_parts(self) -> (T, Reassembler) {
        (self.transport, self.reassembler)
    }

    fn finish(&mut self, reason: SessionEnd) -> Option<CapturedFrame> {
        self.end = Some(reason);
        self.reassembler.flush()
    }
}

impl<T: PacketSource> Iterator for CaptureSession<T> {
    type Item = CapturedFrame;

    fn next(&mut self) -> Option<CapturedFrame> {
        if self.end.is_some() {
            return None;
        }

        loop {
            if self.stop.load(Ordering::Relaxed) {
                return self.finish(SessionEnd::Stopped);
            }

            match self.transport.read_packet(&mut self.buf) {
                Ok(_) => {
                    if let Some(frame) = self.reassembler.handle_packet(&self.buf) {
                        return Some(frame);
                    }
                }
                Err(TransportError::Timeout) => {}
                Err(TransportError::DeviceGone) => {
                    warn!(
                        source = %self.reassembler.source_id(),
                        device = %self.transport.describe(),
                        "Device gone"
                    );
                    return self.finish(SessionEnd::DeviceGone);
                }
                Err(TransportError::Other(reason)) => {
                    debug!(source = %self.reassembler.source_id(), %reason, "Transport read failed, retrying");
                    if !self.options.retry_backoff.is_zero() {
                        thread::sleep(self.options.retry_backoff);
                    }
                }
            }
        }
    }
}

/// Statistics for one capture thread
#[derive(Debug, Clone, Default)]
pub struct CaptureStats {
    pub frames_captured: u64,
    pub is_running: bool,
}

/// Running capture thread for one source
pub struct CaptureHandle {
    source_id: u16,
    stop: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    frame_count: Arc<AtomicU64>,
    thread: Option<JoinHandle<()>>,
}

impl CaptureHandle {
    /// Spawns the capture thread
    ///
    /// Every completed frame is handed to `sink`. `on_exit` runs on the capture
    /// thread after the final flush, whatever ended the session.
    pub fn spawn<S, F>(
        source_id: u16,
        transport: Box<dyn PacketSource>,
        options: CaptureOptions,
        events: Option<Sender<CaptureEvent>>,
        mut sink: S,
        on_exit: F,
    ) -> Result<Self, CaptureError>
    where
        S: FnMut(CapturedFrame) + Send + 'static,
        F: FnOnce() + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let running = Arc::new(AtomicBool::new(true));
        let frame_count = Arc::new(AtomicU64::new(0));

        let mut reassembler = Reassembler::new(source_id);
        if let Some(events) = events {
            reassembler = reassembler.with_events(events);
        }

        let device = transport.describe();
        let session =
            CaptureSession::new(transport, reassembler, Arc::clone(&stop)).with_options(options);

        let thread_running = Arc::clone(&running);
        let thread_count = Arc::clone(&frame_count);

        let thread = thread::Builder::new()
            .name(format!("capture-{}", source_id))
            .spawn(move || {
                info!(source = %source_id, device = %device, "Capture started");

                let mut session = session;
                for frame in session.by_ref() {
                    thread_count.fetch_add(1, Ordering::Relaxed);
                    sink(frame);
                }

                let stats = session.reassembler().stats().clone();
                match session.end_reason() {
                    Some(SessionEnd::DeviceGone) => error!(
                        source = %source_id,
                        frames = %stats.frames_emitted,
                        "Capture ended: device gone"
                    ),
                    _ => info!(
                        source = %source_id,
                        frames = %stats.frames_emitted,
                        rejected = %stats.fragments_rejected,
                        "Capture stopped"
                    ),
                }

                thread_running.store(false, Ordering::Relaxed);
                on_exit();
            })?;

        Ok(Self {
            source_id,
            stop,
            running,
            frame_count,
            thread: Some(thread),
        })
    }

    pub fn source_id(&self) -> u16 {
        self.source_id
    }

    /// Flag checked by the thread before every read; setting it stops the capture
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Asks the thread to stop before its next read
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn get_stats(&self) -> CaptureStats {
        CaptureStats {
            frames_captured: self.frame_count.load(Ordering::Relaxed),
            is_running: self.is_running(),
        }
    }

    /// Waits for the thread to exit
    pub fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!(source = %self.source_id, "Capture thread panicked");
            }
        }
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.request_stop();
        self.join();
    }
}
