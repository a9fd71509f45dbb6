//! Multi-camera capture and single-client TCP streaming for USB endoscope cameras
//!
//! This library turns the fragmented bulk-transfer stream of one or more cameras into
//! complete JPEG frames and re-multiplexes them onto one TCP connection:
//! - Per-source frame reassembly from raw transport packets
//! - Latest-frame-per-source buffering with overwrite accounting
//! - A compact 28-byte big-endian wire header in front of every payload
//! - A one-client-at-a-time streaming server with optional rate limiting
//!
//! # Example
//!
//! ```no_run
//! use supercam_stream::capture::{ReplayTransport, PacketSource};
//! use supercam_stream::config::Config;
//! use supercam_stream::SenderApp;
//!
//! let config = Config::default();
//! let transports: Vec<Box<dyn PacketSource>> = vec![Box::new(ReplayTransport::new(vec![]))];
//! let app = SenderApp::start(&config, transports).unwrap();
//! println!("listening on {}", app.local_addr());
//! // ... connect a receiver
//! // app.shutdown_handle().shutdown();
//! ```

pub mod app;
pub mod capture;
pub mod config;
pub mod frame;
pub mod mux;
pub mod streamer;
pub mod wire;

// Re-exports for convenience
pub use app::{AppError, SenderApp, ShutdownHandle};
pub use capture::{CaptureEvent, CaptureHandle, CaptureSession, PacketSource, Reassembler};
pub use frame::CapturedFrame;
pub use mux::FrameMultiplexer;
pub use streamer::{StreamServer, StreamerConfig, StreamerStats};
pub use wire::{FrameReader, WireError, WireHeader};
