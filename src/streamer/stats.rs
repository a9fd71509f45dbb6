//! Streaming statistics

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters shared between capture threads and the server thread
#[derive(Debug, Default)]
pub struct StreamCounters {
    captured: AtomicU64,
    sent: AtomicU64,
    bytes_sent: AtomicU64,
    oversized_skipped: AtomicU64,
    clients_served: AtomicU64,
}

impl StreamCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_captured(&self) {
        self.captured.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one sent frame of `bytes` bytes (header included)
    pub fn record_sent(&self, bytes: usize) -> u64 {
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
        self.sent.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_oversized(&self) {
        self.oversized_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_client(&self) {
        self.clients_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frames_sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Point-in-time copy; overwrites are tracked by the multiplexer
    pub fn snapshot(&self, frames_overwritten: u64) -> StreamerStats {
        StreamerStats {
            frames_captured: self.captured.load(Ordering::Relaxed),
            frames_sent: self.sent.load(Ordering::Relaxed),
            frames_overwritten,
            oversized_skipped: self.oversized_skipped.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            clients_served: self.clients_served.load(Ordering::Relaxed),
        }
    }
}

/// Statistics for the TCP frame streamer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamerStats {
    /// Frames produced by all capture threads
    pub frames_captured: u64,

    /// Frames fully written to a client
    pub frames_sent: u64,

    /// Frames replaced in the multiplexer before being sent
    pub frames_overwritten: u64,

    /// Frames skipped for exceeding the payload limit
    pub oversized_skipped: u64,

    /// Total bytes written, headers included
    pub bytes_sent: u64,

    /// Client connections accepted
    pub clients_served: u64,
}

impl StreamerStats {
    /// Calculates frame rate based on delta
    pub fn calculate_fps(&self, previous: &Self, elapsed_secs: f64) -> f64 {
        if elapsed_secs == 0.0 {
            return 0.0;
        }

        let frames_delta = self.frames_sent.saturating_sub(previous.frames_sent);
        frames_delta as f64 / elapsed_secs
    }

    /// Calculates bitrate in kbps based on delta
    pub fn calculate_bitrate_kbps(&self, previous: &Self, elapsed_secs: f64) -> f64 {
        if elapsed_secs == 0.0 {
            return 0.0;
        }

        let bytes_delta = self.bytes_sent.saturating_sub(previous.bytes_sent);
        (bytes_delta as f64 * 8.0) / elapsed_secs / 1000.0
    }

    /// Share of captured frames that never reached the wire because a newer one replaced them
    pub fn overwrite_rate(&self) -> f64 {
        if self.frames_captured == 0 {
            return 0.0;
        }

        self.frames_overwritten as f64 / self.frames_captured as f64
    }
}
