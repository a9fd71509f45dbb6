//! Captured frame type shared by capture, buffering and the wire codec

use bytes::Bytes;
use std::time::{SystemTime, UNIX_EPOCH};

/// One complete (or flushed) frame produced by a reassembler
///
/// Cloning is cheap: the payload is reference counted and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    /// Encoded image payload (JPEG)
    pub payload: Bytes,

    /// Camera index assigned at startup
    pub source_id: u16,

    /// Per-source sequence number, starting at 0
    pub sequence: u32,

    /// Emission time in microseconds since the Unix epoch
    pub timestamp_us: u64,
}

impl CapturedFrame {
    /// Creates a frame stamped with the current wall-clock time
    pub fn new(source_id: u16, sequence: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            source_id,
            sequence,
            timestamp_us: now_us(),
        }
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Microseconds since the Unix epoch (0 if the clock is before the epoch)
pub fn now_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_frame_is_stamped() {
        let before = now_us();
        let frame = CapturedFrame::new(3, 7, vec![1u8, 2, 3]);
        let after = now_us();

        assert_eq!(frame.source_id, 3);
        assert_eq!(frame.sequence, 7);
        assert_eq!(frame.len(), 3);
        assert!(frame.timestamp_us >= before && frame.timestamp_us <= after);
    }

    #[test]
    fn test_clone_shares_payload() {
        let frame = CapturedFrame::new(0, 0, vec![0xFFu8; 64]);
        let copy = frame.clone();
        assert_eq!(frame.payload.as_ptr(), copy.payload.as_ptr());
    }
}
