//! Stream header (28 bytes, big-endian)
//!
//! ```text
//!  0               4       5       6               8
//! +---------------+-------+-------+---------------+
//! |     magic     |version| codec |     flags     |
//! +---------------+-------+-------+---------------+
//! |   source id   |   reserved    |  sequence ... |
//! +---------------+---------------+---------------+
//! | ... sequence  |          timestamp (us) ...   |
//! +---------------+-------------------------------+
//! | ... timestamp |         payload size          |
//! +---------------+-------------------------------+
//! ```

use super::WireError;
use crate::frame::CapturedFrame;

/// "GSVC"
pub const STREAM_MAGIC: u32 = 0x4753_5643;
pub const STREAM_VERSION: u8 = 1;
pub const CODEC_JPEG: u8 = 1;
pub const HEADER_SIZE: usize = 28;

/// Largest payload a receiver accepts (1 MiB)
pub const MAX_PAYLOAD_SIZE: u32 = 1024 * 1024;

/// Decoded stream header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireHeader {
    pub magic: u32,
    pub version: u8,
    pub codec: u8,
    pub flags: u16,
    pub source_id: u16,
    pub reserved: u16,
    pub sequence: u32,
    pub timestamp_us: u64,
    pub payload_size: u32,
}

impl WireHeader {
    /// Header describing `frame`
    ///
    /// Fails if the payload exceeds `MAX_PAYLOAD_SIZE`.
    pub fn for_frame(frame: &CapturedFrame) -> Result<Self, WireError> {
        if frame.payload.len() > MAX_PAYLOAD_SIZE as usize {
            return Err(WireError::PayloadTooLarge {
                size: frame.payload.len(),
                max: MAX_PAYLOAD_SIZE as usize,
            });
        }

        Ok(Self {
            magic: STREAM_MAGIC,
            version: STREAM_VERSION,
            codec: CODEC_JPEG,
            flags: 0,
            source_id: frame.source_id,
            reserved: 0,
            sequence: frame.sequence,
            timestamp_us: frame.timestamp_us,
            payload_size: frame.payload.len() as u32,
        })
    }

    /// Serializes to the fixed 28-byte layout
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];

        out[0..4].copy_from_slice(&self.magic.to_be_bytes());
        out[4] = self.version;
        out[5] = self.codec;
        out[6..8].copy_from_slice(&self.flags.to_be_bytes());
        out[8..10].copy_from_slice(&self.source_id.to_be_bytes());
        out[10..12].copy_from_slice(&self.reserved.to_be_bytes());
        out[12..16].copy_from_slice(&self.sequence.to_be_bytes());
        out[16..24].copy_from_slice(&self.timestamp_us.to_be_bytes());
        out[24..28].copy_from_slice(&self.payload_size.to_be_bytes());

        out
    }

    /// Parses without validation
    pub fn from_bytes(data: &[u8; HEADER_SIZE]) -> Self {
        let u16_at = |i: usize| u16::from_be_bytes([data[i], data[i + 1]]);
        let u32_at = |i: usize| u32::from_be_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]);

        let mut ts = [0u8; 8];
        ts.copy_from_slice(&data[16..24]);

        Self {
            magic: u32_at(0),
            version: data[4],
            codec: data[5],
            flags: u16_at(6),
            source_id: u16_at(8),
            reserved: u16_at(10),
            sequence: u32_at(12),
            timestamp_us: u64::from_be_bytes(ts),
            payload_size: u32_at(24),
        }
    }

    /// Parses and validates magic, version, codec and payload size
    pub fn decode(data: &[u8; HEADER_SIZE]) -> Result<Self, WireError> {
        let header = Self::from_bytes(data);
        header.validate()?;
        Ok(header)
    }

    pub fn validate(&self) -> Result<(), WireError> {
        if self.magic != STREAM_MAGIC {
            return Err(WireError::InvalidMagic(self.magic));
        }
        if self.version != STREAM_VERSION {
            return Err(WireError::UnsupportedVersion(self.version));
        }
        if self.codec != CODEC_JPEG {
            return Err(WireError::UnsupportedCodec(self.codec));
        }
        if self.payload_size > MAX_PAYLOAD_SIZE {
            return Err(WireError::PayloadTooLarge {
                size: self.payload_size as usize,
                max: MAX_PAYLOAD_SIZE as usize,
            });
        }
        Ok(())
    }
}
