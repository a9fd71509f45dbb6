//! Stream wire protocol: 28-byte header followed by the JPEG payload
//!
//! Receiver contract: read exactly `HEADER_SIZE` bytes, validate magic, version,
//! codec and payload size, then read exactly `payload_size` bytes. What to do on
//! a validation failure (disconnect or resynchronize) is up to the receiver.

mod header;
mod reader;

pub use header::{
    WireHeader, CODEC_JPEG, HEADER_SIZE, MAX_PAYLOAD_SIZE, STREAM_MAGIC, STREAM_VERSION,
};
pub use reader::{FrameReader, ReceivedFrame};

use crate::frame::CapturedFrame;
use bytes::{BufMut, BytesMut};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WireError {
    #[error("invalid stream magic 0x{0:08x}")]
    InvalidMagic(u32),

    #[error("unsupported stream version {0}")]
    UnsupportedVersion(u8),

    #[error("unsupported codec {0}")]
    UnsupportedCodec(u8),

    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("connection closed mid-frame")]
    ConnectionClosed,

    #[error("stream I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Appends header + payload for `frame` to `dst`
pub fn encode_frame(frame: &CapturedFrame, dst: &mut BytesMut) -> Result<(), WireError> {
    let header = WireHeader::for_frame(frame)?;

    dst.reserve(HEADER_SIZE + frame.payload.len());
    dst.put_slice(&header.encode());
    dst.put_slice(&frame.payload);

    Ok(())
}
