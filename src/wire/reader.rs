//! Blocking frame reader implementing the receiver side of the protocol

use super::header::{WireHeader, HEADER_SIZE};
use super::WireError;
use bytes::Bytes;
use std::io::{ErrorKind, Read};

/// One frame read off the wire
#[derive(Debug, Clone)]
pub struct ReceivedFrame {
    pub header: WireHeader,
    pub payload: Bytes,
}

/// Reads validated frames from any byte stream
pub struct FrameReader<R> {
    inner: R,
    frames_read: u64,
}

impl<R: Read> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            frames_read: 0,
        }
    }

    /// Reads the next frame
    ///
    /// Returns `Ok(None)` when the stream ends cleanly between frames. A header
    /// that fails validation is returned as an error without reading its payload.
    pub fn read_frame(&mut self) -> Result<Option<ReceivedFrame>, WireError> {
        let mut raw = [0u8; HEADER_SIZE];
        if !self.fill_header(&mut raw)? {
            return Ok(None);
        }

        let header = WireHeader::decode(&raw)?;

        let mut payload = vec![0u8; header.payload_size as usize];
        self.inner.read_exact(&mut payload).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => WireError::ConnectionClosed,
            _ => WireError::Io(e),
        })?;

        self.frames_read += 1;
        Ok(Some(ReceivedFrame {
            header,
            payload: Bytes::from(payload),
        }))
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// `false` on EOF before the first header byte
    fn fill_header(&mut self, raw: &mut [u8; HEADER_SIZE]) -> Result<bool, WireError> {
        let mut filled = 0;
        while filled < HEADER_SIZE {
            match self.inner.read(&mut raw[filled..]) {
                Ok(0) if filled == 0 => return Ok(false),
                Ok(0) => return Err(WireError::ConnectionClosed),
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(WireError::Io(e)),
            }
        }
        Ok(true)
    }
}
