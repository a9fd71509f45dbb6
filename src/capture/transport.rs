//! Raw packet transport abstraction

use std::collections::VecDeque;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Bounded wait expired without data; retry
    #[error("read timed out")]
    Timeout,

    /// The device disappeared; the capture loop must end
    #[error("device gone")]
    DeviceGone,

    /// Any other transient read failure; retry
    #[error("transport error: {0}")]
    Other(String),
}

/// Source of raw camera packets
///
/// Implementations block for a bounded time per read.
pub trait PacketSource: Send {
    /// Reads the next packet into `buf` (replacing its contents), returns its length
    fn read_packet(&mut self, buf: &mut Vec<u8>) -> Result<usize, TransportError>;

    /// Human readable device description for logs
    fn describe(&self) -> String {
        "packet source".to_string()
    }
}

impl<T: PacketSource + ?Sized> PacketSource for Box<T> {
    fn read_packet(&mut self, buf: &mut Vec<u8>) -> Result<usize, TransportError> {
        (**self).read_packet(buf)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Scripted read results for replay
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayItem {
    Packet(Vec<u8>),
    Error(TransportError),
}

/// Plays back a fixed sequence of packets, then reports the device as gone
///
/// Useful for running the full pipeline without hardware.
pub struct ReplayTransport {
    items: VecDeque<ReplayItem>,
    name: String,
}

impl ReplayTransport {
    pub fn new(packets: Vec<Vec<u8>>) -> Self {
        Self::from_items(packets.into_iter().map(ReplayItem::Packet).collect())
    }

    pub fn from_items(items: Vec<ReplayItem>) -> Self {
        Self {
            items: items.into(),
            name: "replay".to_string(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Items not yet played back
    pub fn remaining(&self) -> usize {
        self.items.len()
    }
}

impl PacketSource for ReplayTransport {
    fn read_packet(&mut self, buf: &mut Vec<u8>) -> Result<usize, TransportError> {
        match self.items.pop_front() {
            Some(ReplayItem::Packet(packet)) => {
                buf.clear();
                buf.extend_from_slice(&packet);
                Ok(buf.len())
            }
            Some(ReplayItem::Error(e)) => Err(e),
            None => Err(TransportError::DeviceGone),
        }
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}
