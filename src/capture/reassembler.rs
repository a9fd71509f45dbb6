//! Fragment-to-frame reassembly
//!
//! A best-effort state machine: malformed or mismatching fragments are dropped
//! silently and never corrupt the frame being accumulated. A frame is emitted when
//! a fragment with a different boundary id arrives, or when the session is flushed.

use super::fragment::{
    FragmentHeader, FrameFragmentHeader, FrameIdentity, FRAGMENT_HEADER_SIZE,
    TRANSPORT_HEADER_SIZE,
};
use crate::frame::CapturedFrame;
use bytes::Bytes;
use crossbeam_channel::Sender;
use tracing::trace;

/// Out-of-band events raised while reassembling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureEvent {
    /// The camera's physical button bit was set on an accepted fragment
    ButtonPressed { source_id: u16 },
}

/// Counters kept by a reassembler
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReassemblerStats {
    pub packets_seen: u64,
    pub fragments_accepted: u64,
    pub fragments_rejected: u64,
    pub frames_emitted: u64,
    pub button_presses: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Empty,
    Accumulating(FrameIdentity),
}

/// Per-source frame reassembler
pub struct Reassembler {
    source_id: u16,
    state: State,
    buffer: Vec<u8>,
    next_sequence: u32,
    events: Option<Sender<CaptureEvent>>,
    stats: ReassemblerStats,
}

impl Reassembler {
    pub fn new(source_id: u16) -> Self {
        Self {
            source_id,
            state: State::Empty,
            buffer: Vec::with_capacity(256 * 1024),
            next_sequence: 0,
            events: None,
            stats: ReassemblerStats::default(),
        }
    }

    /// Routes button events to `events`
    pub fn with_events(mut self, events: Sender<CaptureEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn source_id(&self) -> u16 {
        self.source_id
    }

    /// Feeds one raw transport packet
    ///
    /// Returns the previous frame if this packet closed it (boundary id change).
    pub fn handle_packet(&mut self, data: &[u8]) -> Option<CapturedFrame> {
        self.stats.packets_seen += 1;

        let Some((fragment, payload)) = split_fragment(data) else {
            self.reject("malformed fragment");
            return None;
        };

        let mut emitted = None;
        if let State::Accumulating(current) = self.state {
            if current.boundary_id != fragment.boundary_id {
                emitted = self.emit();
            }
        }

        let identity = fragment.identity();
        match self.state {
            State::Empty => {
                if !identity.is_acceptable_start() {
                    self.reject("invalid frame start");
                    return emitted;
                }
            }
            State::Accumulating(current) => {
                if current != identity {
                    self.reject("identity mismatch");
                    return emitted;
                }
            }
        }

        self.stats.fragments_accepted += 1;
        if fragment.button_pressed {
            self.signal_button();
        }

        self.buffer.extend_from_slice(payload);
        if !self.buffer.is_empty() {
            self.state = State::Accumulating(identity);
        }

        emitted
    }

    /// Finalizes any in-progress frame, possibly truncated
    pub fn flush(&mut self) -> Option<CapturedFrame> {
        self.emit()
    }

    /// Drops any partial frame and restarts sequence numbering at 0
    pub fn reset(&mut self) {
        self.state = State::Empty;
        self.buffer.clear();
        self.next_sequence = 0;
    }

    /// Bytes accumulated for the in-progress frame
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn stats(&self) -> &ReassemblerStats {
        &self.stats
    }

    fn emit(&mut self) -> Option<CapturedFrame> {
        self.state = State::Empty;
        if self.buffer.is_empty() {
            return None;
        }

        let frame = CapturedFrame::new(
            self.source_id,
            self.next_sequence,
            Bytes::copy_from_slice(&self.buffer),
        );
        self.next_sequence = self.next_sequence.wrapping_add(1);
        self.buffer.clear();
        self.stats.frames_emitted += 1;

        Some(frame)
    }

    fn signal_button(&mut self) {
        self.stats.button_presses += 1;
        if let Some(events) = &self.events {
            // Receiver gone just means nobody listens for buttons any more
            let _ = events.send(CaptureEvent::ButtonPressed {
                source_id: self.source_id,
            });
        }
    }

    fn reject(&mut self, reason: &'static str) {
        self.stats.fragments_rejected += 1;
        trace!(source = %self.source_id, reason, "Fragment dropped");
    }
}

/// Validates transport framing and returns the fragment header and payload slice
fn split_fragment(data: &[u8]) -> Option<(FrameFragmentHeader, &[u8])> {
    let transport = FragmentHeader::parse(data)?;
    if !transport.is_valid() {
        return None;
    }

    let length = transport.length as usize;
    if TRANSPORT_HEADER_SIZE + length > data.len() {
        return None;
    }
    if data.len() - TRANSPORT_HEADER_SIZE < FRAGMENT_HEADER_SIZE || length < FRAGMENT_HEADER_SIZE {
        return None;
    }

    let header = FrameFragmentHeader::parse(&data[TRANSPORT_HEADER_SIZE..])?;
    let payload = &data[TRANSPORT_HEADER_SIZE + FRAGMENT_HEADER_SIZE..TRANSPORT_HEADER_SIZE + length];

    Some((header, payload))
}
