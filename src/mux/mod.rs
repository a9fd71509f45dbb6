//! Latest-frame-per-source multiplexer
//!
//! Capture threads push frames; the streaming thread blocks in `wait_next`.
//! Each source owns one slot holding only its newest unsent frame, so a slow
//! consumer causes overwrites (counted as drops) instead of unbounded queueing.
//! Sources are served FIFO by the moment they became pending, and a source that
//! is already pending is never queued twice, so no source is served twice while
//! another one waits.

use crate::frame::CapturedFrame;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use tracing::{debug, info};

#[derive(Debug, Default)]
struct Slot {
    latest: Option<CapturedFrame>,
    pending: bool,
    dropped: u64,
}

#[derive(Debug)]
struct State {
    slots: Vec<Slot>,
    pending: VecDeque<u16>,
    dropped_total: u64,
    stopped: bool,
}

/// Multi-source frame buffer (single mutex + condition variable monitor)
pub struct FrameMultiplexer {
    state: Mutex<State>,
    ready: Condvar,
}

impl FrameMultiplexer {
    /// Creates a multiplexer accepting source ids `0..source_count`
    pub fn new(source_count: u16) -> Self {
        info!(sources = %source_count, "Frame multiplexer created");

        Self {
            state: Mutex::new(State {
                slots: (0..source_count).map(|_| Slot::default()).collect(),
                pending: VecDeque::with_capacity(source_count as usize),
                dropped_total: 0,
                stopped: false,
            }),
            ready: Condvar::new(),
        }
    }

    /// Stores `frame` as its source's latest frame
    ///
    /// Overwrites (and counts as dropped) an unconsumed frame of the same
    /// source. Frames from unknown sources are discarded.
    pub fn push(&self, frame: CapturedFrame) {
        let mut state = self.state.lock();
        let source_id = frame.source_id;

        let State {
            slots,
            pending,
            dropped_total,
            ..
        } = &mut *state;

        let Some(slot) = slots.get_mut(source_id as usize) else {
            debug!(source = %source_id, "Discarding frame from unknown source");
            return;
        };

        if slot.pending {
            slot.dropped += 1;
            *dropped_total += 1;
        } else {
            slot.pending = true;
            pending.push_back(source_id);
        }
        slot.latest = Some(frame);

        drop(state);
        self.ready.notify_one();
    }

    /// Blocks until a source is pending or the multiplexer is stopped
    ///
    /// Returns `None` once stopped, even if frames are still pending: buffered
    /// frames are discarded on shutdown.
    pub fn wait_next(&self) -> Option<CapturedFrame> {
        let mut state = self.state.lock();

        loop {
            if state.stopped {
                return None;
            }

            if let Some(source_id) = state.pending.pop_front() {
                let slot = &mut state.slots[source_id as usize];
                slot.pending = false;
                return slot.latest.clone();
            }

            self.ready.wait(&mut state);
        }
    }

    /// Stops the multiplexer and wakes every waiter (idempotent)
    pub fn stop(&self) {
        let mut state = self.state.lock();
        if !state.stopped {
            state.stopped = true;
            info!(
                dropped = %state.dropped_total,
                discarded = %state.pending.len(),
                "Frame multiplexer stopped"
            );
        }
        drop(state);
        self.ready.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.state.lock().stopped
    }

    /// Total frames overwritten before they were consumed
    pub fn dropped_count(&self) -> u64 {
        self.state.lock().dropped_total
    }

    /// Frames of one source overwritten before they were consumed
    pub fn source_dropped(&self, source_id: u16) -> Option<u64> {
        self.state
            .lock()
            .slots
            .get(source_id as usize)
            .map(|slot| slot.dropped)
    }

    /// Number of sources currently waiting to be served
    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn source_count(&self) -> u16 {
        self.state.lock().slots.len() as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn frame(source_id: u16, sequence: u32) -> CapturedFrame {
        CapturedFrame {
            payload: vec![sequence as u8].into(),
            source_id,
            sequence,
            timestamp_us: 100 + sequence as u64,
        }
    }

    #[test]
    fn test_overwrite_and_drop_accounting() {
        let mux = FrameMultiplexer::new(2);
        mux.push(frame(0, 1));
        mux.push(frame(0, 2));
        mux.push(frame(1, 1));

        let first = mux.wait_next().unwrap();
        let second = mux.wait_next().unwrap();

        assert_eq!((first.source_id, first.sequence), (0, 2));
        assert_eq!((second.source_id, second.sequence), (1, 1));
        assert_eq!(mux.dropped_count(), 1);
        assert_eq!(mux.source_dropped(0), Some(1));
        assert_eq!(mux.source_dropped(1), Some(0));
    }

    #[test]
    fn test_pending_queue_bounded_by_sources() {
        let mux = FrameMultiplexer::new(3);
        for seq in 0..50 {
            mux.push(frame((seq % 3) as u16, seq));
        }
        assert_eq!(mux.pending_len(), 3);
        assert_eq!(mux.dropped_count(), 47);
    }

    #[test]
    fn test_unknown_source_discarded() {
        let mux = FrameMultiplexer::new(1);
        mux.push(frame(4, 0));
        assert_eq!(mux.pending_len(), 0);
        assert_eq!(mux.dropped_count(), 0);
        assert_eq!(mux.source_dropped(4), None);
    }

    #[test]
    fn test_stop_discards_pending() {
        let mux = FrameMultiplexer::new(1);
        mux.push(frame(0, 0));
        mux.stop();
        mux.stop();

        assert!(mux.is_stopped());
        assert!(mux.wait_next().is_none());
    }

    #[test]
    fn test_stop_wakes_blocked_consumer() {
        let mux = Arc::new(FrameMultiplexer::new(1));
        let consumer = {
            let mux = Arc::clone(&mux);
            thread::spawn(move || mux.wait_next())
        };

        thread::sleep(Duration::from_millis(50));
        mux.stop();
        assert!(consumer.join().unwrap().is_none());
    }

    #[test]
    fn test_push_wakes_blocked_consumer() {
        let mux = Arc::new(FrameMultiplexer::new(2));
        let consumer = {
            let mux = Arc::clone(&mux);
            thread::spawn(move || mux.wait_next())
        };

        thread::sleep(Duration::from_millis(50));
        mux.push(frame(1, 9));
        let got = consumer.join().unwrap().unwrap();
        assert_eq!((got.source_id, got.sequence), (1, 9));
    }
}
