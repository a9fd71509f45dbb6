//! Max-fps throttle for the send loop

use std::thread;
use std::time::{Duration, Instant};

/// Spaces consecutive sends at least `1 / max_fps` apart
///
/// The deadline is recomputed from the moment the sleep ends, so a slow send
/// does not cause a burst of catch-up frames afterwards.
#[derive(Debug, Clone)]
pub struct FramePacer {
    interval: Option<Duration>,
    next_send: Option<Instant>,
}

impl FramePacer {
    /// `max_fps == 0` disables throttling
    pub fn new(max_fps: u32) -> Self {
        let interval = (max_fps > 0).then(|| Duration::from_nanos(1_000_000_000 / max_fps as u64));
        Self {
            interval,
            next_send: None,
        }
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    pub fn is_enabled(&self) -> bool {
        self.interval.is_some()
    }

    /// Sleeps until the next-send deadline, then arms the following one
    pub fn wait(&mut self) {
        let Some(interval) = self.interval else {
            return;
        };

        if let Some(deadline) = self.next_send {
            let now = Instant::now();
            if deadline > now {
                thread::sleep(deadline - now);
            }
        }

        self.next_send = Some(Instant::now() + interval);
    }

    /// Forgets the deadline; the next `wait` returns immediately
    pub fn reset(&mut self) {
        self.next_send = None;
    }
}
