//! Clock marshaling: hand windows from the audio callback thread to the
//! engine thread without blocking either.
//!
//! The external clock may call `on_tick` on the audio thread. When the
//! bridge cannot run there, the callback pushes its window into a bounded
//! channel and the engine thread drains it. The push never blocks: a full
//! channel drops the window with a warning, and the next callback covers
//! the gap because windows overlap the watermark anyway.

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};

use crate::bridge::ClockWindow;

const DEFAULT_CAPACITY: usize = 8;

/// Audio-thread half: push-only, never blocks.
pub struct ClockSender {
    tx: Sender<ClockWindow>,
}

impl ClockSender {
    /// Push a window. Returns false (and warns) when the engine thread has
    /// fallen behind and the channel is full.
    pub fn push(&self, window: ClockWindow) -> bool {
        match self.tx.try_send(window) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                log::warn!(target: "bridge", "clock window dropped: engine thread behind");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Engine-thread half: drain-only, never blocks.
pub struct ClockReceiver {
    rx: Receiver<ClockWindow>,
}

impl ClockReceiver {
    /// Drain every pending window, oldest first.
    pub fn drain(&self) -> Vec<ClockWindow> {
        let mut windows = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(w) => windows.push(w),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        windows
    }
}

/// Create a clock channel with the default capacity.
pub fn clock_channel() -> (ClockSender, ClockReceiver) {
    clock_channel_with_capacity(DEFAULT_CAPACITY)
}

pub fn clock_channel_with_capacity(capacity: usize) -> (ClockSender, ClockReceiver) {
    let (tx, rx) = bounded(capacity);
    (ClockSender { tx }, ClockReceiver { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(t0: f64) -> ClockWindow {
        ClockWindow {
            t0,
            t1: t0 + 0.1,
            latency: 0.0,
        }
    }

    #[test]
    fn windows_drain_in_order() {
        let (tx, rx) = clock_channel();
        assert!(tx.push(window(0.0)));
        assert!(tx.push(window(0.1)));
        let drained = rx.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].t0, 0.0);
        assert_eq!(drained[1].t0, 0.1);
        assert!(rx.drain().is_empty());
    }

    #[test]
    fn full_channel_drops_new_windows() {
        let (tx, rx) = clock_channel_with_capacity(2);
        assert!(tx.push(window(0.0)));
        assert!(tx.push(window(0.1)));
        assert!(!tx.push(window(0.2)));
        assert_eq!(rx.drain().len(), 2);
    }
}
