//! Display hand-off
//!
//! At most one display update is outstanding at a time. The estimator takes
//! the in-flight flag before it computes a reading and hands the sink a
//! [`Completion`] that clears the flag when the display is done with it.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::trace;

use crate::estimator::LevelReading;

/// Consumer of level readings
///
/// Called on the capture thread; implementations must return promptly and
/// finish the update elsewhere if it is slow. The reading counts as displayed
/// once `done` is completed or dropped.
pub trait DisplaySink: Send + Sync {
    fn on_level_reading(&self, reading: LevelReading, done: Completion);
}

impl<F> DisplaySink for F
where
    F: Fn(LevelReading, Completion) + Send + Sync,
{
    fn on_level_reading(&self, reading: LevelReading, done: Completion) {
        self(reading, done)
    }
}

/// Token for the one outstanding display update
///
/// Completing or dropping it releases the in-flight flag, so a sink that
/// loses a reading can never wedge the meter.
pub struct Completion {
    in_flight: Arc<AtomicBool>,
}

impl Completion {
    /// Take the in-flight flag; `None` if an update is already outstanding
    pub(crate) fn acquire(in_flight: &Arc<AtomicBool>) -> Option<Self> {
        in_flight
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| Self {
                in_flight: Arc::clone(in_flight),
            })
    }

    /// Signal that the display has finished with this reading
    pub fn complete(self) {}
}

impl Drop for Completion {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::Release);
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion").finish_non_exhaustive()
    }
}

/// A reading together with its completion token
#[derive(Debug)]
pub struct DisplayUpdate {
    pub reading: LevelReading,
    pub completion: Completion,
}

/// Forwards readings to an async consumer through a tokio channel
///
/// The channel holds a single update, which is all the in-flight guard ever
/// allows. If the receiver is gone the update is dropped and the flag cleared.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<DisplayUpdate>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::Receiver<DisplayUpdate>) {
        let (tx, rx) = mpsc::channel(1);
        (Self { tx }, rx)
    }
}

impl DisplaySink for ChannelSink {
    fn on_level_reading(&self, reading: LevelReading, completion: Completion) {
        if let Err(e) = self.tx.try_send(DisplayUpdate {
            reading,
            completion,
        }) {
            trace!(error = %e, "Display update not delivered");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_is_exclusive() {
        let flag = Arc::new(AtomicBool::new(false));

        let first = Completion::acquire(&flag).unwrap();
        assert!(Completion::acquire(&flag).is_none());

        first.complete();
        assert!(!flag.load(Ordering::Acquire));
        assert!(Completion::acquire(&flag).is_some());
    }

    #[test]
    fn test_dropped_completion_releases_flag() {
        let flag = Arc::new(AtomicBool::new(false));
        drop(Completion::acquire(&flag));
        assert!(!flag.load(Ordering::Acquire));
    }

    #[test]
    fn test_channel_sink_without_receiver_releases_flag() {
        let flag = Arc::new(AtomicBool::new(false));
        let (sink, rx) = ChannelSink::new();
        drop(rx);

        let reading = LevelReading {
            raw_db: 40.0,
            display_value: 0.8,
        };
        sink.on_level_reading(reading, Completion::acquire(&flag).unwrap());
        assert!(!flag.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn test_channel_sink_delivers_update() {
        let flag = Arc::new(AtomicBool::new(false));
        let (sink, mut rx) = ChannelSink::new();

        let reading = LevelReading {
            raw_db: 55.5,
            display_value: 1.1,
        };
        sink.on_level_reading(reading, Completion::acquire(&flag).unwrap());
        assert!(flag.load(Ordering::Acquire));

        let update = rx.recv().await.unwrap();
        assert_eq!(update.reading, reading);
        update.completion.complete();
        assert!(!flag.load(Ordering::Acquire));
    }
}
