//! Device-side sample buffer between the audio callback and the capture loop

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::HeapRb;

/// Circular buffer of 16-bit PCM samples
///
/// Backed by `ringbuf`'s SPSC ring. The device callback writes and the capture
/// loop reads; the buffer is sized to hold at least one second of audio so the
/// loop can fall behind briefly (a slow frame handler) without losing input.
pub struct DeviceBuffer {
    producer: ringbuf::HeapProd<i16>,
    consumer: ringbuf::HeapCons<i16>,
    capacity: usize,
}

impl DeviceBuffer {
    /// Create new buffer with given capacity
    ///
    /// # Example
    ///
    /// ```
    /// use levelmeter_audio::DeviceBuffer;
    ///
    /// let buffer = DeviceBuffer::new(8000); // 1 second @ 8kHz
    /// assert_eq!(buffer.capacity(), 8000);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let rb = HeapRb::<i16>::new(capacity.max(1));
        let (producer, consumer) = rb.split();

        Self {
            producer,
            consumer,
            capacity: capacity.max(1),
        }
    }

    /// Write samples (device callback side)
    ///
    /// Returns number of samples actually written; the rest are dropped when full.
    pub fn write(&mut self, samples: &[i16]) -> usize {
        self.producer.push_slice(samples)
    }

    /// Read up to `output.len()` samples (capture loop side)
    pub fn read(&mut self, output: &mut [i16]) -> usize {
        self.consumer.pop_slice(output)
    }

    /// Number of samples currently available for reading
    pub fn available(&self) -> usize {
        self.consumer.occupied_len()
    }

    /// Remaining capacity for writing
    pub fn free_space(&self) -> usize {
        self.producer.vacant_len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.consumer.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.producer.is_full()
    }

    /// Discard all buffered samples
    pub fn clear(&mut self) {
        self.consumer.clear();
    }

    /// Read all available samples into a Vec
    pub fn read_all(&mut self) -> Vec<i16> {
        let mut output = vec![0; self.available()];
        let read = self.read(&mut output);
        output.truncate(read);
        output
    }
}
