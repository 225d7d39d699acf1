//! Device-output boundary and the bounded buffer behind it.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;

/// Blocking sink the playback pipeline writes decoded audio to.
///
/// `write` accepts interleaved stereo samples and blocks until the device has
/// room for them; that backpressure is what paces decoding to real time. An
/// error means the device is gone and the pipeline should stop.
pub trait OutputSink: Send {
    fn write(&mut self, samples: &[f32]) -> Result<()>;

    /// Stop accepting input and wait for buffered audio to play out.
    fn drain(&mut self) -> Result<()>;
}

/// Bounded interleaved-sample buffer between the pipeline and the output
/// callback.
///
/// Writers block while the buffer is full; the output callback pops without
/// blocking. `close()` wakes all waiters and makes further pushes fail, which
/// is how stream errors and teardown propagate back to the writer.
pub struct StreamBuffer {
    inner: Mutex<BufferInner>,
    cv: Condvar,
    max_samples: usize,
}

struct BufferInner {
    queue: VecDeque<f32>,
    closed: bool,
}

impl StreamBuffer {
    /// Create a buffer capped at `max_samples` interleaved samples.
    pub fn new(max_samples: usize) -> Self {
        Self {
            inner: Mutex::new(BufferInner {
                queue: VecDeque::new(),
                closed: false,
            }),
            cv: Condvar::new(),
            max_samples: max_samples.max(1),
        }
    }

    /// Push all of `samples`, blocking while the buffer is full.
    ///
    /// Returns `false` once the buffer is closed; remaining samples are
    /// dropped in that case.
    pub fn push_blocking(&self, samples: &[f32]) -> bool {
        let mut offset = 0;
        while offset < samples.len() {
            let mut g = self.inner.lock().unwrap();
            while g.queue.len() >= self.max_samples && !g.closed {
                g = self.cv.wait(g).unwrap();
            }
            if g.closed {
                return false;
            }

            while offset < samples.len() && g.queue.len() < self.max_samples {
                g.queue.push_back(samples[offset]);
                offset += 1;
            }

            drop(g);
            self.cv.notify_all();
        }
        true
    }

    /// Pop up to `max_samples` without blocking; `None` when empty.
    pub fn pop_chunk(&self, max_samples: usize) -> Option<Vec<f32>> {
        let mut g = self.inner.lock().unwrap();
        let take = g.queue.len().min(max_samples);
        if take == 0 {
            return None;
        }

        let out: Vec<f32> = g.queue.drain(..take).collect();
        drop(g);
        self.cv.notify_all();
        Some(out)
    }

    /// Stop accepting pushes and wake all waiters. Idempotent.
    pub fn close(&self) {
        let mut g = self.inner.lock().unwrap();
        g.closed = true;
        drop(g);
        self.cv.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }

    /// Buffered samples (best-effort snapshot).
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until the buffer drains or `timeout` elapses.
    ///
    /// Returns `true` when the buffer emptied in time.
    pub fn wait_empty(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut g = self.inner.lock().unwrap();
        while !g.queue.is_empty() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (next, _) = self.cv.wait_timeout(g, deadline - now).unwrap();
            g = next;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn pop_preserves_push_order() {
        let buffer = StreamBuffer::new(64);
        assert!(buffer.push_blocking(&[1.0, 2.0, 3.0, 4.0]));

        let out = buffer.pop_chunk(2).unwrap();
        assert_eq!(out, vec![1.0, 2.0]);
        let out = buffer.pop_chunk(8).unwrap();
        assert_eq!(out, vec![3.0, 4.0]);
        assert!(buffer.pop_chunk(8).is_none());
    }

    #[test]
    fn full_buffer_blocks_until_popped() {
        let buffer = Arc::new(StreamBuffer::new(4));
        assert!(buffer.push_blocking(&[1.0, 2.0, 3.0, 4.0]));

        let writer_buffer = buffer.clone();
        let writer = thread::spawn(move || writer_buffer.push_blocking(&[5.0, 6.0]));

        // Make room; the blocked writer should finish.
        thread::sleep(Duration::from_millis(20));
        let out = buffer.pop_chunk(2).unwrap();
        assert_eq!(out, vec![1.0, 2.0]);

        assert!(writer.join().unwrap());
        assert_eq!(buffer.len(), 4);
    }

    #[test]
    fn close_unblocks_and_fails_writers() {
        let buffer = Arc::new(StreamBuffer::new(2));
        assert!(buffer.push_blocking(&[1.0, 2.0]));

        let writer_buffer = buffer.clone();
        let writer = thread::spawn(move || writer_buffer.push_blocking(&[3.0, 4.0]));

        thread::sleep(Duration::from_millis(20));
        buffer.close();

        assert!(!writer.join().unwrap());
        assert!(!buffer.push_blocking(&[5.0]));
    }

    #[test]
    fn wait_empty_observes_drain() {
        let buffer = Arc::new(StreamBuffer::new(16));
        assert!(buffer.push_blocking(&[1.0, 2.0]));

        assert!(!buffer.wait_empty(Duration::from_millis(10)));

        let reader_buffer = buffer.clone();
        let reader = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            reader_buffer.pop_chunk(16)
        });

        assert!(buffer.wait_empty(Duration::from_millis(500)));
        assert!(reader.join().unwrap().is_some());
    }
}
