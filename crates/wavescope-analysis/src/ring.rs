//! Lock-free single-producer single-consumer ring buffer for samples.
//!
//! [`with_capacity`] returns the two halves of the ring; exactly one thread
//! may hold the producer and one (possibly different) thread the consumer,
//! which the handle split enforces at compile time. Push and pop never block:
//! both move whole batches and return `false` when the batch does not fit.

use std::cell::UnsafeCell;
use std::ptr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, ensure};

/// Create a ring with `capacity` slots, split into producer and consumer
/// halves.
///
/// `capacity` must be a non-zero power of two so wraparound is a single
/// bitmask. Both cursors start at zero (empty).
pub fn with_capacity<T: Copy + Default>(
    capacity: usize,
) -> Result<(RingProducer<T>, RingConsumer<T>)> {
    ensure!(
        capacity != 0 && capacity.is_power_of_two(),
        "ring capacity must be a non-zero power of two, got {capacity}"
    );

    let slots = (0..capacity).map(|_| UnsafeCell::new(T::default())).collect();
    let shared = Arc::new(RingShared {
        slots,
        mask: capacity - 1,
        head: AtomicUsize::new(0),
        tail: AtomicUsize::new(0),
    });

    Ok((
        RingProducer {
            shared: shared.clone(),
        },
        RingConsumer { shared },
    ))
}

struct RingShared<T> {
    slots: Box<[UnsafeCell<T>]>,
    mask: usize,
    /// Write cursor. Monotonically increasing; slot index is `head & mask`.
    head: AtomicUsize,
    /// Read cursor. Monotonically increasing; slot index is `tail & mask`.
    tail: AtomicUsize,
}

// Producer and consumer touch disjoint slot ranges at any instant: the cursor
// protocol (release store after the copy, acquire load of the opposing
// cursor) makes copied data visible before the cursor move is observed.
unsafe impl<T: Copy + Send> Send for RingShared<T> {}
unsafe impl<T: Copy + Send> Sync for RingShared<T> {}

impl<T> RingShared<T> {
    fn capacity(&self) -> usize {
        self.mask + 1
    }

    fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        head.wrapping_sub(tail)
    }

    fn slot(&self, index: usize) -> *mut T {
        self.slots[index].get()
    }
}

/// Writing half of the ring. `Send` but not clonable: exactly one producer.
pub struct RingProducer<T> {
    shared: Arc<RingShared<T>>,
}

impl<T: Copy> RingProducer<T> {
    /// Push the whole batch, or nothing.
    ///
    /// Returns `false` when `data` is empty or exceeds current free space;
    /// the ring is untouched in that case. A batch longer than the total
    /// capacity can never succeed.
    pub fn push(&mut self, data: &[T]) -> bool {
        let count = data.len();
        if count == 0 {
            return false;
        }

        let shared = &*self.shared;
        // Own cursor relaxed; opposing cursor acquire, pairing with the
        // consumer's release store so freed slots are really free.
        let head = shared.head.load(Ordering::Relaxed);
        let tail = shared.tail.load(Ordering::Acquire);
        let free = shared.capacity() - head.wrapping_sub(tail);
        if count > free {
            return false;
        }

        let index = head & shared.mask;
        let first = count.min(shared.capacity() - index);
        unsafe {
            ptr::copy_nonoverlapping(data.as_ptr(), shared.slot(index), first);
            ptr::copy_nonoverlapping(data.as_ptr().add(first), shared.slot(0), count - first);
        }

        // Release: the slot copies above happen-before the consumer's
        // acquire load observes the new head.
        shared.head.store(head.wrapping_add(count), Ordering::Release);
        true
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    /// Best-effort occupancy snapshot; can be stale the moment it returns.
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }
}

/// Reading half of the ring. `Send` but not clonable: exactly one consumer.
pub struct RingConsumer<T> {
    shared: Arc<RingShared<T>>,
}

impl<T: Copy> RingConsumer<T> {
    /// Fill `dest` entirely, or not at all.
    ///
    /// Returns `false` when `dest` is empty or longer than the number of
    /// buffered elements; the ring is untouched in that case.
    pub fn pop(&mut self, dest: &mut [T]) -> bool {
        let count = dest.len();
        if count == 0 {
            return false;
        }

        let shared = &*self.shared;
        // Own cursor relaxed; head acquire, pairing with the producer's
        // release store so the slot contents are visible.
        let tail = shared.tail.load(Ordering::Relaxed);
        let head = shared.head.load(Ordering::Acquire);
        let available = head.wrapping_sub(tail);
        if count > available {
            return false;
        }

        let index = tail & shared.mask;
        let first = count.min(shared.capacity() - index);
        unsafe {
            ptr::copy_nonoverlapping(shared.slot(index), dest.as_mut_ptr(), first);
            ptr::copy_nonoverlapping(shared.slot(0), dest.as_mut_ptr().add(first), count - first);
        }

        // Release: our slot reads happen-before the producer reuses them.
        shared.tail.store(tail.wrapping_add(count), Ordering::Release);
        true
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    /// Best-effort occupancy snapshot; can be stale the moment it returns.
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn capacity_must_be_nonzero_power_of_two() {
        assert!(with_capacity::<f32>(0).is_err());
        assert!(with_capacity::<f32>(100).is_err());
        assert!(with_capacity::<f32>(1).is_ok());
        assert!(with_capacity::<f32>(1024).is_ok());
    }

    #[test]
    fn push_and_pop_roundtrip_in_order() {
        let (mut tx, mut rx) = with_capacity::<i32>(8).unwrap();
        assert!(tx.push(&[1, 2, 3]));
        assert_eq!(tx.len(), 3);

        let mut out = [0i32; 3];
        assert!(rx.pop(&mut out));
        assert_eq!(out, [1, 2, 3]);
        assert!(rx.is_empty());
    }

    #[test]
    fn oversized_push_fails_without_side_effect() {
        let (mut tx, _rx) = with_capacity::<i32>(4).unwrap();
        assert!(tx.push(&[1, 2, 3]));

        // More than free space.
        assert!(!tx.push(&[4, 5]));
        assert_eq!(tx.len(), 3);

        // More than total capacity always fails, even when empty.
        let (mut tx, _rx) = with_capacity::<i32>(4).unwrap();
        assert!(!tx.push(&[0; 5]));
        assert!(tx.is_empty());
    }

    #[test]
    fn oversized_pop_fails_without_side_effect() {
        let (mut tx, mut rx) = with_capacity::<i32>(4).unwrap();
        assert!(tx.push(&[1, 2]));

        let mut out = [0i32; 3];
        assert!(!rx.pop(&mut out));
        assert_eq!(rx.len(), 2);

        let mut empty: [i32; 0] = [];
        assert!(!rx.pop(&mut empty));
    }

    #[test]
    fn wraparound_preserves_order() {
        let (mut tx, mut rx) = with_capacity::<i32>(4).unwrap();
        assert!(tx.push(&[1, 2, 3]));

        let mut out = [0i32; 2];
        assert!(rx.pop(&mut out));
        assert_eq!(out, [1, 2]);

        // Crosses the physical end of the backing store.
        assert!(tx.push(&[4, 5, 6]));
        assert!(tx.is_full());

        let mut out = [0i32; 4];
        assert!(rx.pop(&mut out));
        assert_eq!(out, [3, 4, 5, 6]);
    }

    #[test]
    fn spsc_transfers_every_value_in_order() {
        const COUNT: i32 = 1000;
        let (mut tx, mut rx) = with_capacity::<i32>(1024).unwrap();

        let producer = thread::spawn(move || {
            for i in 0..COUNT {
                while !tx.push(&[i]) {
                    thread::yield_now();
                }
            }
        });

        let consumer = thread::spawn(move || {
            let mut value = [0i32; 1];
            for i in 0..COUNT {
                while !rx.pop(&mut value) {
                    thread::yield_now();
                }
                assert_eq!(value[0], i);
            }
        });

        producer.join().unwrap();
        consumer.join().unwrap();
    }
}
