//! Size-bucketed recycler for page buffers.
//!
//! Grounded on `arena.rs`'s `SegQueue`-based retire/reuse pattern: a lock-free queue per
//! buffer size holds buffers that have been fully drained of listeners and are free to be
//! refilled. Unlike the arena, this pool deals in owned `Vec<u8>` buffers rather than raw
//! pointers, so there is no unsafe code and no manual drop bookkeeping at the call site.

use parking_lot::Mutex;
use std::collections::HashMap;

use crossbeam::queue::SegQueue;

/// A recycler for page-sized byte buffers, keyed by capacity.
///
/// A single pool is normally shared by every mount on the server: most mounts settle on one
/// or two distinct page sizes (driven by configured bit-rate), so the bucket map stays small
/// and lookups stay cheap.
pub struct PagePool {
    buckets: Mutex<HashMap<usize, SegQueue<Vec<u8>>>>,
}

impl PagePool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Takes a buffer with at least `size` bytes of capacity, reusing a retired one if the
    /// pool has one of the right size, otherwise allocating fresh.
    pub fn acquire(&self, size: usize) -> Vec<u8> {
        let reused = {
            let buckets = self.buckets.lock();
            buckets.get(&size).and_then(|q| q.pop())
        };
        match reused {
            Some(mut buf) => {
                buf.clear();
                buf
            }
            None => Vec::with_capacity(size),
        }
    }

    /// Returns a buffer to the pool, bucketed by its current capacity.
    pub fn release(&self, mut buf: Vec<u8>) {
        buf.clear();
        let size = buf.capacity();
        if size == 0 {
            return;
        }
        let mut buckets = self.buckets.lock();
        buckets.entry(size).or_insert_with(SegQueue::new).push(buf);
    }

    /// Number of buffers currently retired for the given size, for diagnostics and tests.
    pub fn retired_count(&self, size: usize) -> usize {
        let buckets = self.buckets.lock();
        buckets.get(&size).map(|q| q.len()).unwrap_or(0)
    }
}

impl Default for PagePool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_allocates_when_empty() {
        let pool = PagePool::new();
        let buf = pool.acquire(128);
        assert!(buf.capacity() >= 128);
        assert_eq!(buf.len(), 0);
    }

    #[test]
    fn release_then_acquire_reuses_buffer() {
        let pool = PagePool::new();
        let mut buf = pool.acquire(64);
        buf.extend_from_slice(&[1, 2, 3]);
        let cap = buf.capacity();
        pool.release(buf);
        assert_eq!(pool.retired_count(cap), 1);

        let reused = pool.acquire(cap);
        assert_eq!(reused.len(), 0);
        assert_eq!(pool.retired_count(cap), 0);
    }

    #[test]
    fn distinct_sizes_use_distinct_buckets() {
        let pool = PagePool::new();
        let a = pool.acquire(32);
        let b = pool.acquire(256);
        pool.release(a);
        pool.release(b);
        assert_eq!(pool.retired_count(32), 1);
        assert_eq!(pool.retired_count(256), 1);
    }
}
