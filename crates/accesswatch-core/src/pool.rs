//! Bounded object pools (C2).
//!
//! Both pools are non-blocking: `get` falls back to a fresh allocation when
//! the pool is empty, and `recycle` silently drops the value when the pool
//! is already at capacity. Neither pool ever blocks a caller.

use std::sync::Mutex;

use crate::model::Entry;

/// Recycles [`Entry`] values to avoid reallocating one per parsed line.
pub struct EntryPool {
    capacity: usize,
    free: Mutex<Vec<Entry>>,
}

impl EntryPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            free: Mutex::new(Vec::with_capacity(capacity)),
        }
    }

    /// Returns a pooled entry if one is available, otherwise a blank one.
    pub fn get(&self) -> Entry {
        let mut free = self.free.lock().expect("entry pool mutex poisoned");
        free.pop().unwrap_or_else(Entry::blank)
    }

    /// Returns `entry` to the pool, dropping it instead if the pool is full.
    pub fn recycle(&self, entry: Entry) {
        let mut free = self.free.lock().expect("entry pool mutex poisoned");
        if free.len() < self.capacity {
            free.push(entry);
        }
    }
}

/// Recycles fixed-size byte buffers used to read slabs of the tailed file.
pub struct BufferPool {
    capacity: usize,
    buffer_size: usize,
    free: Mutex<Vec<Vec<u8>>>,
}

impl BufferPool {
    pub fn new(capacity: usize, buffer_size: usize) -> Self {
        Self {
            capacity,
            buffer_size,
            free: Mutex::new(Vec::with_capacity(capacity)),
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Returns a pooled buffer if one is available, otherwise a freshly
    /// allocated one of `buffer_size` bytes.
    pub fn get(&self) -> Vec<u8> {
        let mut free = self.free.lock().expect("buffer pool mutex poisoned");
        free.pop().unwrap_or_else(|| vec![0u8; self.buffer_size])
    }

    /// Returns `buf` to the pool. A buffer whose capacity no longer matches
    /// `buffer_size`, or that would overflow the pool, is dropped instead.
    pub fn recycle(&self, mut buf: Vec<u8>) {
        if buf.capacity() != self.buffer_size {
            return;
        }
        let mut free = self.free.lock().expect("buffer pool mutex poisoned");
        if free.len() < self.capacity {
            buf.clear();
            buf.resize(self.buffer_size, 0);
            free.push(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_pool_reuses_recycled_entries() {
        let pool = EntryPool::new(2);
        let a = pool.get();
        pool.recycle(a);
        let b = pool.get();
        assert_eq!(b.ip(), b"");
    }

    #[test]
    fn entry_pool_drops_beyond_capacity() {
        let pool = EntryPool::new(1);
        pool.recycle(Entry::blank());
        pool.recycle(Entry::blank());
        assert_eq!(pool.free.lock().unwrap().len(), 1);
    }

    #[test]
    fn buffer_pool_allocates_requested_size() {
        let pool = BufferPool::new(2, 4096);
        let buf = pool.get();
        assert_eq!(buf.len(), 4096);
    }

    #[test]
    fn buffer_pool_rejects_mismatched_capacity_on_recycle() {
        let pool = BufferPool::new(2, 4096);
        pool.recycle(vec![0u8; 10]);
        assert_eq!(pool.free.lock().unwrap().len(), 0);
    }

    #[test]
    fn buffer_pool_drops_beyond_capacity() {
        let pool = BufferPool::new(1, 16);
        pool.recycle(pool.get());
        pool.recycle(pool.get());
        assert_eq!(pool.free.lock().unwrap().len(), 1);
    }
}
