//! Scoped scratch buffers for (de)compression
//!
//! A bounded pool of byte buffers bucketed by size. [`PooledBuffer`] hands
//! its allocation back to the pool when dropped, on every exit path, so a
//! failing handler never leaks scratch space.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Buffer size classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferSize {
    /// 64 KiB, most romfs files
    Small = 0x1_0000,
    /// 1 MiB, tables and archives
    Medium = 0x10_0000,
    /// 16 MiB, large packs and the GameData list
    Large = 0x100_0000,
}

impl BufferSize {
    #[inline]
    #[must_use]
    pub fn capacity(self) -> usize {
        self as usize
    }

    /// Smallest class that fits `required` bytes
    #[must_use]
    pub fn for_capacity(required: usize) -> Self {
        if required <= Self::Small.capacity() {
            Self::Small
        } else if required <= Self::Medium.capacity() {
            Self::Medium
        } else {
            Self::Large
        }
    }

    fn index(self) -> usize {
        match self {
            Self::Small => 0,
            Self::Medium => 1,
            Self::Large => 2,
        }
    }
}

/// Pool hit/miss counters
#[derive(Debug, Default)]
pub struct PoolStatistics {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub returns: AtomicU64,
    pub discards: AtomicU64,
}

/// Thread-safe bounded buffer pool
#[derive(Debug)]
pub struct BufferPool {
    pools: [Mutex<VecDeque<Vec<u8>>>; 3],
    max_per_size: usize,
    stats: PoolStatistics,
}

impl BufferPool {
    /// Create a pool keeping at most `max_per_size` idle buffers per class
    #[must_use]
    pub fn new(max_per_size: usize) -> Self {
        Self {
            pools: [
                Mutex::new(VecDeque::new()),
                Mutex::new(VecDeque::new()),
                Mutex::new(VecDeque::new()),
            ],
            max_per_size,
            stats: PoolStatistics::default(),
        }
    }

    /// Borrow an empty buffer able to hold at least `required` bytes
    pub fn get(&self, required: usize) -> PooledBuffer<'_> {
        let size = BufferSize::for_capacity(required);
        let reused = self.pools[size.index()].lock().pop_front();
        let buffer = if let Some(mut buffer) = reused {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            buffer.reserve(required);
            buffer
        } else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            Vec::with_capacity(required.max(size.capacity()))
        };
        PooledBuffer {
            buffer,
            size,
            pool: self,
        }
    }

    fn give_back(&self, mut buffer: Vec<u8>, size: BufferSize) {
        self.stats.returns.fetch_add(1, Ordering::Relaxed);
        let mut pool = self.pools[size.index()].lock();
        if pool.len() < self.max_per_size {
            buffer.clear();
            pool.push_back(buffer);
        } else {
            self.stats.discards.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[must_use]
    pub fn statistics(&self) -> &PoolStatistics {
        &self.stats
    }

    /// Idle buffers per class (small, medium, large)
    #[must_use]
    pub fn idle(&self) -> (usize, usize, usize) {
        (
            self.pools[0].lock().len(),
            self.pools[1].lock().len(),
            self.pools[2].lock().len(),
        )
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(16)
    }
}

/// A buffer borrowed from a [`BufferPool`], returned on drop
#[derive(Debug)]
pub struct PooledBuffer<'a> {
    buffer: Vec<u8>,
    size: BufferSize,
    pool: &'a BufferPool,
}

impl PooledBuffer<'_> {
    /// Copy the contents out, keeping the allocation in the pool
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        self.buffer.clone()
    }

    /// Keep the allocation instead of returning it
    #[must_use]
    pub fn take(mut self) -> Vec<u8> {
        std::mem::take(&mut self.buffer)
    }
}

impl std::ops::Deref for PooledBuffer<'_> {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.buffer
    }
}

impl std::ops::DerefMut for PooledBuffer<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buffer
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        let buffer = std::mem::take(&mut self.buffer);
        // Taken buffers leave an empty allocation behind
        if buffer.capacity() > 0 {
            self.pool.give_back(buffer, self.size);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_classes() {
        assert_eq!(BufferSize::for_capacity(10), BufferSize::Small);
        assert_eq!(BufferSize::for_capacity(0x2_0000), BufferSize::Medium);
        assert_eq!(BufferSize::for_capacity(0x200_0000), BufferSize::Large);
    }

    #[test]
    fn test_returned_on_drop_and_reused() {
        let pool = BufferPool::new(4);
        {
            let mut buffer = pool.get(100);
            buffer.extend_from_slice(b"scratch");
        }
        assert_eq!(pool.idle(), (1, 0, 0));

        let buffer = pool.get(100);
        assert!(buffer.is_empty());
        assert_eq!(pool.statistics().hits.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_returned_on_error_path() {
        let pool = BufferPool::new(4);
        let failing = || -> Result<(), ()> {
            let _buffer = pool.get(0x2_0000);
            Err(())
        };
        assert!(failing().is_err());
        assert_eq!(pool.idle(), (0, 1, 0));
    }

    #[test]
    fn test_bounded() {
        let pool = BufferPool::new(1);
        let a = pool.get(1);
        let b = pool.get(1);
        drop(a);
        drop(b);
        assert_eq!(pool.idle(), (1, 0, 0));
        assert_eq!(pool.statistics().discards.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_take_keeps_allocation() {
        let pool = BufferPool::new(4);
        let mut buffer = pool.get(1);
        buffer.push(7);
        assert_eq!(buffer.take(), vec![7]);
        assert_eq!(pool.idle(), (0, 0, 0));
    }
}
