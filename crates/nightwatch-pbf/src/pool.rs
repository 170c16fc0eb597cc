//! Scratch Buffer Pool
//!
//! Every blob passes through two large buffers: the raw bytes read from disk
//! and the inflated payload. Allocating and zeroing up to 32 MiB per blob for
//! tens of thousands of blobs dominates a build, so buffers are recycled.
//!
//! # Design
//!
//! - **Size classes**: powers of two from 64 KiB to 32 MiB; a request is served
//!   from the smallest class that fits
//! - **Bounded retention**: each class keeps at most `buffers_per_class` idle buffers
//!   in a lock-free `ArrayQueue`; extra returns are simply freed
//! - **RAII handles**: a [`PooledBuffer`] goes back to its class when dropped, so
//!   every exit path (including a decode error or a panicking task) returns it
//!   exactly once
//! - Requests larger than the biggest class are allocated exactly and never pooled
//!
//! Recycled buffers are not re-zeroed. A handle only exposes its first `len`
//! bytes, and every caller fills those bytes before reading them.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crossbeam_queue::ArrayQueue;

/// Smallest size class (64 KiB)
const MIN_CLASS_SHIFT: u32 = 16;

/// Largest size class (32 MiB, the largest blob the format allows)
const MAX_CLASS_SHIFT: u32 = 25;

struct SizeClass {
    size: usize,
    idle: ArrayQueue<Vec<u8>>,
}

/// Pool of reusable byte buffers keyed by size class
pub struct BufferPool {
    classes: Vec<SizeClass>,
}

impl BufferPool {
    pub fn new(buffers_per_class: usize) -> Arc<Self> {
        let capacity = buffers_per_class.max(1);
        let classes = (MIN_CLASS_SHIFT..=MAX_CLASS_SHIFT)
            .map(|shift| SizeClass {
                size: 1 << shift,
                idle: ArrayQueue::new(capacity),
            })
            .collect();
        Arc::new(Self { classes })
    }

    /// Borrow a buffer exposing exactly `len` bytes
    pub fn acquire(self: &Arc<Self>, len: usize) -> PooledBuffer {
        let class = self.classes.iter().position(|c| c.size >= len);

        let buf = match class {
            Some(idx) => {
                let class = &self.classes[idx];
                class
                    .idle
                    .pop()
                    .unwrap_or_else(|| vec![0u8; class.size])
            }
            None => vec![0u8; len],
        };

        PooledBuffer {
            buf,
            len,
            class,
            pool: Arc::clone(self),
        }
    }

    /// Number of idle buffers across all classes
    pub fn idle_buffers(&self) -> usize {
        self.classes.iter().map(|c| c.idle.len()).sum()
    }

    fn release(&self, class: usize, buf: Vec<u8>) {
        // A full class drops the buffer instead of growing
        let _ = self.classes[class].idle.push(buf);
    }
}

/// A buffer on loan from a [`BufferPool`]
pub struct PooledBuffer {
    buf: Vec<u8>,
    len: usize,
    class: Option<usize>,
    pool: Arc<BufferPool>,
}

impl PooledBuffer {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.buf[..self.len]
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(class) = self.class {
            self.pool.release(class, std::mem::take(&mut self.buf));
        }
    }
}

impl std::fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.len)
            .field("capacity", &self.buf.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_returns_on_drop() {
        let pool = BufferPool::new(4);
        assert_eq!(pool.idle_buffers(), 0);

        {
            let buf = pool.acquire(1000);
            assert_eq!(buf.len(), 1000);
        }
        assert_eq!(pool.idle_buffers(), 1);

        // Same class is reused rather than allocated
        let _buf = pool.acquire(2000);
        assert_eq!(pool.idle_buffers(), 0);
    }

    #[test]
    fn test_size_class_selection() {
        let pool = BufferPool::new(4);
        let small = pool.acquire(10);
        let large = pool.acquire((1 << 16) + 1);
        assert_eq!(small.class, Some(0));
        assert_eq!(large.class, Some(1));
        assert_eq!(large.buf.len(), 1 << 17);
    }

    #[test]
    fn test_oversized_requests_are_not_pooled() {
        let pool = BufferPool::new(4);
        drop(pool.acquire((1 << MAX_CLASS_SHIFT) + 1));
        assert_eq!(pool.idle_buffers(), 0);
    }

    #[test]
    fn test_retention_is_bounded() {
        let pool = BufferPool::new(2);
        let held: Vec<_> = (0..5).map(|_| pool.acquire(100)).collect();
        drop(held);
        assert_eq!(pool.idle_buffers(), 2);
    }

    #[test]
    fn test_buffer_returns_when_task_panics() {
        let pool = BufferPool::new(4);
        let task_pool = Arc::clone(&pool);
        let result = std::thread::spawn(move || {
            let _buf = task_pool.acquire(512);
            panic!("decode failed");
        })
        .join();
        assert!(result.is_err());
        assert_eq!(pool.idle_buffers(), 1);
    }
}
