//! # Buffer Pool
//!
//! Reusable scratch buffers for frame body encoding.
//!
//! Encoding a body needs a place to serialize and compress into before the
//! frame length is known. Each encode acquires a buffer, and the buffer goes
//! back to the pool when the guard drops, so pooled executors never share
//! per-thread state.
//!
//! ## Usage
//! ```rust
//! use netrpc::utils::buffer_pool::BufferPool;
//!
//! let pool = BufferPool::new(4);
//! {
//!     let mut scratch = pool.acquire();
//!     scratch.extend_from_slice(b"body");
//! }
//! assert_eq!(pool.available(), 4);
//! ```

use std::sync::{Arc, Mutex};

/// Buffers that grew beyond this are dropped instead of returned
const MAX_POOLED_BUFFER_SIZE: usize = 64 * 1024;

/// Capacity of freshly allocated buffers
const DEFAULT_BUFFER_CAPACITY: usize = 1024;

/// Upper bound on idle buffers retained by a pool
const MAX_IDLE_BUFFERS: usize = 256;

type Slots = Arc<Mutex<Vec<Vec<u8>>>>;

/// A scoped buffer that returns itself to its pool when dropped
pub struct PooledBuffer {
    buffer: Vec<u8>,
    slots: Slots,
}

impl PooledBuffer {
    /// Take the bytes out, leaving an empty buffer to be recycled
    pub fn take(&mut self) -> Vec<u8> {
        let taken = self.buffer.clone();
        self.buffer.clear();
        taken
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if self.buffer.capacity() > MAX_POOLED_BUFFER_SIZE {
            return;
        }
        self.buffer.clear();
        if let Ok(mut slots) = self.slots.lock() {
            if slots.len() < MAX_IDLE_BUFFERS {
                slots.push(std::mem::take(&mut self.buffer));
            }
        }
    }
}

impl std::ops::Deref for PooledBuffer {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.buffer
    }
}

impl std::ops::DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buffer
    }
}

/// Thread-safe pool of scratch buffers
#[derive(Clone)]
pub struct BufferPool {
    slots: Slots,
}

impl BufferPool {
    /// Create a pool pre-filled with `size` buffers
    pub fn new(size: usize) -> Self {
        let slots = (0..size)
            .map(|_| Vec::with_capacity(DEFAULT_BUFFER_CAPACITY))
            .collect();
        Self {
            slots: Arc::new(Mutex::new(slots)),
        }
    }

    /// Borrow a buffer, allocating when the pool is drained
    pub fn acquire(&self) -> PooledBuffer {
        let buffer = self
            .slots
            .lock()
            .ok()
            .and_then(|mut slots| slots.pop())
            .unwrap_or_else(|| Vec::with_capacity(DEFAULT_BUFFER_CAPACITY));

        PooledBuffer {
            buffer,
            slots: self.slots.clone(),
        }
    }

    /// Number of idle buffers
    pub fn available(&self) -> usize {
        self.slots.lock().map(|s| s.len()).unwrap_or(0)
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(16)
    }
}
