//! Pooled byte-buffer allocator.
//!
//! Everything on the hot I/O path borrows buffers from here instead of
//! allocating per operation. Buffers are bucketed by power-of-two size;
//! each bucket keeps its own free list behind its own lock so concurrent
//! acquire/release from connection workers never contend on a global lock.
//!
//! Ownership is the safety story: [`BufferPool::release`] consumes the
//! buffer, so double-release and use-after-release do not compile, and a
//! [`BufferView`] borrows the buffer, so it cannot outlive (or be released
//! under) its owner.

use dashmap::DashMap;
use std::ops::{Deref, DerefMut};
use std::time::{Duration, Instant};

/// Smallest bucket handed out (4 KiB, a typical recv buffer floor).
const MIN_BUCKET_SIZE: usize = 4096;

/// A buffer drawn from a [`BufferPool`].
///
/// Exclusively owned by whoever holds it; return it with
/// [`BufferPool::release`] when done.
#[derive(Debug)]
pub struct PooledBuffer {
    data: Vec<u8>,
    bucket: usize,
}

impl PooledBuffer {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Borrow a sub-range as a non-owning view.
    ///
    /// # Panics
    /// Panics if `offset + count` exceeds the buffer length.
    pub fn view(&self, offset: usize, count: usize) -> BufferView<'_> {
        assert!(offset + count <= self.data.len(), "view out of bounds");
        BufferView { buffer: self, offset, count }
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// Non-owning slice into a [`PooledBuffer`] ("segment").
///
/// Slicing produces further views without copying. The underlying buffer
/// can only be released once every view's borrow has ended.
#[derive(Debug, Clone, Copy)]
pub struct BufferView<'a> {
    buffer: &'a PooledBuffer,
    offset: usize,
    count: usize,
}

impl<'a> BufferView<'a> {
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn as_slice(&self) -> &'a [u8] {
        &self.buffer.data[self.offset..self.offset + self.count]
    }

    /// Re-slice relative to this view.
    ///
    /// # Panics
    /// Panics if `offset + count` exceeds this view's length.
    pub fn slice(&self, offset: usize, count: usize) -> BufferView<'a> {
        assert!(offset + count <= self.count, "view out of bounds");
        BufferView { buffer: self.buffer, offset: self.offset + offset, count }
    }
}

impl Deref for BufferView<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

/// Free-list entry: a returned buffer plus its release timestamp, so the
/// sweep can age out buffers the pool no longer needs.
struct FreeBuffer {
    data: Vec<u8>,
    released_at: Instant,
}

/// Size-bucketed reusable byte-buffer pool.
///
/// `acquire` never fails: if the matching bucket's free list is empty, a
/// fresh buffer is allocated. Total concurrent acquisitions are bounded by
/// backpressure at the admission layer (the variant pool's connection cap),
/// not here.
pub struct BufferPool {
    buckets: DashMap<usize, Vec<FreeBuffer>>,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool").field("idle_buffers", &self.idle_buffer_count()).finish()
    }
}

impl BufferPool {
    pub fn new() -> Self {
        Self { buckets: DashMap::new() }
    }

    fn bucket_for(min_size: usize) -> usize {
        min_size.max(MIN_BUCKET_SIZE).next_power_of_two()
    }

    /// Get a buffer of length >= `min_size`.
    ///
    /// With `zero_fill`, reused buffers are zeroed before being handed out;
    /// freshly allocated ones are zeroed either way.
    pub fn acquire(&self, min_size: usize, zero_fill: bool) -> PooledBuffer {
        let bucket = Self::bucket_for(min_size);

        if let Some(mut free) = self.buckets.get_mut(&bucket) {
            if let Some(entry) = free.pop() {
                drop(free);
                let mut data = entry.data;
                if zero_fill {
                    data.fill(0);
                }
                return PooledBuffer { data, bucket };
            }
        }

        PooledBuffer { data: vec![0u8; bucket], bucket }
    }

    /// Return a buffer to its bucket's free list.
    pub fn release(&self, buffer: PooledBuffer) {
        self.buckets
            .entry(buffer.bucket)
            .or_default()
            .push(FreeBuffer { data: buffer.data, released_at: Instant::now() });
    }

    /// Evict free buffers that have sat unused longer than `max_age`.
    pub fn sweep(&self, max_age: Duration) {
        let now = Instant::now();
        for mut entry in self.buckets.iter_mut() {
            entry.value_mut().retain(|free| now.duration_since(free.released_at) <= max_age);
        }
    }

    /// Number of buffers currently sitting on free lists.
    pub fn idle_buffer_count(&self) -> usize {
        self.buckets.iter().map(|entry| entry.value().len()).sum()
    }
}
