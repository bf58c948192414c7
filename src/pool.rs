//! Process-wide byte-buffer pool (§4.6, §9 "global state").
//!
//! The only global state in the crate: a capacity-class-keyed pool of
//! reusable `Vec<u8>` scratch buffers, so [`crate::stream::AssetStream`]
//! doesn't allocate on every block load. Buckets are keyed by the next
//! power-of-two at or above the requested size, so a rented buffer may be
//! larger than asked for — callers slice to the logical length they need.
//!
//! Safe for concurrent use from any thread; no buffer is ever shared between
//! two live rentals.

use std::collections::HashMap;
use std::sync::OnceLock;

use parking_lot::Mutex;

fn buckets() -> &'static Mutex<HashMap<usize, Vec<Vec<u8>>>> {
    static BUCKETS: OnceLock<Mutex<HashMap<usize, Vec<Vec<u8>>>>> = OnceLock::new();
    BUCKETS.get_or_init(|| Mutex::new(HashMap::new()))
}

fn capacity_class(size: usize) -> usize {
    size.next_power_of_two().max(64)
}

/// A rented buffer. Returns itself to the pool on drop unless
/// [`PooledBuffer::forget`] is called first — either way a given buffer is
/// returned at most once.
pub struct PooledBuffer {
    buf: Option<Vec<u8>>,
    class: usize,
}

impl PooledBuffer {
    pub fn as_slice(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or(&[])
    }

    pub fn as_mut_vec(&mut self) -> &mut Vec<u8> {
        self.buf.as_mut().expect("buffer already released")
    }

    /// Drop the buffer without returning it to the pool — used when the
    /// logical size differs enough from the physical allocation that
    /// reusing it would waste more memory than it saves (the spec's "last
    /// block of a chunk" carve-out for pooling).
    pub fn forget(mut self) {
        self.buf = None;
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(mut buf) = self.buf.take() {
            buf.clear();
            buckets().lock().entry(self.class).or_default().push(buf);
        }
    }
}

/// Rent a buffer of at least `size` bytes, zero-filled up to `size`. The
/// returned buffer's capacity may exceed `size`; its length is exactly
/// `size`.
pub fn rent(size: usize) -> PooledBuffer {
    let class = capacity_class(size);
    let mut buf = buckets()
        .lock()
        .get_mut(&class)
        .and_then(Vec::pop)
        .unwrap_or_default();
    buf.clear();
    buf.resize(size, 0);
    PooledBuffer { buf: Some(buf), class }
}

/// Number of buffers currently sitting in the pool, across all capacity
/// classes. Exposed only for the buffer-pool-discipline test in
/// [`crate::stream`].
#[cfg(test)]
pub fn outstanding_pooled_count() -> usize {
    buckets().lock().values().map(Vec::len).sum()
}
