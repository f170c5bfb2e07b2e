//! Thread-safe allocator wrapper

use parking_lot::Mutex;

use super::ChunkAllocator;
use crate::chunk::Chunk;
use crate::field_type::FieldType;

/// Serializes every call to the wrapped allocator behind one mutex
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use std::thread;
///
/// use nebula_chunk::{Allocator, ChunkAllocator, FieldType, SyncAllocator};
///
/// let alloc = Arc::new(SyncAllocator::new(Allocator::new()));
///
/// let handles: Vec<_> = (0..4)
///     .map(|_| {
///         let alloc = Arc::clone(&alloc);
///         thread::spawn(move || {
///             let chk = alloc.alloc(&[FieldType::LongLong], 32, 1024);
///             assert_eq!(chk.num_columns(), 1);
///         })
///     })
///     .collect();
///
/// for h in handles {
///     h.join().unwrap();
/// }
/// alloc.reset();
/// ```
#[derive(Debug, Default)]
pub struct SyncAllocator<A> {
    inner: Mutex<A>,
}

impl<A: ChunkAllocator> SyncAllocator<A> {
    pub fn new(inner: A) -> Self {
        Self {
            inner: Mutex::new(inner),
        }
    }

    /// Run `f` with exclusive access to the wrapped allocator
    pub fn with_inner<R>(&self, f: impl FnOnce(&A) -> R) -> R {
        f(&self.inner.lock())
    }

    pub fn into_inner(self) -> A {
        self.inner.into_inner()
    }
}

impl<A: ChunkAllocator> ChunkAllocator for SyncAllocator<A> {
    fn alloc(&self, fields: &[FieldType], capacity: usize, max_chunk_size: usize) -> Chunk {
        self.inner.lock().alloc(fields, capacity, max_chunk_size)
    }

    fn reset(&self) {
        self.inner.lock().reset();
    }

    fn check_reuse_alloc_size(&self) -> bool {
        self.inner.lock().check_reuse_alloc_size()
    }
}
