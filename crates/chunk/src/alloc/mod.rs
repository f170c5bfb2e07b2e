//! Chunk and column allocators
//!
//! This module provides the reuse layer for row batches:
//! - `PoolColumnAllocator`: per-width LIFO free lists of columns
//! - `Allocator`: bounded free list of chunk shells on top of a column pool
//! - `SyncAllocator`: mutex wrapper for sharing one allocator across threads
//! - `ReuseHookAllocator`: signals once when pooled reuse becomes active
//! - `DefaultAllocator` / `DefaultColumnAllocator`: always allocate fresh
//!
//! Every allocator implements [`ChunkAllocator`], so wrappers compose by
//! delegating to whatever they wrap.

mod chunk;
mod column;
mod hook;
mod stats;
mod sync;

use std::sync::Arc;

pub use chunk::Allocator;
pub use column::{ColumnAllocator, DefaultColumnAllocator, PoolColumnAllocator, ReleaseOutcome};
pub use hook::ReuseHookAllocator;
pub use stats::{AllocatorStats, ColumnAllocStats, ResetSummary};
pub use sync::SyncAllocator;

use crate::chunk::Chunk;
use crate::field_type::FieldType;

/// Capability shared by every chunk allocator
pub trait ChunkAllocator {
    /// Get a chunk for `fields` sized for `min(capacity, max_chunk_size)` rows
    fn alloc(&self, fields: &[FieldType], capacity: usize, max_chunk_size: usize) -> Chunk;

    /// Recycle everything handed out since the previous reset
    fn reset(&self);

    /// Whether the configured limits make pooling worthwhile
    fn check_reuse_alloc_size(&self) -> bool;
}

impl<A: ChunkAllocator + ?Sized> ChunkAllocator for &A {
    fn alloc(&self, fields: &[FieldType], capacity: usize, max_chunk_size: usize) -> Chunk {
        (**self).alloc(fields, capacity, max_chunk_size)
    }

    fn reset(&self) {
        (**self).reset();
    }

    fn check_reuse_alloc_size(&self) -> bool {
        (**self).check_reuse_alloc_size()
    }
}

impl<A: ChunkAllocator + ?Sized> ChunkAllocator for Box<A> {
    fn alloc(&self, fields: &[FieldType], capacity: usize, max_chunk_size: usize) -> Chunk {
        (**self).alloc(fields, capacity, max_chunk_size)
    }

    fn reset(&self) {
        (**self).reset();
    }

    fn check_reuse_alloc_size(&self) -> bool {
        (**self).check_reuse_alloc_size()
    }
}

impl<A: ChunkAllocator + ?Sized> ChunkAllocator for Arc<A> {
    fn alloc(&self, fields: &[FieldType], capacity: usize, max_chunk_size: usize) -> Chunk {
        (**self).alloc(fields, capacity, max_chunk_size)
    }

    fn reset(&self) {
        (**self).reset();
    }

    fn check_reuse_alloc_size(&self) -> bool {
        (**self).check_reuse_alloc_size()
    }
}

/// Allocator that never pools: every chunk is built from scratch
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultAllocator;

impl ChunkAllocator for DefaultAllocator {
    fn alloc(&self, fields: &[FieldType], capacity: usize, max_chunk_size: usize) -> Chunk {
        Chunk::new(fields, capacity, max_chunk_size)
    }

    fn reset(&self) {}

    fn check_reuse_alloc_size(&self) -> bool {
        false
    }
}
