//! Pooled chunk allocator

use core::cell::RefCell;
use core::fmt;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::debug;

use super::column::PoolColumnAllocator;
use super::stats::{AllocatorStats, ResetSummary};
use super::ChunkAllocator;
use crate::chunk::{Chunk, ChunkParts, RetireQueue, Slot};
use crate::config::{global_limits, ReuseLimits};
use crate::field_type::{ElemWidth, FieldType};

struct AllocatorState {
    /// Emptied chunk shells ready to be refilled
    free: Vec<ChunkParts>,
    columns: PoolColumnAllocator,
    /// Scratch buffer for draining the retire queue
    retired: Vec<ChunkParts>,
    resets: u64,
}

/// Chunk allocator that recycles chunks and columns between resets
///
/// Chunks handed out by [`alloc`](ChunkAllocator::alloc) go back to the
/// allocator when they are dropped; [`reset`](ChunkAllocator::reset) then
/// moves their columns onto per-width free lists and their shells onto the
/// chunk free list. A chunk still alive during a reset is left alone and
/// recycled by a later reset.
///
/// The allocator is meant to be owned by one query; wrap it in a
/// [`SyncAllocator`](super::SyncAllocator) to share it across threads.
///
/// # Example
/// ```
/// use nebula_chunk::{Allocator, ChunkAllocator, FieldType, ReuseLimits};
///
/// let alloc = Allocator::with_limits(ReuseLimits::new(4, 16));
/// let fields = [FieldType::LongLong, FieldType::Varchar];
///
/// let chk = alloc.alloc(&fields, 32, 1024);
/// drop(chk);
/// alloc.reset();
///
/// assert_eq!(alloc.free_chunks(), 1);
/// let chk = alloc.alloc(&fields, 32, 1024);
/// assert_eq!(chk.num_rows(), 0);
/// ```
pub struct Allocator {
    state: RefCell<AllocatorState>,
    queue: Arc<RetireQueue>,
    limits: ReuseLimits,
}

impl Allocator {
    /// Create an allocator using the process-wide limits
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(global_limits())
    }

    /// Create an allocator with explicit limits
    #[must_use]
    pub fn with_limits(limits: ReuseLimits) -> Self {
        Self {
            state: RefCell::new(AllocatorState {
                free: Vec::new(),
                columns: PoolColumnAllocator::new(&limits),
                retired: Vec::new(),
                resets: 0,
            }),
            queue: Arc::new(RetireQueue::default()),
            limits,
        }
    }

    #[must_use]
    pub fn limits(&self) -> &ReuseLimits {
        &self.limits
    }

    /// Chunk shells on the free list
    #[must_use]
    pub fn free_chunks(&self) -> usize {
        self.state.borrow().free.len()
    }

    /// Chunks handed out and not dropped or detached yet
    #[must_use]
    pub fn chunks_in_use(&self) -> usize {
        self.queue.outstanding()
    }

    /// Columns on the free list for `width`
    #[must_use]
    pub fn free_columns(&self, width: ElemWidth) -> usize {
        self.state.borrow().columns.free_columns(width)
    }

    /// Run `f` against the column pool
    ///
    /// The pool stays borrowed while `f` runs. Read counts out through
    /// [`Allocator::stats`] when the closure needs to allocate.
    ///
    /// # Panics
    ///
    /// Panics if `f` calls `alloc`, `reset` or `reset_and_report` on this
    /// allocator.
    pub fn with_column_pool<R>(&self, f: impl FnOnce(&PoolColumnAllocator) -> R) -> R {
        f(&self.state.borrow().columns)
    }

    #[must_use]
    pub fn stats(&self) -> AllocatorStats {
        let state = self.state.borrow();
        AllocatorStats {
            free_chunks: state.free.len(),
            chunks_in_use: self.queue.outstanding(),
            free_columns: state.columns.free_counts().collect(),
            columns: state.columns.stats(),
            resets: state.resets,
        }
    }

    /// Reset and report what was recycled
    pub fn reset_and_report(&self) -> ResetSummary {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let mut summary = ResetSummary::default();

        self.queue.drain_into(&mut state.retired);
        for mut parts in state.retired.drain(..) {
            for slot in parts.slots.drain(..) {
                if let Slot::Owned(column) = slot {
                    summary.record_column(state.columns.release(column));
                }
            }
            for column in parts.detached.drain(..) {
                summary.record_column(state.columns.release(column));
            }
            parts.fields.clear();

            if state.free.len() < self.limits.max_free_chunks {
                state.free.push(parts);
                summary.chunks_recycled += 1;
            } else {
                summary.chunks_discarded += 1;
            }
        }
        state.resets += 1;

        #[cfg(feature = "logging")]
        if !summary.is_empty() {
            debug!(
                chunks_recycled = summary.chunks_recycled,
                chunks_discarded = summary.chunks_discarded,
                columns_pooled = summary.columns_pooled,
                columns_dropped =
                    summary.columns_unsafe + summary.columns_full + summary.columns_oversized,
                still_in_use = self.queue.outstanding(),
                "chunk allocator reset"
            );
        }

        summary
    }
}

impl Default for Allocator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Allocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Allocator")
            .field("limits", &self.limits)
            .field("free_chunks", &self.free_chunks())
            .field("chunks_in_use", &self.chunks_in_use())
            .finish_non_exhaustive()
    }
}

impl ChunkAllocator for Allocator {
    fn alloc(&self, fields: &[FieldType], capacity: usize, max_chunk_size: usize) -> Chunk {
        let capacity = capacity.min(max_chunk_size);
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;

        let mut parts = state
            .free
            .pop()
            .unwrap_or_else(|| ChunkParts::with_capacity(fields.len()));
        for &ft in fields {
            let column = state.columns.acquire(ft, capacity);
            parts.fields.push(ft);
            parts.slots.push(Slot::Owned(column));
        }

        self.queue.checkout();
        Chunk::from_parts(
            parts,
            capacity,
            max_chunk_size,
            Some(Arc::downgrade(&self.queue)),
        )
    }

    fn reset(&self) {
        self.reset_and_report();
    }

    fn check_reuse_alloc_size(&self) -> bool {
        self.limits.is_reuse_enabled()
    }
}
