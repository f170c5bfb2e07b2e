//! Statistics for chunk and column allocators

use std::collections::BTreeMap;

use super::column::ReleaseOutcome;
use crate::field_type::ElemWidth;

/// Counters kept by a [`PoolColumnAllocator`](super::PoolColumnAllocator)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnAllocStats {
    /// Columns built from scratch
    pub created: u64,
    /// Columns served from a free list
    pub reused: u64,
    /// Columns pushed onto a free list
    pub pooled: u64,
    /// Columns dropped because they were flagged unsafe or not owned
    pub discarded_unsafe: u64,
    /// Columns dropped because their free list was full
    pub discarded_full: u64,
    /// Columns dropped because their buffer outgrew the oversize guard
    pub discarded_oversized: u64,
}

impl ColumnAllocStats {
    pub(crate) fn record_created(&mut self) {
        self.created += 1;
    }

    pub(crate) fn record_reused(&mut self) {
        self.reused += 1;
    }

    pub(crate) fn record_release(&mut self, outcome: ReleaseOutcome) {
        match outcome {
            ReleaseOutcome::Pooled => self.pooled += 1,
            ReleaseOutcome::Unsafe => self.discarded_unsafe += 1,
            ReleaseOutcome::Full => self.discarded_full += 1,
            ReleaseOutcome::Oversized => self.discarded_oversized += 1,
        }
    }

    /// Total acquisitions, fresh or reused
    #[must_use]
    pub fn acquired(&self) -> u64 {
        self.created + self.reused
    }

    /// Total columns handed back to ordinary deallocation
    #[must_use]
    pub fn discarded(&self) -> u64 {
        self.discarded_unsafe + self.discarded_full + self.discarded_oversized
    }

    /// Fraction of acquisitions served from a free list
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let acquired = self.acquired();
        if acquired == 0 {
            0.0
        } else {
            self.reused as f64 / acquired as f64
        }
    }
}

/// What one allocator reset did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetSummary {
    /// Chunk shells kept on the free list
    pub chunks_recycled: usize,
    /// Chunk shells dropped because the free list was full
    pub chunks_discarded: usize,
    pub columns_pooled: usize,
    pub columns_unsafe: usize,
    pub columns_full: usize,
    pub columns_oversized: usize,
}

impl ResetSummary {
    pub(crate) fn record_column(&mut self, outcome: ReleaseOutcome) {
        match outcome {
            ReleaseOutcome::Pooled => self.columns_pooled += 1,
            ReleaseOutcome::Unsafe => self.columns_unsafe += 1,
            ReleaseOutcome::Full => self.columns_full += 1,
            ReleaseOutcome::Oversized => self.columns_oversized += 1,
        }
    }

    /// Chunks the reset processed
    #[must_use]
    pub fn chunks(&self) -> usize {
        self.chunks_recycled + self.chunks_discarded
    }

    /// Whether the reset found nothing to do
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Point-in-time view of an [`Allocator`](super::Allocator)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllocatorStats {
    /// Chunk shells waiting on the free list
    pub free_chunks: usize,
    /// Chunks handed out and not dropped yet
    pub chunks_in_use: usize,
    /// Free list length per element width
    pub free_columns: BTreeMap<ElemWidth, usize>,
    /// Column pool counters
    pub columns: ColumnAllocStats,
    /// Resets performed so far
    pub resets: u64,
}
