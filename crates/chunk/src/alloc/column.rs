//! Column allocators
//!
//! The pool keeps one LIFO free list per element width. Two field types
//! with the same width share a list, so a column released by a `Datetime`
//! field may come back as a `Timestamp` one.

use std::collections::HashMap;

#[cfg(feature = "logging")]
use tracing::trace;

use super::stats::ColumnAllocStats;
use crate::column::Column;
use crate::config::ReuseLimits;
use crate::field_type::{ElemWidth, FieldType};

/// Source of columns for chunk construction
pub trait ColumnAllocator {
    /// Get an empty column for `ft` able to hold `capacity` rows
    fn new_column(&mut self, ft: FieldType, capacity: usize) -> Column;
}

impl<A: ColumnAllocator + ?Sized> ColumnAllocator for &mut A {
    fn new_column(&mut self, ft: FieldType, capacity: usize) -> Column {
        (**self).new_column(ft, capacity)
    }
}

/// Column allocator that always builds a fresh column
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultColumnAllocator;

impl ColumnAllocator for DefaultColumnAllocator {
    fn new_column(&mut self, ft: FieldType, capacity: usize) -> Column {
        Column::new(ft, capacity)
    }
}

/// Why a released column did or did not land on a free list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReleaseOutcome {
    /// Kept for reuse
    Pooled,
    /// Flagged unsafe or still viewing shared memory
    Unsafe,
    /// Its width's free list was already at the cap
    Full,
    /// Its buffer grew past the oversize guard
    Oversized,
}

impl ReleaseOutcome {
    #[must_use]
    pub fn is_pooled(self) -> bool {
        self == Self::Pooled
    }
}

/// Per-width free lists of columns
#[derive(Debug, Clone)]
pub struct PoolColumnAllocator {
    pool: HashMap<ElemWidth, Vec<Column>>,
    max_free_columns_per_type: usize,
    growth_factor: usize,
    stats: ColumnAllocStats,
}

impl Default for PoolColumnAllocator {
    fn default() -> Self {
        Self::new(&ReuseLimits::default())
    }
}

impl PoolColumnAllocator {
    /// Create an empty pool bounded by `limits`
    #[must_use]
    pub fn new(limits: &ReuseLimits) -> Self {
        Self {
            pool: HashMap::new(),
            max_free_columns_per_type: limits.max_free_columns_per_type,
            growth_factor: limits.column_growth_factor,
            stats: ColumnAllocStats::default(),
        }
    }

    /// Take the most recently released column of `ft`'s width, or build one
    pub fn acquire(&mut self, ft: FieldType, capacity: usize) -> Column {
        let width = ft.elem_width();
        match self.pool.get_mut(&width).and_then(Vec::pop) {
            Some(mut column) => {
                column.reset(ft);
                column.reserve_rows(capacity);
                self.stats.record_reused();

                #[cfg(feature = "logging")]
                trace!(%width, capacity, "reused pooled column");

                column
            }
            None => {
                self.stats.record_created();
                Column::new(ft, capacity)
            }
        }
    }

    /// Offer a column back to the pool
    ///
    /// Unsafe columns are never kept. The cap is checked before the oversize
    /// guard, so a full list rejects every column of its width.
    pub fn release(&mut self, column: Column) -> ReleaseOutcome {
        let outcome = self.classify(&column);
        if outcome.is_pooled() {
            self.pool.entry(column.width()).or_default().push(column);
        } else {
            #[cfg(feature = "logging")]
            trace!(width = %column.width(), ?outcome, "column dropped instead of pooled");
        }
        self.stats.record_release(outcome);
        outcome
    }

    fn classify(&self, column: &Column) -> ReleaseOutcome {
        if !column.is_reusable() {
            ReleaseOutcome::Unsafe
        } else if self.free_columns(column.width()) >= self.max_free_columns_per_type {
            ReleaseOutcome::Full
        } else if column.is_oversized(self.growth_factor) {
            ReleaseOutcome::Oversized
        } else {
            ReleaseOutcome::Pooled
        }
    }

    /// Columns waiting on the free list for `width`
    #[must_use]
    pub fn free_columns(&self, width: ElemWidth) -> usize {
        self.pool.get(&width).map_or(0, Vec::len)
    }

    /// The free list for `width`, most recently released last
    #[must_use]
    pub fn free_list(&self, width: ElemWidth) -> &[Column] {
        self.pool.get(&width).map(Vec::as_slice).unwrap_or_default()
    }

    /// Free list lengths for every width seen so far
    pub fn free_counts(&self) -> impl Iterator<Item = (ElemWidth, usize)> + '_ {
        self.pool.iter().map(|(&width, list)| (width, list.len()))
    }

    #[must_use]
    pub fn max_free_columns_per_type(&self) -> usize {
        self.max_free_columns_per_type
    }

    #[must_use]
    pub fn stats(&self) -> ColumnAllocStats {
        self.stats
    }

    /// Drop every cached column
    pub fn clear(&mut self) {
        self.pool.clear();
    }
}

impl ColumnAllocator for PoolColumnAllocator {
    fn new_column(&mut self, ft: FieldType, capacity: usize) -> Column {
        self.acquire(ft, capacity)
    }
}
