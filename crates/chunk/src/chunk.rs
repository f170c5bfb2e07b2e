//! Row batches
//!
//! A [`Chunk`] holds one column per schema field. A field may also be a
//! reference to another field's column: the referencing slot stores only
//! the index of the owning slot, so each column buffer has exactly one owner
//! and can never be handed back to a pool twice.
//!
//! Chunks handed out by an [`Allocator`](crate::Allocator) remember where
//! they came from. Dropping such a chunk queues its columns for the
//! allocator's next [`reset`](crate::ChunkAllocator::reset).

use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Weak;

use parking_lot::Mutex;

use crate::alloc::{ColumnAllocator, DefaultColumnAllocator};
use crate::column::Column;
use crate::error::{ChunkError, ChunkResult};
use crate::field_type::FieldType;

/// One field of a chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Slot {
    /// The slot owns its column
    Owned(Column),
    /// The slot views the column owned by the slot at this index
    Ref(usize),
}

/// Reusable storage behind a chunk
#[derive(Debug, Default)]
pub(crate) struct ChunkParts {
    pub(crate) slots: Vec<Slot>,
    pub(crate) fields: Vec<FieldType>,
    /// Columns no slot owns any more after a reference replaced them
    pub(crate) detached: Vec<Column>,
}

impl ChunkParts {
    pub(crate) fn with_capacity(columns: usize) -> Self {
        Self {
            slots: Vec::with_capacity(columns),
            fields: Vec::with_capacity(columns),
            detached: Vec::new(),
        }
    }
}

/// Chunks dropped since the owning allocator last reset
#[derive(Debug, Default)]
pub(crate) struct RetireQueue {
    retired: Mutex<Vec<ChunkParts>>,
    outstanding: AtomicUsize,
}

impl RetireQueue {
    pub(crate) fn checkout(&self) {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
    }

    fn release(&self) {
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
    }

    fn retire(&self, parts: ChunkParts) {
        self.retired.lock().push(parts);
        self.release();
    }

    /// Move every retired chunk into `out`, keeping the queue's buffer
    pub(crate) fn drain_into(&self, out: &mut Vec<ChunkParts>) {
        out.append(&mut self.retired.lock());
    }

    /// Chunks handed out and not yet dropped
    pub(crate) fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }
}

/// Fixed-schema batch of column buffers
///
/// # Example
/// ```
/// use nebula_chunk::{Chunk, FieldType};
///
/// let mut chk = Chunk::new(&[FieldType::LongLong, FieldType::Varchar], 32, 1024);
/// chk.column_mut(0).unwrap().append_i64(1)?;
/// chk.column_mut(1).unwrap().append_bytes(b"one")?;
///
/// assert_eq!(chk.num_columns(), 2);
/// assert_eq!(chk.num_rows(), 1);
/// # Ok::<(), nebula_chunk::ChunkError>(())
/// ```
pub struct Chunk {
    parts: ChunkParts,
    capacity: usize,
    required_rows: usize,
    retire: Option<Weak<RetireQueue>>,
}

impl Chunk {
    /// Create a chunk with freshly allocated columns
    #[must_use]
    pub fn new(fields: &[FieldType], capacity: usize, max_chunk_size: usize) -> Self {
        Self::with_column_allocator(
            fields,
            capacity,
            max_chunk_size,
            &mut DefaultColumnAllocator,
        )
    }

    /// Create a chunk whose columns come from `alloc`
    #[must_use]
    pub fn with_column_allocator<A>(
        fields: &[FieldType],
        capacity: usize,
        max_chunk_size: usize,
        alloc: &mut A,
    ) -> Self
    where
        A: ColumnAllocator + ?Sized,
    {
        let capacity = capacity.min(max_chunk_size);
        let mut parts = ChunkParts::with_capacity(fields.len());
        for &ft in fields {
            parts.fields.push(ft);
            parts
                .slots
                .push(Slot::Owned(alloc.new_column(ft, capacity)));
        }
        Self::from_parts(parts, capacity, max_chunk_size, None)
    }

    pub(crate) fn from_parts(
        parts: ChunkParts,
        capacity: usize,
        required_rows: usize,
        retire: Option<Weak<RetireQueue>>,
    ) -> Self {
        Self {
            parts,
            capacity,
            required_rows,
            retire,
        }
    }

    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.parts.slots.len()
    }

    /// Rows in the chunk, taken from the first column
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.column(0).map_or(0, Column::len)
    }

    /// Row capacity the columns were sized for
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Rows the consumer wants before the chunk counts as full
    #[must_use]
    pub fn required_rows(&self) -> usize {
        self.required_rows
    }

    /// Change the required row count, never beyond `max_chunk_size`
    pub fn set_required_rows(&mut self, required_rows: usize, max_chunk_size: usize) {
        self.required_rows = required_rows.clamp(1, max_chunk_size.max(1));
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.num_rows() >= self.required_rows
    }

    /// Field types in schema order
    #[must_use]
    pub fn field_types(&self) -> &[FieldType] {
        &self.parts.fields
    }

    fn resolve(&self, index: usize) -> usize {
        match self.parts.slots[index] {
            Slot::Owned(_) => index,
            Slot::Ref(owner) => owner,
        }
    }

    /// Column at `index`, following references to the owning slot
    #[must_use]
    pub fn column(&self, index: usize) -> Option<&Column> {
        if index >= self.parts.slots.len() {
            return None;
        }
        match &self.parts.slots[self.resolve(index)] {
            Slot::Owned(column) => Some(column),
            Slot::Ref(_) => None,
        }
    }

    /// Mutable column at `index`; writes through a reference reach the owner
    pub fn column_mut(&mut self, index: usize) -> Option<&mut Column> {
        if index >= self.parts.slots.len() {
            return None;
        }
        let owner = self.resolve(index);
        match &mut self.parts.slots[owner] {
            Slot::Owned(column) => Some(column),
            Slot::Ref(_) => None,
        }
    }

    /// Columns in schema order, references resolved
    pub fn columns(&self) -> impl Iterator<Item = &Column> + '_ {
        (0..self.num_columns()).filter_map(move |index| self.column(index))
    }

    /// Whether the slot at `index` views another slot's column
    #[must_use]
    pub fn is_reference(&self, index: usize) -> bool {
        matches!(self.parts.slots.get(index), Some(Slot::Ref(_)))
    }

    /// Whether two slots resolve to the same column storage
    #[must_use]
    pub fn same_storage(&self, a: usize, b: usize) -> bool {
        match (self.column(a), self.column(b)) {
            (Some(x), Some(y)) => core::ptr::eq(x, y),
            _ => false,
        }
    }

    /// Make the column at `dest` a view of the column at `src`
    ///
    /// If other slots were viewing `dest`, the first of them takes over its
    /// column. Otherwise the replaced column goes back to the pool together
    /// with the chunk.
    pub fn make_column_reference(&mut self, dest: usize, src: usize) -> ChunkResult<()> {
        let len = self.parts.slots.len();
        if dest >= len {
            return Err(ChunkError::column_index(dest, len));
        }
        if src >= len {
            return Err(ChunkError::column_index(src, len));
        }

        let owner = self.resolve(src);
        if self.resolve(dest) == owner {
            return Ok(());
        }

        let replaced = core::mem::replace(&mut self.parts.slots[dest], Slot::Ref(owner));
        if let Slot::Owned(column) = replaced {
            let heir = self
                .parts
                .slots
                .iter()
                .position(|slot| matches!(slot, Slot::Ref(r) if *r == dest));
            match heir {
                Some(heir) => {
                    for slot in &mut self.parts.slots {
                        if let Slot::Ref(r) = slot
                            && *r == dest
                        {
                            *r = heir;
                        }
                    }
                    self.parts.slots[heir] = Slot::Owned(column);
                }
                None => self.parts.detached.push(column),
            }
        }
        Ok(())
    }

    /// Clear every column, keeping buffers for the next batch
    pub fn reset(&mut self) {
        let ChunkParts { slots, fields, .. } = &mut self.parts;
        for (slot, &ft) in slots.iter_mut().zip(fields.iter()) {
            if let Slot::Owned(column) = slot {
                column.reset(ft);
            }
        }
    }

    /// Stop this chunk from returning to its allocator when dropped
    ///
    /// Use it for chunks that must outlive the allocator's next reset.
    pub fn detach(&mut self) {
        if let Some(queue) = self.retire.take().and_then(|weak| weak.upgrade()) {
            queue.release();
        }
    }

    /// Whether dropping this chunk hands its columns back to an allocator
    #[must_use]
    pub fn is_pooled(&self) -> bool {
        self.retire.is_some()
    }

    /// Approximate memory held by the chunk's columns
    #[must_use]
    pub fn memory_usage(&self) -> usize {
        let owned = self
            .parts
            .slots
            .iter()
            .filter_map(|slot| match slot {
                Slot::Owned(column) => Some(column.memory_usage()),
                Slot::Ref(_) => None,
            })
            .sum::<usize>();
        let detached = self
            .parts
            .detached
            .iter()
            .map(Column::memory_usage)
            .sum::<usize>();
        core::mem::size_of::<Self>() + owned + detached
    }
}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk")
            .field("fields", &self.parts.fields)
            .field("num_rows", &self.num_rows())
            .field("capacity", &self.capacity)
            .field("required_rows", &self.required_rows)
            .field("pooled", &self.is_pooled())
            .finish()
    }
}

impl Drop for Chunk {
    fn drop(&mut self) {
        if let Some(queue) = self.retire.take().and_then(|weak| weak.upgrade()) {
            queue.retire(core::mem::take(&mut self.parts));
        }
    }
}
