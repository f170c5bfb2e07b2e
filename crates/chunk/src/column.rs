//! Column buffers
//!
//! A [`Column`] owns one attribute's values for a batch of rows: a data
//! buffer, an offsets array for variable-width values and a validity bitmap.
//! Columns are what the pool actually recycles, so everything here keeps
//! buffer capacity across [`Column::reset`].

use bytes::Bytes;

use crate::error::{ChunkError, ChunkResult};
use crate::field_type::{ElemWidth, FieldType};

/// Floor for the oversize guard, per buffer, so small columns may still grow.
pub const MIN_RETAINED_BYTES: usize = 16 * 1024;

const OFFSET_BYTES: usize = core::mem::size_of::<i64>();

/// Data buffer of a column: either owned or a zero-copy view over memory
/// owned by someone else (for example a network frame).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct ColumnData {
    owned: Vec<u8>,
    external: Option<Bytes>,
}

impl ColumnData {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            owned: Vec::with_capacity(capacity),
            external: None,
        }
    }

    fn as_slice(&self) -> &[u8] {
        self.external.as_deref().unwrap_or(&self.owned)
    }

    fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// Capacity of the buffer this column pins in memory
    fn capacity(&self) -> usize {
        self.external.as_ref().map_or(self.owned.capacity(), Bytes::len)
    }

    fn is_external(&self) -> bool {
        self.external.is_some()
    }

    /// Owned buffer for writing; an external view is copied first.
    fn to_mut(&mut self) -> &mut Vec<u8> {
        if let Some(shared) = self.external.take() {
            self.owned.clear();
            self.owned.extend_from_slice(&shared);
        }
        &mut self.owned
    }

    fn attach(&mut self, shared: Bytes) {
        self.owned.clear();
        self.external = Some(shared);
    }

    fn clear(&mut self) {
        self.external = None;
        self.owned.clear();
    }
}

/// Single attribute buffer across a batch of rows
///
/// # Example
/// ```
/// use nebula_chunk::{Column, FieldType};
///
/// let mut col = Column::new(FieldType::LongLong, 4);
/// col.append_i64(7)?;
/// col.append_null();
///
/// assert_eq!(col.len(), 2);
/// assert_eq!(col.get_i64(0), Some(7));
/// assert!(col.is_null(1));
/// # Ok::<(), nebula_chunk::ChunkError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    width: ElemWidth,
    length: usize,
    null_count: usize,
    /// Bit `i` set means row `i` holds a value.
    null_bitmap: Vec<u8>,
    /// Row boundaries into `data`; empty for fixed-width columns.
    offsets: Vec<i64>,
    data: ColumnData,
    /// Rows requested when the column was last built or acquired.
    nominal_rows: usize,
    avoid_reusing: bool,
}

impl Column {
    /// Create a column for `ft` sized to hold `capacity` rows
    #[must_use]
    pub fn new(ft: FieldType, capacity: usize) -> Self {
        Self::with_width(ft.elem_width(), capacity)
    }

    /// Create a column with an explicit element width
    #[must_use]
    pub fn with_width(width: ElemWidth, capacity: usize) -> Self {
        let offsets = if width.is_variable() {
            let mut offsets = Vec::with_capacity(capacity.saturating_add(1));
            offsets.push(0);
            offsets
        } else {
            Vec::new()
        };

        Self {
            width,
            length: 0,
            null_count: 0,
            null_bitmap: Vec::with_capacity(capacity.div_ceil(8)),
            offsets,
            data: ColumnData::with_capacity(width.data_bytes(capacity)),
            nominal_rows: capacity,
            avoid_reusing: false,
        }
    }

    #[must_use]
    pub fn width(&self) -> ElemWidth {
        self.width
    }

    /// Number of rows
    #[must_use]
    pub fn len(&self) -> usize {
        self.length
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    #[must_use]
    pub fn null_count(&self) -> usize {
        self.null_count
    }

    /// Raw data bytes of all rows
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.data.as_slice()
    }

    /// Bytes of memory the data buffer currently pins
    #[must_use]
    pub fn data_capacity(&self) -> usize {
        self.data.capacity()
    }

    /// Rows the column was last sized for
    #[must_use]
    pub fn nominal_rows(&self) -> usize {
        self.nominal_rows
    }

    /// Whether the data buffer is a view over memory this column does not own
    #[must_use]
    pub fn is_external(&self) -> bool {
        self.data.is_external()
    }

    /// Whether the column was flagged as unsafe to recycle
    #[must_use]
    pub fn avoid_reusing(&self) -> bool {
        self.avoid_reusing
    }

    /// Flag the column as unsafe to recycle. Idempotent.
    ///
    /// Needed whenever the column's memory is not exclusively owned, so the
    /// pool never hands shared memory to an unrelated caller.
    pub fn mark_unsafe(&mut self) {
        self.avoid_reusing = true;
    }

    /// Whether the pool may keep this column
    #[must_use]
    pub fn is_reusable(&self) -> bool {
        !self.avoid_reusing && !self.data.is_external()
    }

    /// Whether any buffer has grown far beyond what the column was sized for
    ///
    /// The allotment comes from the capacity requested when the column was
    /// last built or acquired. Data, offsets and the null bitmap are each
    /// held to `growth_factor` times their share of that allotment, with
    /// [`MIN_RETAINED_BYTES`] as the floor.
    #[must_use]
    pub fn is_oversized(&self, growth_factor: usize) -> bool {
        let factor = growth_factor.max(1);
        let exceeds = |held: usize, allotted: usize| {
            held > allotted
                .saturating_mul(factor)
                .max(MIN_RETAINED_BYTES)
        };

        let rows = self.nominal_rows;
        let offsets = if self.width.is_variable() {
            rows.saturating_add(1).saturating_mul(OFFSET_BYTES)
        } else {
            0
        };

        exceeds(self.data.capacity(), self.width.data_bytes(rows))
            || exceeds(self.offsets.capacity() * OFFSET_BYTES, offsets)
            || exceeds(self.null_bitmap.capacity(), rows.div_ceil(8))
    }

    /// Approximate heap plus inline memory used by this column
    #[must_use]
    pub fn memory_usage(&self) -> usize {
        core::mem::size_of::<Self>()
            + self.null_bitmap.capacity()
            + self.offsets.capacity() * OFFSET_BYTES
            + self.data.capacity()
    }

    /// Clear all rows and adopt the shape of `ft`, keeping buffer capacity
    ///
    /// A pooled column may be handed to a different type of the same width
    /// (two temporal types, say), so the width is taken from `ft`.
    pub fn reset(&mut self, ft: FieldType) {
        self.width = ft.elem_width();
        self.length = 0;
        self.null_count = 0;
        self.null_bitmap.clear();
        self.offsets.clear();
        if self.width.is_variable() {
            self.offsets.push(0);
        }
        self.data.clear();
    }

    /// Make sure the buffers can hold `rows` rows without reallocating
    ///
    /// `rows` also becomes the allotment the oversize guard measures
    /// against, replacing whatever the column was sized for before.
    pub fn reserve_rows(&mut self, rows: usize) {
        self.nominal_rows = rows;

        let bytes = self.width.data_bytes(rows);
        let data = self.data.to_mut();
        data.reserve(bytes.saturating_sub(data.len()));

        let bitmap = rows.div_ceil(8);
        self.null_bitmap
            .reserve(bitmap.saturating_sub(self.null_bitmap.len()));

        if self.width.is_variable() {
            let offsets = rows.saturating_add(1);
            self.offsets
                .reserve(offsets.saturating_sub(self.offsets.len()));
        }
    }

    fn push_validity(&mut self, valid: bool) {
        let idx = self.length >> 3;
        let mask = 1u8 << (self.length & 7);
        if idx >= self.null_bitmap.len() {
            self.null_bitmap.push(0);
        }
        if valid {
            self.null_bitmap[idx] |= mask;
        } else {
            self.null_bitmap[idx] &= !mask;
            self.null_count += 1;
        }
    }

    /// Append a null row
    pub fn append_null(&mut self) {
        self.push_validity(false);
        match self.width {
            ElemWidth::Fixed(n) => {
                let data = self.data.to_mut();
                data.resize(data.len() + n, 0);
            }
            ElemWidth::Variable => {
                let end = self.offsets.last().copied().unwrap_or(0);
                self.offsets.push(end);
            }
        }
        self.length += 1;
    }

    /// Append one fixed-width value given as its raw bytes
    pub fn append_fixed(&mut self, value: &[u8]) -> ChunkResult<()> {
        match self.width {
            ElemWidth::Fixed(n) if n == value.len() => {}
            expected => {
                return Err(ChunkError::width_mismatch(
                    expected,
                    ElemWidth::Fixed(value.len()),
                ));
            }
        }
        self.push_validity(true);
        self.data.to_mut().extend_from_slice(value);
        self.length += 1;
        Ok(())
    }

    pub fn append_i64(&mut self, value: i64) -> ChunkResult<()> {
        self.append_fixed(&value.to_le_bytes())
    }

    pub fn append_u64(&mut self, value: u64) -> ChunkResult<()> {
        self.append_fixed(&value.to_le_bytes())
    }

    pub fn append_f64(&mut self, value: f64) -> ChunkResult<()> {
        self.append_fixed(&value.to_le_bytes())
    }

    pub fn append_f32(&mut self, value: f32) -> ChunkResult<()> {
        self.append_fixed(&value.to_le_bytes())
    }

    /// Append one variable-width value
    pub fn append_bytes(&mut self, value: &[u8]) -> ChunkResult<()> {
        if let ElemWidth::Fixed(_) = self.width {
            return Err(ChunkError::width_mismatch(self.width, ElemWidth::Variable));
        }
        let end = i64::try_from(self.data.len() + value.len())
            .map_err(|_| ChunkError::malformed_buffer("offset overflows i64"))?;

        self.push_validity(true);
        self.data.to_mut().extend_from_slice(value);
        self.offsets.push(end);
        self.length += 1;
        Ok(())
    }

    /// Whether `row` is null; rows past the end count as null
    #[must_use]
    pub fn is_null(&self, row: usize) -> bool {
        if row >= self.length {
            return true;
        }
        self.null_bitmap
            .get(row >> 3)
            .is_none_or(|&byte| byte & (1u8 << (row & 7)) == 0)
    }

    /// Raw bytes of a non-null row
    #[must_use]
    pub fn get_raw(&self, row: usize) -> Option<&[u8]> {
        if self.is_null(row) {
            return None;
        }
        let data = self.data.as_slice();
        match self.width {
            ElemWidth::Fixed(n) => data.get(row * n..(row + 1) * n),
            ElemWidth::Variable => {
                let start = usize::try_from(*self.offsets.get(row)?).ok()?;
                let end = usize::try_from(*self.offsets.get(row + 1)?).ok()?;
                data.get(start..end)
            }
        }
    }

    #[must_use]
    pub fn get_i64(&self, row: usize) -> Option<i64> {
        self.get_raw(row)?.try_into().ok().map(i64::from_le_bytes)
    }

    #[must_use]
    pub fn get_u64(&self, row: usize) -> Option<u64> {
        self.get_raw(row)?.try_into().ok().map(u64::from_le_bytes)
    }

    #[must_use]
    pub fn get_f64(&self, row: usize) -> Option<f64> {
        self.get_raw(row)?.try_into().ok().map(f64::from_le_bytes)
    }

    #[must_use]
    pub fn get_f32(&self, row: usize) -> Option<f32> {
        self.get_raw(row)?.try_into().ok().map(f32::from_le_bytes)
    }

    /// Point this column at `rows` non-null values held in a shared buffer
    ///
    /// Decoders use this to materialize a column from a wire frame without
    /// copying. The column no longer owns its data and is marked unsafe.
    /// `offsets` must be empty for fixed-width columns and hold `rows + 1`
    /// ascending boundaries starting at zero for variable-width ones.
    pub fn attach_external(
        &mut self,
        rows: usize,
        offsets: Vec<i64>,
        data: Bytes,
    ) -> ChunkResult<()> {
        match self.width {
            ElemWidth::Fixed(n) => {
                if !offsets.is_empty() {
                    return Err(ChunkError::malformed_buffer(
                        "fixed-width columns carry no offsets",
                    ));
                }
                let expected = rows.saturating_mul(n);
                if data.len() != expected {
                    return Err(ChunkError::malformed_buffer(format!(
                        "expected {expected} data bytes for {rows} rows, got {}",
                        data.len()
                    )));
                }
            }
            ElemWidth::Variable => {
                let ends_at_data = offsets
                    .last()
                    .is_some_and(|&end| usize::try_from(end).ok() == Some(data.len()));
                if offsets.len() != rows.saturating_add(1)
                    || offsets.first() != Some(&0)
                    || !ends_at_data
                    || offsets.windows(2).any(|w| w[0] > w[1])
                {
                    return Err(ChunkError::malformed_buffer(format!(
                        "offsets do not describe {rows} rows over {} bytes",
                        data.len()
                    )));
                }
            }
        }

        self.length = rows;
        self.null_count = 0;
        self.null_bitmap.clear();
        self.null_bitmap.resize(rows.div_ceil(8), 0xFF);
        if self.width.is_variable() {
            self.offsets = offsets;
        }
        self.data.attach(data);
        self.mark_unsafe();
        Ok(())
    }
}
