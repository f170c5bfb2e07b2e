//! Semantic field types and their element widths
//!
//! The allocator only needs one fact about a field type: how many bytes a
//! single value occupies, or that values vary in size. Everything else about
//! the type system lives outside this crate.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Bytes in a decimal value's fixed in-memory layout.
pub const DECIMAL_WIDTH: usize = 40;

/// Bytes in a packed date/datetime/timestamp value.
pub const TIME_WIDTH: usize = 8;

/// Estimated bytes per row reserved up front for variable-width columns.
pub const ESTIMATED_VAR_ELEM_LEN: usize = 8;

/// Semantic type of a chunk field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum FieldType {
    Tiny,
    Short,
    Int24,
    Long,
    LongLong,
    Year,
    Float,
    Double,
    NewDecimal,
    Duration,
    Date,
    Datetime,
    Timestamp,
    Bit,
    Enum,
    Set,
    Varchar,
    VarString,
    String,
    TinyBlob,
    Blob,
    MediumBlob,
    LongBlob,
    Json,
    Geometry,
    Null,
}

impl FieldType {
    /// Element width of this type
    #[must_use]
    pub const fn elem_width(self) -> ElemWidth {
        match self {
            Self::Float => ElemWidth::Fixed(4),
            Self::Tiny
            | Self::Short
            | Self::Int24
            | Self::Long
            | Self::LongLong
            | Self::Year
            | Self::Double
            | Self::Duration => ElemWidth::Fixed(8),
            Self::Date | Self::Datetime | Self::Timestamp => ElemWidth::Fixed(TIME_WIDTH),
            Self::NewDecimal => ElemWidth::Fixed(DECIMAL_WIDTH),
            _ => ElemWidth::Variable,
        }
    }

    /// Whether values of this type have a constant size
    #[must_use]
    pub const fn is_fixed_width(self) -> bool {
        matches!(self.elem_width(), ElemWidth::Fixed(_))
    }
}

/// Byte width of one column element
///
/// Fixed-width columns store every value in exactly `n` bytes. Variable
/// columns keep an offsets array and grow their data buffer on append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ElemWidth {
    /// Constant size in bytes
    Fixed(usize),
    /// Size varies per value
    Variable,
}

impl ElemWidth {
    /// Fixed size in bytes, `None` for variable-width
    #[must_use]
    pub const fn fixed(self) -> Option<usize> {
        match self {
            Self::Fixed(n) => Some(n),
            Self::Variable => None,
        }
    }

    #[must_use]
    pub const fn is_variable(self) -> bool {
        matches!(self, Self::Variable)
    }

    /// Bytes to reserve for `rows` elements of this width
    #[must_use]
    pub const fn data_bytes(self, rows: usize) -> usize {
        match self {
            Self::Fixed(n) => rows.saturating_mul(n),
            Self::Variable => rows.saturating_mul(ESTIMATED_VAR_ELEM_LEN),
        }
    }
}

impl fmt::Display for ElemWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(n) => write!(f, "{n} bytes"),
            Self::Variable => write!(f, "variable"),
        }
    }
}

impl From<FieldType> for ElemWidth {
    fn from(ft: FieldType) -> Self {
        ft.elem_width()
    }
}
