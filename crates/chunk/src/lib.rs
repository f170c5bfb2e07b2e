//! # nebula-chunk
//!
//! Memory reuse for columnar row batches.
//!
//! Query operators produce and consume [`Chunk`]s: fixed-schema batches
//! with one [`Column`] per field. Building those buffers for every batch
//! dominates allocation in a busy executor, so this crate recycles them:
//! - [`Allocator`] hands out chunks and takes them back when they are dropped
//! - [`ChunkAllocator::reset`] moves returned columns onto per-width free
//!   lists and returned shells onto a bounded chunk free list
//! - columns that view shared memory or grew far past their nominal size
//!   are never cached
//!
//! ## Quick Start
//!
//! ```rust
//! use nebula_chunk::prelude::*;
//!
//! let alloc = Allocator::with_limits(ReuseLimits::new(8, 32));
//! let fields = [FieldType::LongLong, FieldType::Varchar];
//!
//! let mut chk = alloc.alloc(&fields, 32, 1024);
//! chk.column_mut(0).unwrap().append_i64(1)?;
//! chk.column_mut(1).unwrap().append_bytes(b"one")?;
//! drop(chk);
//!
//! // Dropped chunks are recycled on reset.
//! alloc.reset();
//! let chk = alloc.alloc(&fields, 32, 1024);
//! assert_eq!(chk.num_rows(), 0);
//! # Ok::<(), ChunkError>(())
//! ```
//!
//! ## Features
//!
//! - `logging` (default): structured logging through `tracing`
//! - `serde` (default): (de)serialization of [`ReuseLimits`] and field types

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod alloc;
pub mod chunk;
pub mod column;
pub mod config;
pub mod error;
pub mod field_type;

pub use crate::alloc::{
    Allocator, AllocatorStats, ChunkAllocator, ColumnAllocStats, ColumnAllocator,
    DefaultAllocator, DefaultColumnAllocator, PoolColumnAllocator, ReleaseOutcome,
    ResetSummary, ReuseHookAllocator, SyncAllocator,
};
pub use chunk::Chunk;
pub use column::Column;
pub use config::{ReuseLimits, global_limits, init_chunk_alloc_size};
pub use error::{ChunkError, ChunkResult};
pub use field_type::{ElemWidth, FieldType};

pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::alloc::{Allocator, ChunkAllocator, DefaultAllocator, SyncAllocator};
    pub use crate::chunk::Chunk;
    pub use crate::column::Column;
    pub use crate::config::ReuseLimits;
    pub use crate::error::{ChunkError, ChunkResult};
    pub use crate::field_type::{ElemWidth, FieldType};
}
