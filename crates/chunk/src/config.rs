//! Reuse limits for chunk allocators
//!
//! Every allocator works from a [`ReuseLimits`] value it copies at
//! construction. The process-wide defaults below are only read when an
//! allocator is built without explicit limits, so changing them never
//! affects an allocator that already exists.

use core::sync::atomic::{AtomicUsize, Ordering};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "logging")]
use tracing::{debug, warn};

use crate::error::{ChunkError, ChunkResult};

/// Default cap on cached chunk shells per allocator
pub const DEFAULT_MAX_FREE_CHUNKS: usize = 64;

/// Default cap on cached columns per element width
pub const DEFAULT_MAX_FREE_COLUMNS_PER_TYPE: usize = 256;

/// Default ratio between a column's buffer and its nominal size beyond
/// which the column is not cached
pub const DEFAULT_COLUMN_GROWTH_FACTOR: usize = 2;

/// Environment variable overriding the free chunk cap
pub const ENV_MAX_FREE_CHUNKS: &str = "NEBULA_CHUNK_MAX_FREE_CHUNKS";

/// Environment variable overriding the per-width free column cap
pub const ENV_MAX_FREE_COLUMNS: &str = "NEBULA_CHUNK_MAX_FREE_COLUMNS";

static MAX_FREE_CHUNKS: AtomicUsize = AtomicUsize::new(DEFAULT_MAX_FREE_CHUNKS);
static MAX_FREE_COLUMNS_PER_TYPE: AtomicUsize =
    AtomicUsize::new(DEFAULT_MAX_FREE_COLUMNS_PER_TYPE);

/// Pool size ceilings for one allocator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ReuseLimits {
    /// Maximum chunk shells kept between resets; zero disables chunk caching
    pub max_free_chunks: usize,

    /// Maximum columns kept per element width; zero disables column caching
    pub max_free_columns_per_type: usize,

    /// Columns whose buffer outgrew their nominal size by more than this
    /// factor are dropped instead of cached
    pub column_growth_factor: usize,
}

impl Default for ReuseLimits {
    fn default() -> Self {
        Self {
            max_free_chunks: DEFAULT_MAX_FREE_CHUNKS,
            max_free_columns_per_type: DEFAULT_MAX_FREE_COLUMNS_PER_TYPE,
            column_growth_factor: DEFAULT_COLUMN_GROWTH_FACTOR,
        }
    }
}

impl ReuseLimits {
    /// Limits with the given caps and the default growth factor
    #[must_use]
    pub fn new(max_free_chunks: usize, max_free_columns_per_type: usize) -> Self {
        Self {
            max_free_chunks,
            max_free_columns_per_type,
            ..Self::default()
        }
    }

    /// Limits that turn pooling off entirely
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(0, 0)
    }

    /// Build limits from signed values, treating negatives as zero
    #[must_use]
    pub fn from_signed(max_free_chunks: i64, max_free_columns_per_type: i64) -> Self {
        Self::new(
            normalize("max_free_chunks", max_free_chunks),
            normalize("max_free_columns_per_type", max_free_columns_per_type),
        )
    }

    /// Read limits from the environment
    ///
    /// Unset variables keep the built-in defaults. Negative values disable
    /// the tier; anything unparsable falls back to the default with a warning.
    #[must_use]
    pub fn from_env() -> Self {
        let mut limits = Self::default();
        if let Ok(raw) = std::env::var(ENV_MAX_FREE_CHUNKS) {
            limits.max_free_chunks =
                parse_lenient("max_free_chunks", &raw, DEFAULT_MAX_FREE_CHUNKS);
        }
        if let Ok(raw) = std::env::var(ENV_MAX_FREE_COLUMNS) {
            limits.max_free_columns_per_type = parse_lenient(
                "max_free_columns_per_type",
                &raw,
                DEFAULT_MAX_FREE_COLUMNS_PER_TYPE,
            );
        }
        limits
    }

    /// Set the growth factor for the oversize guard
    #[must_use = "builder methods must be chained or built"]
    pub fn with_column_growth_factor(mut self, factor: usize) -> Self {
        self.column_growth_factor = factor.max(1);
        self
    }

    /// Whether both tiers are enabled, making pooling worth its bookkeeping
    #[must_use]
    pub fn is_reuse_enabled(&self) -> bool {
        self.max_free_chunks > 0 && self.max_free_columns_per_type > 0
    }
}

/// Parse a limit strictly; negative or non-numeric input is an error
pub fn parse_limit(name: &'static str, raw: &str) -> ChunkResult<usize> {
    raw.trim()
        .parse::<usize>()
        .map_err(|_| ChunkError::invalid_limit(name, raw))
}

fn parse_lenient(name: &'static str, raw: &str, default: usize) -> usize {
    match raw.trim().parse::<i64>() {
        Ok(value) => normalize(name, value),
        Err(_) => {
            #[cfg(feature = "logging")]
            warn!(limit = name, raw, default, "unparsable reuse limit, using default");
            default
        }
    }
}

fn normalize(name: &'static str, value: i64) -> usize {
    match usize::try_from(value) {
        Ok(value) => value,
        Err(_) => {
            #[cfg(feature = "logging")]
            warn!(limit = name, value, "negative reuse limit, pooling disabled for this tier");
            #[cfg(not(feature = "logging"))]
            let _ = name;
            0
        }
    }
}

/// Set the process-wide default limits used by [`crate::Allocator::new`]
///
/// Only allocators created afterwards pick the new values up.
pub fn init_chunk_alloc_size(max_free_chunks: usize, max_free_columns_per_type: usize) {
    MAX_FREE_CHUNKS.store(max_free_chunks, Ordering::Release);
    MAX_FREE_COLUMNS_PER_TYPE.store(max_free_columns_per_type, Ordering::Release);

    #[cfg(feature = "logging")]
    debug!(
        max_free_chunks,
        max_free_columns_per_type, "chunk reuse limits updated"
    );
}

/// Snapshot of the process-wide default limits
#[must_use]
pub fn global_limits() -> ReuseLimits {
    ReuseLimits::new(
        MAX_FREE_CHUNKS.load(Ordering::Acquire),
        MAX_FREE_COLUMNS_PER_TYPE.load(Ordering::Acquire),
    )
}
