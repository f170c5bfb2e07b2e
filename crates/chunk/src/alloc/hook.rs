//! Allocator wrapper signalling the first pooled allocation

use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

#[cfg(feature = "logging")]
use tracing::debug;

use super::ChunkAllocator;
use crate::chunk::Chunk;
use crate::field_type::FieldType;

/// Runs a hook once, the first time an allocation goes through an
/// allocator whose limits make reuse worthwhile
///
/// Allocations made while reuse is disabled never fire the hook. Nothing
/// else changes: every call is forwarded to the wrapped allocator.
///
/// The hook is claimed before it runs and no allocator state is borrowed
/// while it does, so it may allocate through this wrapper or the inner
/// allocator without firing again.
pub struct ReuseHookAllocator<A> {
    inner: A,
    hook: Box<dyn Fn() + Send + Sync>,
    fired: AtomicBool,
}

impl<A: ChunkAllocator> ReuseHookAllocator<A> {
    pub fn new<F>(inner: A, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            inner,
            hook: Box::new(hook),
            fired: AtomicBool::new(false),
        }
    }

    /// Whether the hook has run
    #[must_use]
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn inner(&self) -> &A {
        &self.inner
    }

    pub fn into_inner(self) -> A {
        self.inner
    }
}

impl<A: ChunkAllocator> ChunkAllocator for ReuseHookAllocator<A> {
    fn alloc(&self, fields: &[FieldType], capacity: usize, max_chunk_size: usize) -> Chunk {
        if !self.has_fired()
            && self.inner.check_reuse_alloc_size()
            && !self.fired.swap(true, Ordering::AcqRel)
        {
            #[cfg(feature = "logging")]
            debug!("chunk reuse active, running reuse hook");
            (self.hook)();
        }
        self.inner.alloc(fields, capacity, max_chunk_size)
    }

    fn reset(&self) {
        self.inner.reset();
    }

    fn check_reuse_alloc_size(&self) -> bool {
        self.inner.check_reuse_alloc_size()
    }
}

impl<A: fmt::Debug> fmt::Debug for ReuseHookAllocator<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReuseHookAllocator")
            .field("inner", &self.inner)
            .field("fired", &self.fired.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}
