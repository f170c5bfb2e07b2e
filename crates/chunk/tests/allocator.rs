//! Integration tests for chunk and column reuse.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use nebula_chunk::config::{DEFAULT_MAX_FREE_CHUNKS, DEFAULT_MAX_FREE_COLUMNS_PER_TYPE};
use nebula_chunk::{
    Allocator, Chunk, ChunkAllocator, ElemWidth, FieldType, PoolColumnAllocator, ReuseHookAllocator,
    ReuseLimits, init_chunk_alloc_size,
};
use pretty_assertions::assert_eq;
use rstest::rstest;

fn all_fields() -> Vec<FieldType> {
    vec![
        FieldType::Varchar,
        FieldType::Json,
        FieldType::Float,
        FieldType::NewDecimal,
        FieldType::Double,
        FieldType::LongLong,
        FieldType::Timestamp,
        FieldType::Datetime,
    ]
}

fn default_allocator() -> Allocator {
    Allocator::with_limits(ReuseLimits::default())
}

fn assert_shape(chk: &Chunk, fields: &[FieldType], capacity: usize) {
    assert_eq!(chk.num_columns(), fields.len());
    assert_eq!(chk.num_rows(), 0);
    for (index, &ft) in fields.iter().enumerate() {
        let column = chk.column(index).unwrap();
        assert_eq!(column.width(), ft.elem_width());
        assert!(column.is_empty());
        assert!(column.data_capacity() >= ft.elem_width().data_bytes(capacity));
    }
}

/// Every pooled column must own a distinct buffer.
fn assert_no_shared_buffers(alloc: &Allocator) {
    alloc.with_column_pool(|pool| {
        let mut seen = HashSet::new();
        for (width, _) in pool.free_counts() {
            for column in pool.free_list(width) {
                if column.data_capacity() > 0 {
                    assert!(
                        seen.insert(column.data().as_ptr()),
                        "column buffer pooled twice"
                    );
                }
            }
        }
    });
}

#[test]
fn test_alloc_reset_alloc() {
    let alloc = default_allocator();
    let fields = all_fields();

    let chk = alloc.alloc(&fields, 5, 100);
    assert_shape(&chk, &fields, 5);
    drop(chk);

    alloc.reset();
    let chk = alloc.alloc(&fields, 5, 100);
    assert_shape(&chk, &fields, 5);
    drop(chk);

    for _ in 0..DEFAULT_MAX_FREE_CHUNKS + 10 {
        alloc.alloc(&fields, 5, 100);
    }
    alloc.reset();
    assert_eq!(alloc.free_chunks(), DEFAULT_MAX_FREE_CHUNKS);
}

#[test]
fn test_reused_chunk_is_clean() {
    let alloc = default_allocator();
    let fields = [FieldType::LongLong, FieldType::Varchar];

    let mut chk = alloc.alloc(&fields, 4, 16);
    chk.column_mut(0).unwrap().append_i64(7).unwrap();
    chk.column_mut(1).unwrap().append_bytes(b"stale").unwrap();
    chk.column_mut(1).unwrap().append_null();
    drop(chk);
    alloc.reset();

    let chk = alloc.alloc(&fields, 4, 16);
    assert_shape(&chk, &fields, 4);
    assert_eq!(chk.column(1).unwrap().null_count(), 0);
    assert!(chk.column(1).unwrap().data().is_empty());
}

#[test]
fn test_no_duplicate_column_reuse() {
    let alloc = default_allocator();
    let fields = all_fields();

    for _ in 0..DEFAULT_MAX_FREE_CHUNKS + 10 {
        let mut chk = alloc.alloc(&fields, 5, 10);
        chk.make_column_reference(1, 3).unwrap();
    }
    let summary = alloc.reset_and_report();

    assert_no_shared_buffers(&alloc);
    assert_eq!(summary.chunks(), DEFAULT_MAX_FREE_CHUNKS + 10);
    // Replaced columns are recycled as well.
    assert_eq!(summary.columns_pooled + summary.columns_full, summary.chunks() * fields.len());
}

#[test]
fn test_chained_references_pool_each_buffer_once() {
    let alloc = default_allocator();
    let fields = all_fields();

    for _ in 0..8 {
        let mut chk = alloc.alloc(&fields, 5, 10);
        chk.make_column_reference(1, 3).unwrap();
        chk.make_column_reference(0, 1).unwrap();
        chk.make_column_reference(3, 4).unwrap();
        assert!(chk.same_storage(0, 1));
    }
    alloc.reset();
    assert_no_shared_buffers(&alloc);
}

#[test]
fn test_unsafe_columns_not_reused() {
    let alloc = default_allocator();
    let fields = all_fields();

    for _ in 0..DEFAULT_MAX_FREE_CHUNKS + 10 {
        let mut chk = alloc.alloc(&fields, 5, 10);
        for index in 0..chk.num_columns() {
            chk.column_mut(index).unwrap().mark_unsafe();
        }
    }
    let summary = alloc.reset_and_report();

    assert_eq!(summary.columns_pooled, 0);
    assert_eq!(summary.columns_unsafe, (DEFAULT_MAX_FREE_CHUNKS + 10) * fields.len());
    assert!(alloc.stats().free_columns.values().all(|&n| n == 0));
}

#[test]
fn test_externally_backed_columns_not_reused() {
    let alloc = default_allocator();
    let fields = [FieldType::Varchar, FieldType::LongLong];

    let mut chk = alloc.alloc(&fields, 5, 1024);
    chk.column_mut(0)
        .unwrap()
        .attach_external(2, vec![0, 2, 5], Bytes::from_static(b"abcde"))
        .unwrap();
    let frame = Bytes::from([1i64.to_le_bytes(), 2i64.to_le_bytes()].concat());
    chk.column_mut(1)
        .unwrap()
        .attach_external(2, Vec::new(), frame)
        .unwrap();

    assert!(chk.columns().all(|column| column.avoid_reusing()));
    assert_eq!(chk.num_rows(), 2);
    drop(chk);

    let summary = alloc.reset_and_report();
    assert_eq!(summary.columns_unsafe, 2);
    assert_eq!(alloc.free_columns(ElemWidth::Variable), 0);
    assert_eq!(alloc.free_columns(ElemWidth::Fixed(8)), 0);
}

#[test]
fn test_oversized_column_dropped() {
    let alloc = default_allocator();
    let mut chk = alloc.alloc(&[FieldType::Varchar], 1024, 1024);
    chk.column_mut(0)
        .unwrap()
        .append_bytes(&vec![b'a'; 20_480])
        .unwrap();
    drop(chk);

    let summary = alloc.reset_and_report();
    assert_eq!(summary.columns_oversized, 1);
    assert_eq!(alloc.free_columns(ElemWidth::Variable), 0);
}

#[test]
fn test_small_request_on_large_max_is_guarded() {
    // The guard follows the requested capacity, not the max chunk size.
    let alloc = default_allocator();
    let mut chk = alloc.alloc(&[FieldType::Varchar], 5, 4096);
    chk.column_mut(0)
        .unwrap()
        .append_bytes(&vec![b'a'; 20_480])
        .unwrap();
    drop(chk);

    let summary = alloc.reset_and_report();
    assert_eq!(summary.columns_oversized, 1);
    assert_eq!(summary.columns_pooled, 0);
    assert_eq!(alloc.free_columns(ElemWidth::Variable), 0);
}

#[test]
fn test_guard_recomputed_on_each_acquire() {
    let alloc = default_allocator();
    drop(alloc.alloc(&[FieldType::Varchar], 5, 100_000));
    alloc.reset();
    assert_eq!(alloc.free_columns(ElemWidth::Variable), 1);

    // The same column comes back for a small request and then grows.
    let mut chk = alloc.alloc(&[FieldType::Varchar], 5, 10);
    assert_eq!(chk.column(0).unwrap().nominal_rows(), 5);
    chk.column_mut(0)
        .unwrap()
        .append_bytes(&vec![b'a'; 20_480])
        .unwrap();
    drop(chk);

    let summary = alloc.reset_and_report();
    assert_eq!(summary.columns_oversized, 1);
    assert_eq!(summary.columns_pooled, 0);
    assert_eq!(alloc.free_columns(ElemWidth::Variable), 0);
}

#[test]
fn test_empty_values_count_toward_guard() {
    let alloc = default_allocator();
    let mut chk = alloc.alloc(&[FieldType::Varchar], 5, 100_000);
    let column = chk.column_mut(0).unwrap();
    for _ in 0..100_000 {
        column.append_bytes(b"").unwrap();
    }
    assert!(column.data_capacity() < 1024);
    drop(chk);

    let summary = alloc.reset_and_report();
    assert_eq!(summary.columns_oversized, 1);
    assert_eq!(alloc.free_columns(ElemWidth::Variable), 0);
}

#[test]
fn test_moderate_growth_kept() {
    // Sized for 5 rows, filled to 1024 while staying under the retained floor.
    let alloc = default_allocator();
    let mut chk = alloc.alloc(&[FieldType::LongLong], 5, 1024);
    for i in 0..1024 {
        chk.column_mut(0).unwrap().append_i64(i).unwrap();
    }
    drop(chk);

    let summary = alloc.reset_and_report();
    assert_eq!(summary.columns_pooled, 1);
    assert_eq!(alloc.free_columns(ElemWidth::Fixed(8)), 1);
}

#[test]
fn test_column_width_checked_on_release() {
    let mut pool = PoolColumnAllocator::new(&ReuseLimits::new(10, 20));
    let mut column = pool.acquire(FieldType::Float, 10);
    column.reset(FieldType::Datetime);
    pool.release(column);

    assert_eq!(pool.free_columns(ElemWidth::Fixed(4)), 0);
    assert_eq!(pool.free_columns(FieldType::Datetime.elem_width()), 1);
}

#[test]
fn test_chunk_columns_return_to_own_width() {
    let alloc = Allocator::with_limits(ReuseLimits::new(10, 20));
    let fields = [FieldType::Float, FieldType::Datetime];
    for _ in 0..4 {
        alloc.alloc(&fields, 5, 10);
    }
    alloc.reset();

    assert_eq!(alloc.free_columns(ElemWidth::Fixed(4)), 4);
    assert_eq!(alloc.free_columns(FieldType::Datetime.elem_width()), 4);
}

#[rstest]
#[case(10, 20)]
#[case(5, 10)]
#[case(50, 100)]
fn test_explicit_limits(#[case] max_chunks: usize, #[case] max_columns: usize) {
    let fields = [
        FieldType::Varchar,
        FieldType::Json,
        FieldType::Float,
        FieldType::NewDecimal,
        FieldType::Double,
        FieldType::LongLong,
        FieldType::Datetime,
    ];
    let alloc = Allocator::with_limits(ReuseLimits::new(max_chunks, max_columns));
    assert!(alloc.check_reuse_alloc_size());

    for _ in 0..DEFAULT_MAX_FREE_CHUNKS + 10 {
        alloc.alloc(&fields, 5, 10);
    }
    alloc.reset();

    // Every width saw at least as many releases as its count below.
    let released = DEFAULT_MAX_FREE_CHUNKS + 10;
    let stats = alloc.stats();
    assert_eq!(stats.free_chunks, max_chunks);
    assert_eq!(stats.free_columns[&ElemWidth::Variable], max_columns.min(2 * released));
    assert_eq!(stats.free_columns[&ElemWidth::Fixed(4)], max_columns.min(released));
    assert_eq!(stats.free_columns[&ElemWidth::Fixed(40)], max_columns.min(released));
    assert_eq!(stats.free_columns[&ElemWidth::Fixed(8)], max_columns.min(3 * released));
    let pooled: usize = stats.free_columns.values().sum();
    assert_eq!(stats.columns.discarded_full, (7 * released - pooled) as u64);
}

#[test]
fn test_reset_is_idempotent() {
    let alloc = default_allocator();
    for _ in 0..3 {
        alloc.alloc(&all_fields(), 5, 10);
    }
    alloc.reset();
    let before = alloc.stats();

    assert!(alloc.reset_and_report().is_empty());
    let after = alloc.stats();
    assert_eq!(before.free_chunks, after.free_chunks);
    assert_eq!(before.free_columns, after.free_columns);
    assert_eq!(after.resets, before.resets + 1);
}

#[test]
fn test_reuse_avoids_fresh_columns() {
    let alloc = default_allocator();
    let fields = all_fields();

    for _ in 0..2 {
        let batch: Vec<_> = (0..4).map(|_| alloc.alloc(&fields, 5, 100)).collect();
        drop(batch);
        alloc.reset();
    }

    let stats = alloc.stats().columns;
    assert_eq!(stats.created, 4 * fields.len() as u64);
    assert_eq!(stats.reused, 4 * fields.len() as u64);
    assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
}

#[test]
fn test_reuse_hook_allocator() {
    let calls = Arc::new(AtomicUsize::new(0));
    let hook = {
        let calls = Arc::clone(&calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
        }
    };

    let alloc = ReuseHookAllocator::new(Allocator::with_limits(ReuseLimits::disabled()), hook.clone());
    alloc.alloc(&all_fields(), 5, 100);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let alloc = ReuseHookAllocator::new(Allocator::with_limits(ReuseLimits::new(10, 20)), hook);
    alloc.alloc(&all_fields(), 5, 100);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    alloc.alloc(&all_fields(), 5, 100);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// The only test in this binary that touches the process-wide limits.
#[test]
fn test_global_limits_apply_to_new_allocators() {
    let fields = [FieldType::Float, FieldType::Varchar];

    init_chunk_alloc_size(10, 20);
    let first = Allocator::new();
    assert!(first.check_reuse_alloc_size());

    init_chunk_alloc_size(5, 10);
    let second = Allocator::new();
    // Existing allocators keep their snapshot.
    assert_eq!(first.limits().max_free_chunks, 10);
    assert_eq!(second.limits().max_free_chunks, 5);

    for alloc in [&first, &second] {
        for _ in 0..DEFAULT_MAX_FREE_CHUNKS + 10 {
            alloc.alloc(&fields, 5, 10);
        }
        alloc.reset();
    }
    assert_eq!(first.free_chunks(), 10);
    assert_eq!(second.free_chunks(), 5);
    assert_eq!(second.free_columns(ElemWidth::Variable), 10);

    init_chunk_alloc_size(0, 0);
    let disabled = Allocator::new();
    assert!(!disabled.check_reuse_alloc_size());
    disabled.alloc(&fields, 5, 10);
    disabled.reset();
    assert_eq!(disabled.free_chunks(), 0);
    assert_eq!(disabled.free_columns(ElemWidth::Fixed(4)), 0);

    init_chunk_alloc_size(DEFAULT_MAX_FREE_CHUNKS, DEFAULT_MAX_FREE_COLUMNS_PER_TYPE);
}
