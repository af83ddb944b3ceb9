// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// TaggedHeap behavior: per-tag isolation, bulk free with zero-on-reuse,
// sub-arena chaining, best-fit selection, and the size limits.

use libvmem::{megabytes, HeapFlags, MemoryInfo, TaggedHeap, MAX_TAGS};

const TAG_A: usize = 0;
const TAG_B: usize = 1;
const TAG_C: usize = 2;

fn test_info() -> MemoryInfo {
    let mut info = MemoryInfo::query().expect("memory info");
    info.total_memory = megabytes(64);
    info
}

#[test]
fn tags_are_isolated_and_free_zeroes_on_reuse() {
    let word = std::mem::size_of::<usize>();
    let mut heap =
        TaggedHeap::bootstrap(test_info(), 65 * word, HeapFlags::NORMAL).expect("bootstrap");

    let a = heap.alloc_for::<usize>(TAG_A, 64).expect("alloc a");
    let b = heap.alloc_for::<usize>(TAG_B, 64).expect("alloc b");
    let c = heap.alloc_for::<usize>(TAG_C, 64).expect("alloc c");

    unsafe {
        for i in 0..64 {
            a.as_ptr().add(i).write(i);
            b.as_ptr().add(i).write(64 - i);
            c.as_ptr().add(i).write(64 + i);
        }
    }

    heap.free(TAG_B);
    let b2 = heap.alloc_for::<usize>(TAG_B, 64).expect("realloc b");

    unsafe {
        // The reused sub-arena was zeroed by the pool on retrieve.
        for i in 0..64 {
            assert_eq!(b2.as_ptr().add(i).read(), 0);
        }
        // The other tags are untouched.
        for i in 0..64 {
            assert_eq!(a.as_ptr().add(i).read(), i);
            assert_eq!(c.as_ptr().add(i).read(), 64 + i);
        }
    }
}

#[test]
fn alloc_size_limits() {
    let mut heap = TaggedHeap::bootstrap(test_info(), 256, HeapFlags::NORMAL).expect("bootstrap");

    // A whole sub-arena is the largest legal allocation.
    assert!(heap.alloc(TAG_A, 256).is_some());
    assert!(heap.alloc(TAG_B, 257).is_none());
}

#[test]
fn tag_out_of_range_is_rejected() {
    let mut heap = TaggedHeap::bootstrap(test_info(), 256, HeapFlags::NORMAL).expect("bootstrap");

    assert!(heap.alloc(MAX_TAGS, 8).is_none());
    heap.free(MAX_TAGS); // reports, does not panic
}

#[test]
fn full_tag_chains_new_sub_arenas_and_free_reaps_them_all() {
    let mut heap = TaggedHeap::bootstrap(test_info(), 256, HeapFlags::NORMAL).expect("bootstrap");

    // Three allocations that cannot share a sub-arena.
    heap.alloc(TAG_A, 200).expect("alloc");
    heap.alloc(TAG_A, 200).expect("alloc");
    heap.alloc(TAG_A, 200).expect("alloc");
    assert_eq!(heap.pool().count(), 3);

    heap.free(TAG_A);
    assert_eq!(heap.pool().count(), 0);

    // The tag is empty again; allocating under it starts fresh.
    heap.alloc(TAG_A, 200).expect("alloc after free");
    assert_eq!(heap.pool().count(), 1);
}

#[test]
fn allocations_under_one_tag_stay_contiguous_until_full() {
    let mut heap = TaggedHeap::bootstrap(test_info(), 1024, HeapFlags::NORMAL).expect("bootstrap");

    let p1 = heap.alloc(TAG_A, 100).expect("alloc").as_ptr();
    let p2 = heap.alloc(TAG_A, 100).expect("alloc").as_ptr();
    let p3 = heap.alloc(TAG_A, 100).expect("alloc").as_ptr();
    // Heads are realigned to 8 after every allocation.
    assert_eq!(p2 as usize, p1 as usize + 104);
    assert_eq!(p3 as usize, p2 as usize + 104);
}

#[test]
fn best_fit_picks_the_tightest_sub_arena() {
    let mut heap = TaggedHeap::bootstrap(test_info(), 1000, HeapFlags::SEARCH_FOR_BEST_FIT)
        .expect("bootstrap");

    // Build a chain with remaining capacities: head 48, then 496, 200.
    let a1 = heap.alloc(TAG_A, 800).expect("alloc").as_ptr(); // t1: 200 left
    heap.alloc(TAG_A, 500).expect("alloc"); // t2: 496 left (500 rounds to 504)
    heap.alloc(TAG_A, 950).expect("alloc"); // t3: 48 left (952 used)

    // 100 bytes: the head (48 left) cannot fit it; of the chained
    // sub-arenas that can (496 and 200 left), the tightest wins.
    let p = heap.alloc(TAG_A, 100).expect("best fit").as_ptr();
    assert_eq!(p as usize, a1 as usize + 800);
}

#[test]
fn best_fit_still_grows_when_nothing_fits() {
    let mut heap = TaggedHeap::bootstrap(test_info(), 256, HeapFlags::SEARCH_FOR_BEST_FIT)
        .expect("bootstrap");

    heap.alloc(TAG_A, 200).expect("alloc");
    heap.alloc(TAG_A, 200).expect("alloc");
    assert_eq!(heap.pool().count(), 2);

    // Nothing on the chain has 250 free; a fresh sub-arena is linked in
    // at the head and stays reachable for the bulk free.
    heap.alloc(TAG_A, 250).expect("alloc");
    assert_eq!(heap.pool().count(), 3);
    heap.free(TAG_A);
    assert_eq!(heap.pool().count(), 0);
}

#[test]
fn fixed_heap_in_caller_buffer() {
    use libvmem::tagged_heap_size;

    let bytes = tagged_heap_size(128, 4, true) + 512;
    let mut buffer = vec![0u64; bytes.div_ceil(8)];
    let mut heap = unsafe {
        TaggedHeap::bootstrap_fixed(
            128,
            buffer.as_mut_ptr() as *mut u8,
            bytes,
            HeapFlags::NORMAL,
        )
    }
    .expect("bootstrap_fixed");

    let mut got = 0;
    while heap.alloc(TAG_A, 128).is_some() {
        got += 1;
    }
    assert!(
        (2..=8).contains(&got),
        "buffer sized for roughly four sub-arenas held {got}"
    );

    // Bulk free makes the space reusable.
    heap.free(TAG_A);
    heap.alloc(TAG_B, 128).expect("alloc after free");
}
