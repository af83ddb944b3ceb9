// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// MemoryPool behavior: bump-then-free-list slot handout, LIFO recycling,
// fixed-capacity exhaustion, compacting releases, and growth out of the
// backing arena.

use std::ptr::NonNull;

use libvmem::{megabytes, ArenaFlags, MemoryArena, MemoryInfo, MemoryPool, PoolFlags};

fn test_info() -> MemoryInfo {
    let mut info = MemoryInfo::query().expect("memory info");
    info.total_memory = megabytes(64);
    info
}

#[test]
fn retrieve_hands_out_contiguous_slots() {
    let info = test_info();
    let mut arena = MemoryArena::new(info, ArenaFlags::NORMAL).expect("arena");
    let mut pool = MemoryPool::new(&mut arena, 16, PoolFlags::NORMAL);

    let first = pool.retrieve().expect("retrieve").as_ptr();
    for i in 1..10 {
        let p = pool.retrieve().expect("retrieve").as_ptr();
        assert_eq!(p as usize, first as usize + i * 16);
    }
    assert_eq!(pool.count(), 10);
}

#[test]
fn released_evens_come_back_in_reverse_order() {
    let info = test_info();
    let mut pool = MemoryPool::bootstrap(info, 8, PoolFlags::NORMAL).expect("bootstrap");

    let mut slots = Vec::with_capacity(100);
    for _ in 0..100 {
        slots.push(pool.retrieve().expect("retrieve"));
    }

    for i in 0..50 {
        unsafe { pool.release(slots[i * 2]) };
    }
    assert_eq!(pool.count(), 50);

    // The free list is LIFO: 98, 96, ..., 2, 0.
    for i in 0..50 {
        let expected = slots[(49 - i) * 2];
        let got = pool.retrieve().expect("retrieve");
        assert_eq!(got, expected);
    }
    assert_eq!(pool.count(), 100);
}

#[test]
fn retrieve_release_retrieve_round_trip() {
    let info = test_info();
    let mut pool = MemoryPool::bootstrap(info, 32, PoolFlags::NORMAL).expect("bootstrap");

    let _keep = pool.retrieve().expect("retrieve");
    let q = pool.retrieve().expect("retrieve");
    unsafe { pool.release(q) };
    assert_eq!(pool.retrieve().expect("retrieve"), q);
}

#[test]
fn recycled_slots_are_zeroed() {
    let info = test_info();
    let mut pool = MemoryPool::bootstrap(info, 32, PoolFlags::NORMAL).expect("bootstrap");

    let p = pool.retrieve().expect("retrieve");
    unsafe {
        for i in 0..32 {
            p.as_ptr().add(i).write(0xBE);
        }
        pool.release(p);
    }
    let q = pool.retrieve().expect("retrieve");
    assert_eq!(q, p);
    unsafe {
        for i in 0..32 {
            assert_eq!(q.as_ptr().add(i).read(), 0);
        }
    }
}

#[test]
fn no_zero_flag_preserves_slot_tail() {
    let info = test_info();
    let mut pool =
        MemoryPool::bootstrap(info, 16, PoolFlags::NO_ZERO_MEMORY).expect("bootstrap");

    let p = pool.retrieve().expect("retrieve").cast::<u64>();
    unsafe {
        p.as_ptr().write(0x1111_1111_1111_1111);
        p.as_ptr().add(1).write(0x2222_2222_2222_2222);
        pool.release(p.cast());
    }
    let q = pool.retrieve().expect("retrieve").cast::<u64>();
    assert_eq!(q, p);
    // The first word was overwritten by the free-list link; the second
    // word survives untouched.
    assert_eq!(unsafe { q.as_ptr().add(1).read() }, 0x2222_2222_2222_2222);
}

#[test]
fn fixed_pool_exhaustion_and_recovery() {
    let mut buffer = vec![0u64; 128]; // 1024 bytes
    let mut arena = unsafe {
        MemoryArena::fixed(buffer.as_mut_ptr() as *mut u8, 1024, ArenaFlags::NORMAL)
    };
    let mut pool = MemoryPool::new(&mut arena, 16, PoolFlags::FIXED_SIZE);
    assert_eq!(pool.capacity(), 64);

    let mut slots = Vec::new();
    for _ in 0..64 {
        slots.push(pool.retrieve().expect("retrieve"));
    }
    assert!(pool.retrieve().is_none());
    assert_eq!(pool.count(), 64);

    unsafe { pool.release(slots[10]) };
    assert_eq!(pool.retrieve().expect("retrieve"), slots[10]);
}

#[test]
fn pool_grows_by_committing_more_arena() {
    let info = test_info();
    let mut arena = MemoryArena::new(info, ArenaFlags::NORMAL).expect("arena");
    let mut pool = MemoryPool::new(&mut arena, 64, PoolFlags::NORMAL);

    let initial_capacity = pool.capacity();
    for _ in 0..initial_capacity {
        pool.retrieve().expect("retrieve");
    }
    // The next retrieval crosses the carved space and grows the arena by
    // one commit chunk.
    pool.retrieve().expect("retrieve after growth");
    assert!(pool.capacity() > initial_capacity);
    assert_eq!(pool.count(), initial_capacity + 1);
}

#[test]
fn double_release_is_rejected_and_state_unchanged() {
    let info = test_info();
    let mut pool = MemoryPool::bootstrap(info, 8, PoolFlags::NORMAL).expect("bootstrap");

    let a = pool.retrieve().expect("retrieve");
    let b = pool.retrieve().expect("retrieve");
    unsafe {
        pool.release(a);
        pool.release(a); // caught by the free-list scan
    }
    assert_eq!(pool.count(), 1);

    // The free list still holds exactly one entry.
    assert_eq!(pool.retrieve().expect("retrieve"), a);
    assert_eq!(pool.retrieve().expect("retrieve").as_ptr() as usize,
               b.as_ptr() as usize + 8);
}

#[test]
fn compacting_release_moves_last_slot_down() {
    let info = test_info();
    let mut pool =
        MemoryPool::bootstrap(info, 16, PoolFlags::COMPACTING).expect("bootstrap");

    let mut slots: Vec<NonNull<u8>> = Vec::new();
    for i in 0..4u64 {
        let p = pool.retrieve().expect("retrieve");
        unsafe { (p.as_ptr() as *mut u64).write(i) };
        slots.push(p);
    }

    // Releasing slot 1 copies slot 3 (the last live one) into it.
    unsafe { pool.release(slots[1]) };
    assert_eq!(pool.count(), 3);
    assert_eq!(unsafe { (slots[1].as_ptr() as *const u64).read() }, 3);

    // Dense iteration by index sees {0, 3, 2}.
    let base = pool.slots() as *const u64;
    let live: Vec<u64> = (0..pool.count())
        .map(|i| unsafe { base.add(i * 2).read() })
        .collect();
    assert_eq!(live, vec![0, 3, 2]);
}

#[test]
fn bootstrapped_fixed_pool_in_caller_buffer() {
    let mut buffer = vec![0u64; 512]; // 4096 bytes
    let mut pool = unsafe {
        MemoryPool::bootstrap_fixed(32, buffer.as_mut_ptr() as *mut u8, 4096, PoolFlags::NORMAL)
    }
    .expect("bootstrap_fixed");

    // Control blocks eat part of the buffer; the rest becomes slots.
    assert!(pool.capacity() > 0);
    assert!(pool.capacity() < 4096 / 32);

    let mut taken = 0;
    while pool.retrieve().is_some() {
        taken += 1;
    }
    assert_eq!(taken, pool.capacity());
}
