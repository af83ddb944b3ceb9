// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Tagged heap walkthrough.
//
// Usage:
//   demo_tagged
//
// Three tags get a 64-word block each with a recognizable pattern, the
// middle tag is freed and re-allocated, and the raw slot memory is
// printed before and after so the per-tag zeroing is visible.

use libvmem::{HeapFlags, MemoryInfo, TaggedHeap};

const TAG_A: usize = 0;
const TAG_B: usize = 1;
const TAG_C: usize = 2;

fn main() {
    let info = MemoryInfo::query().expect("memory info");
    println!("libvmem: tagged heap demo");

    // Sub-arenas of 65 words; a real frame allocator would use a couple
    // of megabytes here.
    let word = std::mem::size_of::<usize>();
    let mut heap =
        TaggedHeap::bootstrap(info, 65 * word, HeapFlags::NORMAL).expect("bootstrap");

    let view = heap.pool().slots() as *const usize;

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

    // Raw view across the first slots: sub-arena headers followed by the
    // tagged payloads.
    unsafe {
        for i in 0..64 * 5 {
            print!("{} ", view.add(i).read());
        }
    }
    println!();
    println!();

    heap.free(TAG_B);

    // The pool zeroes a sub-arena as it is reused, so B comes back blank
    // while A and C are untouched.
    let b = heap.alloc_for::<usize>(TAG_B, 64).expect("realloc b");
    unsafe {
        for i in 0..64 {
            assert_eq!(b.as_ptr().add(i).read(), 0);
        }
        for i in 0..64 * 5 {
            print!("{} ", view.add(i).read());
        }
    }
    println!();
}
