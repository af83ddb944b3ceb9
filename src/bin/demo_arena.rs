// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Arena walkthrough.
//
// Usage:
//   demo_arena
//
// Bootstraps an expanding arena (the arena stores its own control block
// in its first allocation), pushes a few blocks, writes a pattern across
// them, then clears the arena and shows that the same addresses read
// back as zero.

use libvmem::{kilobytes, ArenaFlags, MemoryArena, MemoryInfo};

fn main() {
    let info = MemoryInfo::query().expect("memory info");
    println!("libvmem: arena demo");
    println!("  physical memory: {} kb", info.total_memory / kilobytes(1));
    println!("  page size......: {} b", info.page_size);
    println!("  commit size....: {} kb", info.commit_size / kilobytes(1));
    println!();

    let mut arena = MemoryArena::bootstrap(info, ArenaFlags::NORMAL).expect("bootstrap");

    // Four contiguous blocks; together they hold at least 150 ints, so a
    // single sweep through the first pointer touches all of them.
    let numbers = arena.push_for::<i32>(10).expect("push");
    let _n2 = arena.push_for::<i32>(20).expect("push");
    let _n3 = arena.push_for::<i32>(40).expect("push");
    let _n4 = arena.push_for::<i32>(80).expect("push");

    unsafe {
        for i in 0..150 {
            numbers.as_ptr().add(i).write(150 - i as i32);
        }
        for i in 0..150 {
            print!("{} ", numbers.as_ptr().add(i).read());
        }
    }
    println!();
    println!();

    // Clearing decommits and recommits the committed span, which modern
    // kernels hand back zero-filled.
    arena.clear();
    let again = arena.push_for::<i32>(150).expect("push after clear");
    assert_eq!(again.as_ptr(), numbers.as_ptr());

    unsafe {
        for i in 0..150 {
            print!("{} ", again.as_ptr().add(i).read());
        }
    }
    println!();

    // Dropping the handle releases the whole reservation.
}
