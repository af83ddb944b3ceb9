// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Pool walkthrough.
//
// Usage:
//   demo_pool
//
// Bootstraps a pool of 8-byte slots, retrieves a hundred, releases the
// even ones, and prints the slot array so the intrusive free-list links
// are visible in the released slots. Also installs a custom error sink
// and shows the double-release scan firing.

use std::ptr::NonNull;

use libvmem::{hooks, MemoryInfo, MemoryPool, PoolFlags};

fn loud_sink(message: &str, _object: *const u8, name: &str) {
    println!("  !! {name}: {message}");
}

fn main() {
    let info = MemoryInfo::query().expect("memory info");
    println!("libvmem: pool demo");
    println!("(can you see the free list?)");

    let mut pool =
        MemoryPool::bootstrap(info, 8, PoolFlags::NORMAL).expect("bootstrap");

    let mut slots: Vec<NonNull<usize>> = Vec::with_capacity(100);
    for i in 0..100 {
        let slot = pool.retrieve().expect("retrieve").cast::<usize>();
        unsafe { slot.as_ptr().write(4096 - (i + 1) * 4) };
        slots.push(slot);
    }

    // Return every even-indexed slot; each release threads a link through
    // the first word of the freed slot.
    for i in 0..50 {
        unsafe { pool.release(slots[i * 2].cast()) };
    }

    for slot in &slots {
        print!("{:x} ", unsafe { slot.as_ptr().read() });
    }
    println!();
    println!();

    // Retrieval drains the free list in reverse release order.
    for i in 0..50 {
        let slot = pool.retrieve().expect("retrieve").cast::<usize>();
        unsafe { slot.as_ptr().write(i) };
    }

    for slot in &slots {
        print!("{:x} ", unsafe { slot.as_ptr().read() });
    }
    println!();
    println!();

    // The double-release scan reports through the error sink.
    hooks::set_error_sink(loud_sink);
    println!("releasing the same slot twice:");
    unsafe {
        pool.release(slots[1].cast());
        pool.release(slots[1].cast());
    }
    hooks::reset_error_sink();
}
