// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Tagged heap: a pool of bounded sub-arenas keyed by a small integer tag.
// Allocations bump inside the newest sub-arena for their tag; freeing a
// tag returns every sub-arena on that tag's chain to the pool in one
// sweep. The shape follows the frame-lifetime pattern from game runtimes
// (one tag per coarse system, freed wholesale between frames).

use std::io;
use std::mem;
use std::ops::{BitOr, BitOrAssign};
use std::ptr::{self, NonNull};

use crate::align::{align_to, round_up};
use crate::arena::{ArenaFlags, Bootstrapped, MemoryArena, BOOTSTRAP_PAD};
use crate::hooks;
use crate::pool::{MemoryPool, PoolFlags};
use crate::vm::MemoryInfo;

/// Number of distinct tags a heap tracks. The intended use is a handful
/// of coarse tags (render, physics, per-frame scratch), so a fixed table
/// keeps the fast path flat.
pub const MAX_TAGS: usize = 64;

/// How many fitting sub-arenas the best-fit scan collects before picking.
const SEARCH_WIDTH: usize = 8;

/// Tagged-heap mode bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapFlags(u32);

impl HeapFlags {
    pub const NORMAL: HeapFlags = HeapFlags(0);
    /// The inner arena is fixed; no expansion when sub-arenas run out.
    pub const FIXED_SIZE: HeapFlags = HeapFlags(1);
    /// Propagated to the inner pool: reused sub-arenas are not zeroed.
    pub const NO_ZERO_MEMORY: HeapFlags = HeapFlags(2);
    /// `bootstrap` keeps the default commit chunk instead of sizing it to
    /// a batch of sub-arenas.
    pub const NO_SET_COMMIT_SIZE: HeapFlags = HeapFlags(4);
    /// When the newest sub-arena is full, scan the tag's chain for up to
    /// eight sub-arenas that fit and pick the tightest one.
    pub const SEARCH_FOR_BEST_FIT: HeapFlags = HeapFlags(8);

    pub fn contains(self, other: HeapFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for HeapFlags {
    type Output = HeapFlags;
    fn bitor(self, rhs: HeapFlags) -> HeapFlags {
        HeapFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for HeapFlags {
    fn bitor_assign(&mut self, rhs: HeapFlags) {
        self.0 |= rhs.0;
    }
}

impl Default for HeapFlags {
    fn default() -> HeapFlags {
        HeapFlags::NORMAL
    }
}

/// Header at the start of every pool slot; the sub-arena's storage
/// follows it inside the same slot.
#[repr(C)]
struct TagArena {
    tag: isize,
    next: *mut TagArena,
    head: *mut u8,
    end: *mut u8,
}

/// Bytes needed for `arena_count` sub-arenas of `arena_size` bytes each,
/// plus the heap's own control block when it bootstraps into its own
/// storage. Useful for sizing fixed buffers.
pub const fn tagged_heap_size(arena_size: usize, arena_count: usize, bootstrapped: bool) -> usize {
    arena_count * (arena_size + mem::size_of::<TagArena>())
        + if bootstrapped {
            mem::size_of::<TaggedHeap<'static>>() + BOOTSTRAP_PAD
        } else {
            0
        }
}

fn sub_arena_fits(arena: *mut TagArena, size: usize) -> bool {
    unsafe { size as isize <= (*arena).end as isize - (*arena).head as isize }
}

fn remaining(arena: *mut TagArena) -> isize {
    unsafe { (*arena).end as isize - (*arena).head as isize }
}

/// Ascending insertion sort by remaining free bytes; ties keep encounter
/// order. The list is at most `SEARCH_WIDTH` long, so nothing fancier is
/// warranted.
fn sort_by_remaining(list: &mut [*mut TagArena]) {
    for i in 1..list.len() {
        let key = list[i];
        let key_remaining = remaining(key);
        let mut j = i;
        while j > 0 && remaining(list[j - 1]) > key_remaining {
            list[j] = list[j - 1];
            j -= 1;
        }
        list[j] = key;
    }
}

/// A pool of bounded bump sub-arenas keyed by tag.
///
/// `alloc(tag, size)` bumps inside a sub-arena belonging to `tag`,
/// pulling fresh sub-arenas from the internal pool as needed; no single
/// allocation may exceed the sub-arena size. `free(tag)` releases every
/// sub-arena of that tag at once.
pub struct TaggedHeap<'a> {
    name: &'static str,
    pool: MemoryPool<'a>,
    arenas: [*mut TagArena; MAX_TAGS],
    arena_size: usize,
    align: usize,
    flags: HeapFlags,
}

// Safety: single-owner; the heap owns its pool which owns the arena
// borrow.
unsafe impl Send for TaggedHeap<'_> {}

impl<'a> TaggedHeap<'a> {
    /// Layer a tagged heap over `arena`. The internal pool's element size
    /// is `arena_size` plus the sub-arena header, rounded so slots stay
    /// word-aligned; the pool runs without its double-free scan (`free`
    /// walks each chain exactly once) and inherits
    /// [`HeapFlags::NO_ZERO_MEMORY`].
    pub fn new(arena: &'a mut MemoryArena, arena_size: usize, flags: HeapFlags) -> TaggedHeap<'a> {
        let mut pool_flags = PoolFlags::NO_DOUBLE_FREE_CHECK;
        if flags.contains(HeapFlags::NO_ZERO_MEMORY) {
            pool_flags |= PoolFlags::NO_ZERO_MEMORY;
        }
        let element = round_up(
            arena_size + mem::size_of::<TagArena>(),
            mem::align_of::<TagArena>(),
        );
        let pool = MemoryPool::new(arena, element, pool_flags);
        TaggedHeap {
            name: "tagged_heap",
            pool,
            arenas: [ptr::null_mut(); MAX_TAGS],
            arena_size,
            align: 8,
            flags,
        }
    }

    /// Expanding heap whose arena, pool, and control block live in one
    /// bootstrapped reservation. Unless [`HeapFlags::NO_SET_COMMIT_SIZE`]
    /// is given, the commit chunk is sized to a batch of eight sub-arenas
    /// so each expansion yields whole slots.
    pub fn bootstrap(
        mut info: MemoryInfo,
        arena_size: usize,
        flags: HeapFlags,
    ) -> io::Result<Bootstrapped<TaggedHeap<'static>>> {
        if flags.contains(HeapFlags::FIXED_SIZE) {
            hooks::report(
                "can't bootstrap a fixed-size tagged heap from a MemoryInfo; use bootstrap_fixed",
                ptr::null(),
                "tagged_heap",
            );
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "fixed-size flag on an expanding tagged heap",
            ));
        }

        if !flags.contains(HeapFlags::NO_SET_COMMIT_SIZE) {
            info.commit_size = tagged_heap_size(arena_size, 8, true);
        }
        let arena_flags = if flags.contains(HeapFlags::NO_ZERO_MEMORY) {
            ArenaFlags::NO_ZERO_MEMORY
        } else {
            ArenaFlags::NORMAL
        };

        let (arena_ptr, reservation) = MemoryArena::bootstrap(info, arena_flags)?.into_parts();
        // Safety: the arena control block stays valid for as long as the
        // reservation it lives in, which the returned handle now owns.
        let arena: &'static mut MemoryArena = unsafe { &mut *arena_ptr.as_ptr() };

        let slot = match arena.push(mem::size_of::<TaggedHeap<'static>>() + BOOTSTRAP_PAD) {
            Some(p) => p.cast::<TaggedHeap<'static>>(),
            None => {
                if let Some((base, len)) = reservation {
                    unsafe { crate::vm::release(base.as_ptr(), len) };
                }
                return Err(io::Error::new(
                    io::ErrorKind::OutOfMemory,
                    "bootstrap push failed",
                ));
            }
        };

        let heap = TaggedHeap::new(arena, arena_size, flags);
        unsafe { ptr::write(slot.as_ptr(), heap) };
        Ok(Bootstrapped {
            ptr: slot,
            reservation,
        })
    }

    /// Fixed heap bootstrapped into a caller buffer. Size the buffer with
    /// [`tagged_heap_size`] plus the arena control block. Returns `None`
    /// (after reporting) when the buffer cannot hold the control blocks.
    ///
    /// # Safety
    /// Same buffer contract as [`MemoryArena::fixed`].
    pub unsafe fn bootstrap_fixed(
        arena_size: usize,
        buffer: *mut u8,
        size: usize,
        flags: HeapFlags,
    ) -> Option<Bootstrapped<TaggedHeap<'static>>> {
        let flags = flags | HeapFlags::FIXED_SIZE;
        let mut arena_flags = ArenaFlags::FIXED_SIZE;
        if flags.contains(HeapFlags::NO_ZERO_MEMORY) {
            arena_flags |= ArenaFlags::NO_ZERO_MEMORY;
        }

        let (arena_ptr, _) = MemoryArena::bootstrap_fixed(buffer, size, arena_flags)?.into_parts();
        let arena: &'static mut MemoryArena = &mut *arena_ptr.as_ptr();

        let slot = arena
            .push(mem::size_of::<TaggedHeap<'static>>())?
            .cast::<TaggedHeap<'static>>();
        let heap = TaggedHeap::new(arena, arena_size, flags);
        ptr::write(slot.as_ptr(), heap);
        Some(Bootstrapped {
            ptr: slot,
            reservation: None,
        })
    }

    /// Allocate `size` bytes under `tag`; the pointer stays valid until
    /// `free(tag)`. `size` must not exceed the sub-arena size. `None`
    /// (after one error-sink report) on contract violation or exhaustion.
    pub fn alloc(&mut self, tag: usize, size: usize) -> Option<NonNull<u8>> {
        let self_ptr = self as *const TaggedHeap as *const u8;

        if tag >= MAX_TAGS {
            hooks::report("tag is out of range", self_ptr, self.name);
            return None;
        }
        if size > self.arena_size {
            hooks::report(
                "cannot allocate an object larger than the size of a tagged heap arena",
                self_ptr,
                self.name,
            );
            return None;
        }

        if self.arenas[tag].is_null() {
            let Some(slot) = self.pool.retrieve() else {
                hooks::report(
                    "sub-arena retrieve returned null when creating a new tag",
                    self_ptr,
                    self.name,
                );
                return None;
            };
            self.arenas[tag] = self.init_sub_arena(slot, tag);
        }

        let mut arena = self.arenas[tag];

        if !sub_arena_fits(arena, size) {
            let mut chosen: *mut TagArena = ptr::null_mut();

            if self.flags.contains(HeapFlags::SEARCH_FOR_BEST_FIT) {
                let mut can_fit = [ptr::null_mut(); SEARCH_WIDTH];
                let mut found = 0;
                let mut cursor = unsafe { (*arena).next };
                while !cursor.is_null() && found < SEARCH_WIDTH {
                    if sub_arena_fits(cursor, size) {
                        can_fit[found] = cursor;
                        found += 1;
                    }
                    cursor = unsafe { (*cursor).next };
                }
                if found > 0 {
                    sort_by_remaining(&mut can_fit[..found]);
                    chosen = can_fit[0];
                }
            }

            if chosen.is_null() {
                let Some(slot) = self.pool.retrieve() else {
                    hooks::report("sub-arena retrieve returned null", self_ptr, self.name);
                    return None;
                };
                let fresh = self.init_sub_arena(slot, tag);
                // Link at the head so the whole chain stays reachable
                // from the tag table.
                unsafe { (*fresh).next = self.arenas[tag] };
                self.arenas[tag] = fresh;
                arena = fresh;
            } else {
                arena = chosen;
            }
        }

        unsafe {
            let old_head = (*arena).head;
            (*arena).head = align_to(old_head as usize + size, self.align) as *mut u8;
            NonNull::new(old_head)
        }
    }

    /// Typed allocation: room for `n` values of `T` under `tag`. `T` must
    /// not need more than the heap's alignment (8).
    pub fn alloc_for<T>(&mut self, tag: usize, n: usize) -> Option<NonNull<T>> {
        debug_assert!(mem::align_of::<T>() <= self.align);
        self.alloc(tag, n * mem::size_of::<T>()).map(NonNull::cast)
    }

    /// Release every sub-arena chained under `tag` back to the pool. The
    /// tag is empty afterwards; allocating under it again starts fresh
    /// (and, with default pool zeroing, on zeroed storage).
    pub fn free(&mut self, tag: usize) {
        if tag >= MAX_TAGS {
            hooks::report(
                "tag is out of range",
                self as *const TaggedHeap as *const u8,
                self.name,
            );
            return;
        }

        let mut cursor = self.arenas[tag];
        while !cursor.is_null() {
            // Every sub-arena on a tag's chain carries that tag.
            debug_assert_eq!(unsafe { (*cursor).tag }, tag as isize);
            let next = unsafe { (*cursor).next };
            unsafe {
                self.pool
                    .release(NonNull::new_unchecked(cursor as *mut u8));
            }
            cursor = next;
        }
        self.arenas[tag] = ptr::null_mut();
    }

    /// Capacity of one sub-arena; also the largest single allocation.
    pub fn arena_size(&self) -> usize {
        self.arena_size
    }

    /// The internal sub-arena pool.
    pub fn pool(&self) -> &MemoryPool<'a> {
        &self.pool
    }

    pub fn flags(&self) -> HeapFlags {
        self.flags
    }

    fn init_sub_arena(&self, slot: NonNull<u8>, tag: usize) -> *mut TagArena {
        let arena = slot.as_ptr() as *mut TagArena;
        unsafe {
            let storage = slot.as_ptr().add(mem::size_of::<TagArena>());
            arena.write(TagArena {
                tag: tag as isize,
                next: ptr::null_mut(),
                head: storage,
                end: storage.add(self.arena_size),
            });
        }
        arena
    }
}
