// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Fixed-element pool layered on a MemoryArena. Free slots are chained
// through an intrusive singly-linked list whose link word is the first
// word of the slot itself (no side table, which is why elements can
// never be smaller than a pointer). A compacting variant keeps the live
// slots dense by copying the last slot over a released one.

use std::io;
use std::mem;
use std::ops::{BitOr, BitOrAssign};
use std::ptr::{self, NonNull};

use crate::arena::{ArenaFlags, Bootstrapped, MemoryArena};
use crate::hooks;
use crate::vm::MemoryInfo;

/// Pool mode bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolFlags(u32);

impl PoolFlags {
    pub const NORMAL: PoolFlags = PoolFlags(0);
    /// No arena expansion when the slots run out.
    pub const FIXED_SIZE: PoolFlags = PoolFlags(1);
    /// `release` copies the last live slot over the released one instead
    /// of free-listing it; the slot array stays dense but pointers to the
    /// previously-last slot are invalidated.
    pub const COMPACTING: PoolFlags = PoolFlags(2);
    /// `retrieve` hands slots back without zeroing them.
    pub const NO_ZERO_MEMORY: PoolFlags = PoolFlags(4);
    /// Skip the linear free-list scan that catches double releases.
    pub const NO_DOUBLE_FREE_CHECK: PoolFlags = PoolFlags(8);

    pub fn contains(self, other: PoolFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for PoolFlags {
    type Output = PoolFlags;
    fn bitor(self, rhs: PoolFlags) -> PoolFlags {
        PoolFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for PoolFlags {
    fn bitor_assign(&mut self, rhs: PoolFlags) {
        self.0 |= rhs.0;
    }
}

impl Default for PoolFlags {
    fn default() -> PoolFlags {
        PoolFlags::NORMAL
    }
}

// The free-list link occupies the first word of a free slot. Slots are
// not necessarily aligned for a pointer (fixed arenas can start
// anywhere), so links go through unaligned reads/writes.
unsafe fn read_link(slot: *mut u8) -> *mut u8 {
    (slot as *const *mut u8).read_unaligned()
}

unsafe fn write_link(slot: *mut u8, next: *mut u8) {
    (slot as *mut *mut u8).write_unaligned(next);
}

/// A fixed-element-size allocator over a [`MemoryArena`].
///
/// Slots are carved from the arena's committed space starting at the
/// arena head at construction time. `retrieve` prefers recycled slots
/// (LIFO) and falls back to bumping a high-water mark; `release` links a
/// slot back onto the free list (or compacts, see
/// [`PoolFlags::COMPACTING`]).
pub struct MemoryPool<'a> {
    name: &'static str,
    element_size: usize,
    count: usize,
    capacity: usize,
    /// Highest slot index ever handed out via the bump path; -1 initially.
    last_filled: isize,
    slots: *mut u8,
    free_list: *mut u8,
    arena: &'a mut MemoryArena,
    flags: PoolFlags,
}

// Safety: single-owner; the exclusive arena borrow moves with the pool.
unsafe impl Send for MemoryPool<'_> {}

impl<'a> MemoryPool<'a> {
    /// Carve a pool out of `arena`'s remaining committed space.
    /// `element_size` is clamped up to pointer size so the intrusive free
    /// list always fits inside a slot.
    pub fn new(arena: &'a mut MemoryArena, element_size: usize, flags: PoolFlags) -> MemoryPool<'a> {
        let element_size = element_size.max(mem::size_of::<*mut u8>());
        let slots = arena.head;
        let capacity = (arena.end as usize - arena.head as usize) / element_size;
        MemoryPool {
            name: "pool",
            element_size,
            count: 0,
            capacity,
            last_filled: -1,
            slots,
            free_list: ptr::null_mut(),
            arena,
            flags,
        }
    }

    /// Expanding pool whose arena and control block live in one
    /// bootstrapped reservation; the caller holds only the handle.
    ///
    /// Rejects [`PoolFlags::FIXED_SIZE`]; use
    /// [`bootstrap_fixed`](MemoryPool::bootstrap_fixed) for a caller
    /// buffer.
    pub fn bootstrap(
        info: MemoryInfo,
        element_size: usize,
        flags: PoolFlags,
    ) -> io::Result<Bootstrapped<MemoryPool<'static>>> {
        if flags.contains(PoolFlags::FIXED_SIZE) {
            hooks::report(
                "can't bootstrap a fixed-size pool from a MemoryInfo; use bootstrap_fixed",
                ptr::null(),
                "pool",
            );
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "fixed-size flag on an expanding pool",
            ));
        }

        let (arena_ptr, reservation) =
            MemoryArena::bootstrap(info, ArenaFlags::NORMAL)?.into_parts();
        // Safety: the arena control block stays valid for as long as the
        // reservation it lives in, which the returned handle now owns.
        let arena: &'static mut MemoryArena = unsafe { &mut *arena_ptr.as_ptr() };

        let slot = match arena.push(mem::size_of::<MemoryPool<'static>>()) {
            Some(p) => p.cast::<MemoryPool<'static>>(),
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

        let pool = MemoryPool::new(arena, element_size, flags);
        unsafe { ptr::write(slot.as_ptr(), pool) };
        Ok(Bootstrapped {
            ptr: slot,
            reservation,
        })
    }

    /// Fixed pool bootstrapped into a caller buffer: arena control block,
    /// pool control block, then slots. Returns `None` (after reporting)
    /// when the buffer is too small for the control blocks.
    ///
    /// # Safety
    /// Same buffer contract as [`MemoryArena::fixed`].
    pub unsafe fn bootstrap_fixed(
        element_size: usize,
        buffer: *mut u8,
        size: usize,
        flags: PoolFlags,
    ) -> Option<Bootstrapped<MemoryPool<'static>>> {
        let flags = flags | PoolFlags::FIXED_SIZE;
        let (arena_ptr, _) =
            MemoryArena::bootstrap_fixed(buffer, size, ArenaFlags::FIXED_SIZE)?.into_parts();
        let arena: &'static mut MemoryArena = &mut *arena_ptr.as_ptr();

        let slot = arena
            .push(mem::size_of::<MemoryPool<'static>>())?
            .cast::<MemoryPool<'static>>();
        let pool = MemoryPool::new(arena, element_size, flags);
        ptr::write(slot.as_ptr(), pool);
        Some(Bootstrapped {
            ptr: slot,
            reservation: None,
        })
    }

    /// Hand out one slot, zeroed unless [`PoolFlags::NO_ZERO_MEMORY`].
    ///
    /// Recycled slots come back in LIFO order; otherwise the next untouched
    /// slot is used, growing the arena by one commit chunk when the carved
    /// space runs out. `None` (after one error-sink report) on exhaustion.
    pub fn retrieve(&mut self) -> Option<NonNull<u8>> {
        let self_ptr = self as *const MemoryPool as *const u8;

        if !self.flags.contains(PoolFlags::COMPACTING) && !self.free_list.is_null() {
            let slot = self.free_list;
            self.free_list = unsafe { read_link(slot) };
            self.count += 1;
            if !self.flags.contains(PoolFlags::NO_ZERO_MEMORY) {
                unsafe { hooks::mem_set(slot, 0, self.element_size) };
            }
            return NonNull::new(slot);
        }

        while self.last_filled >= self.capacity as isize - 1 {
            let chunk = self.arena.info.commit_size;
            if self.flags.contains(PoolFlags::FIXED_SIZE) || chunk == 0 {
                hooks::report("pool ran out of memory", self_ptr, self.name);
                return None;
            }

            // Each push advances the arena head by a whole chunk, so the
            // committed end must eventually move (or the reservation runs
            // out and the push fails).
            if self.arena.push(chunk).is_none() {
                hooks::report("arena push failed while growing pool", self_ptr, self.name);
                return None;
            }
            self.capacity = (self.arena.end as usize - self.slots as usize) / self.element_size;
        }

        self.last_filled += 1;
        let slot = unsafe { self.slots.add(self.last_filled as usize * self.element_size) };
        self.count += 1;
        if !self.flags.contains(PoolFlags::NO_ZERO_MEMORY) {
            unsafe { hooks::mem_set(slot, 0, self.element_size) };
        }
        NonNull::new(slot)
    }

    /// Return `slot` to the pool.
    ///
    /// Non-compacting pools scan the free list first (unless
    /// [`PoolFlags::NO_DOUBLE_FREE_CHECK`]) and reject a slot that is
    /// already free, leaving the pool untouched. Compacting pools copy the
    /// last live slot over `slot` instead, invalidating any caller pointer
    /// to that last slot.
    ///
    /// # Safety
    /// `slot` must have been returned by `retrieve` on this pool and must
    /// currently be live (the scan catches the common double-release, but
    /// only when the check is enabled).
    pub unsafe fn release(&mut self, slot: NonNull<u8>) {
        let self_ptr = self as *const MemoryPool as *const u8;
        let p = slot.as_ptr();

        if !self.free_list.is_null() && !self.flags.contains(PoolFlags::NO_DOUBLE_FREE_CHECK) {
            let mut cursor = self.free_list;
            while !cursor.is_null() {
                if cursor == p {
                    hooks::report(
                        "caught attempt to release previously released memory",
                        self_ptr,
                        self.name,
                    );
                    return;
                }
                cursor = read_link(cursor);
            }
        }

        if self.count == 0 {
            hooks::report("release on an empty pool", self_ptr, self.name);
            return;
        }

        if self.flags.contains(PoolFlags::COMPACTING) {
            let last = self.slots.add((self.count - 1) * self.element_size);
            if last != p {
                hooks::mem_copy(p, last, self.element_size);
            }
            self.count -= 1;
            return;
        }

        write_link(p, self.free_list);
        self.free_list = p;
        self.count -= 1;
    }

    /// Live (retrieved and not yet released) slot count.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Slots currently carved out of the arena's committed space.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Per-slot byte size (after the pointer-size clamp).
    pub fn element_size(&self) -> usize {
        self.element_size
    }

    /// Base address of the slot array.
    pub fn slots(&self) -> *mut u8 {
        self.slots
    }

    /// The backing arena.
    pub fn arena(&self) -> &MemoryArena {
        self.arena
    }
}
