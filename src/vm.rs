// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// The reserve / commit / decommit / release surface every allocator
// shares, plus the per-process memory configuration it is driven by.
// Delegates to platform::{posix, windows}.

use std::io;
use std::ops::{BitOr, BitOrAssign};
use std::ptr::NonNull;

use crate::platform;

/// `n` KiB in bytes.
pub const fn kilobytes(n: usize) -> usize {
    n * 1024
}

/// `n` MiB in bytes.
pub const fn megabytes(n: usize) -> usize {
    kilobytes(n) * 1024
}

/// `n` GiB in bytes.
pub const fn gigabytes(n: usize) -> usize {
    megabytes(n) * 1024
}

/// Page protection bits applied on commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Protect(u32);

impl Protect {
    pub const NONE: Protect = Protect(0);
    pub const READ: Protect = Protect(1);
    pub const WRITE: Protect = Protect(2);
    pub const EXECUTE: Protect = Protect(4);

    /// True when every bit of `other` is set in `self`.
    pub fn contains(self, other: Protect) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Protect {
    type Output = Protect;
    fn bitor(self, rhs: Protect) -> Protect {
        Protect(self.0 | rhs.0)
    }
}

impl BitOrAssign for Protect {
    fn bitor_assign(&mut self, rhs: Protect) {
        self.0 |= rhs.0;
    }
}

/// Immutable per-process memory configuration: total physical memory,
/// the chunk size committed at a time, the page size, and the protection
/// applied to committed pages.
///
/// Produced by [`MemoryInfo::query`]; the fields are public so callers can
/// shrink the reservation or tune the commit chunk before handing the
/// struct to an allocator.
#[derive(Debug, Clone, Copy)]
pub struct MemoryInfo {
    /// Bytes an expanding arena reserves up front. Defaults to the
    /// machine's physical memory.
    pub total_memory: usize,
    /// Bytes committed per expansion step. Defaults to 1 MiB.
    pub commit_size: usize,
    /// OS page size.
    pub page_size: usize,
    /// Protection for committed pages. Defaults to read|write.
    pub commit_flags: Protect,
}

impl MemoryInfo {
    /// Fill a `MemoryInfo` from the OS.
    pub fn query() -> io::Result<MemoryInfo> {
        platform::memory_info()
    }
}

/// Reserve `size` bytes of address space without backing pages.
pub fn reserve(size: usize) -> io::Result<NonNull<u8>> {
    let ptr = platform::reserve(size)?;
    NonNull::new(ptr).ok_or_else(|| {
        io::Error::new(io::ErrorKind::OutOfMemory, "reservation returned null")
    })
}

/// Back `[addr, addr + size)` with zero-filled pages under `prot`.
///
/// # Safety
/// `addr` must be page-aligned inside a live reservation and
/// `addr + size` must not run past its end.
pub unsafe fn commit(addr: *mut u8, size: usize, prot: Protect) -> io::Result<()> {
    platform::commit(addr, size, prot)
}

/// Drop the pages behind `[addr, addr + size)`, keeping the range
/// reserved. Contents are lost; accesses fault until recommitted.
///
/// # Safety
/// Same addressing contract as [`commit`].
pub unsafe fn decommit(addr: *mut u8, size: usize) {
    platform::decommit(addr, size)
}

/// Return a whole reservation to the OS.
///
/// # Safety
/// `addr`/`size` must describe a reservation from [`reserve`] that has
/// not been released yet; no pointer into it may be used afterwards.
pub unsafe fn release(addr: *mut u8, size: usize) {
    platform::release(addr, size)
}
