// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// POSIX virtual-memory backend.
//
// Reservation is a PROT_NONE private anonymous mapping (no backing pages
// are charged thanks to MAP_NORESERVE); commit remaps the sub-range with
// the requested protection via MAP_FIXED, which the kernel hands back
// zero-filled; decommit maps PROT_NONE back over the range, dropping the
// page frames while keeping the addresses reserved.

use std::io;
use std::ptr;

use crate::vm::{megabytes, MemoryInfo, Protect};

// MAP_NORESERVE keeps huge reservations from counting against overcommit
// accounting; the BSDs and macOS have no such flag (or accounting).
#[cfg(target_os = "linux")]
const MAP_RESERVE_EXTRA: libc::c_int = libc::MAP_NORESERVE;

#[cfg(not(target_os = "linux"))]
const MAP_RESERVE_EXTRA: libc::c_int = 0;

fn prot_bits(prot: Protect) -> libc::c_int {
    let mut bits = libc::PROT_NONE;
    if prot.contains(Protect::READ) {
        bits |= libc::PROT_READ;
    }
    if prot.contains(Protect::WRITE) {
        bits |= libc::PROT_WRITE;
    }
    if prot.contains(Protect::EXECUTE) {
        bits |= libc::PROT_EXEC;
    }
    bits
}

/// Reserve `size` bytes of address space with no backing pages.
pub fn reserve(size: usize) -> io::Result<*mut u8> {
    let ptr = unsafe {
        libc::mmap(
            ptr::null_mut(),
            size,
            libc::PROT_NONE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | MAP_RESERVE_EXTRA,
            -1,
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        return Err(io::Error::last_os_error());
    }
    Ok(ptr as *mut u8)
}

/// Back `[addr, addr + size)` with zero-filled pages under `prot`.
/// Idempotent for already-committed pages (they are replaced with fresh
/// zero pages).
///
/// # Safety
/// `addr` must be page-aligned and lie inside a range previously returned
/// by `reserve`, and `addr + size` must not run past its end.
pub unsafe fn commit(addr: *mut u8, size: usize, prot: Protect) -> io::Result<()> {
    let ptr = libc::mmap(
        addr as *mut libc::c_void,
        size,
        prot_bits(prot),
        libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_FIXED,
        -1,
        0,
    );
    if ptr == libc::MAP_FAILED {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Drop the physical pages behind `[addr, addr + size)`. The range stays
/// reserved; contents are lost and accesses fault until recommitted.
///
/// # Safety
/// Same addressing contract as `commit`.
pub unsafe fn decommit(addr: *mut u8, size: usize) {
    libc::mmap(
        addr as *mut libc::c_void,
        size,
        libc::PROT_NONE,
        libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_FIXED | MAP_RESERVE_EXTRA,
        -1,
        0,
    );
}

/// Return the whole reservation to the OS.
///
/// # Safety
/// `addr`/`size` must describe a reservation from `reserve` that has not
/// been released yet.
pub unsafe fn release(addr: *mut u8, size: usize) {
    libc::munmap(addr as *mut libc::c_void, size);
}

/// Page size and physical memory from the OS, plus the crate defaults for
/// the commit chunk (1 MiB) and protection (read|write).
pub fn memory_info() -> io::Result<MemoryInfo> {
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if page_size <= 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(MemoryInfo {
        total_memory: total_physical_memory()?,
        commit_size: megabytes(1),
        page_size: page_size as usize,
        commit_flags: Protect::READ | Protect::WRITE,
    })
}

#[cfg(target_os = "linux")]
fn total_physical_memory() -> io::Result<usize> {
    let mut si: libc::sysinfo = unsafe { std::mem::zeroed() };
    if unsafe { libc::sysinfo(&mut si) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(si.totalram as usize * si.mem_unit as usize)
}

#[cfg(target_os = "macos")]
fn total_physical_memory() -> io::Result<usize> {
    let mut mem: u64 = 0;
    let mut len = std::mem::size_of::<u64>();
    let ret = unsafe {
        libc::sysctlbyname(
            c"hw.memsize".as_ptr(),
            &mut mem as *mut u64 as *mut libc::c_void,
            &mut len,
            ptr::null_mut(),
            0,
        )
    };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(mem as usize)
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn total_physical_memory() -> io::Result<usize> {
    let pages = unsafe { libc::sysconf(libc::_SC_PHYS_PAGES) };
    let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if pages <= 0 || page <= 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(pages as usize * page as usize)
}
