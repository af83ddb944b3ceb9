// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Windows virtual-memory backend: VirtualAlloc with MEM_RESERVE /
// MEM_COMMIT, VirtualFree with MEM_DECOMMIT / MEM_RELEASE, and the
// system-information queries for page size and physical memory.

use std::io;
use std::ptr;

use windows_sys::Win32::System::Memory::{
    VirtualAlloc, VirtualFree, MEM_COMMIT, MEM_DECOMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_EXECUTE,
    PAGE_EXECUTE_READ, PAGE_EXECUTE_READWRITE, PAGE_NOACCESS, PAGE_READONLY, PAGE_READWRITE,
};
use windows_sys::Win32::System::SystemInformation::{
    GetSystemInfo, GlobalMemoryStatusEx, MEMORYSTATUSEX, SYSTEM_INFO,
};

use crate::vm::{megabytes, MemoryInfo, Protect};

fn page_protection(prot: Protect) -> u32 {
    let r = prot.contains(Protect::READ);
    let w = prot.contains(Protect::WRITE);
    let x = prot.contains(Protect::EXECUTE);
    match (r, w, x) {
        (_, true, true) => PAGE_EXECUTE_READWRITE,
        (_, true, false) => PAGE_READWRITE,
        (true, false, true) => PAGE_EXECUTE_READ,
        (true, false, false) => PAGE_READONLY,
        (false, false, true) => PAGE_EXECUTE,
        (false, false, false) => PAGE_NOACCESS,
    }
}

/// Reserve `size` bytes of address space with no backing pages.
pub fn reserve(size: usize) -> io::Result<*mut u8> {
    let ptr = unsafe { VirtualAlloc(ptr::null(), size, MEM_RESERVE, PAGE_NOACCESS) };
    if ptr.is_null() {
        return Err(io::Error::last_os_error());
    }
    Ok(ptr as *mut u8)
}

/// Back `[addr, addr + size)` with zero-filled pages under `prot`.
/// Idempotent for already-committed pages.
///
/// # Safety
/// `addr` must lie inside a range previously returned by `reserve`, and
/// `addr + size` must not run past its end.
pub unsafe fn commit(addr: *mut u8, size: usize, prot: Protect) -> io::Result<()> {
    let ptr = VirtualAlloc(addr as *const _, size, MEM_COMMIT, page_protection(prot));
    if ptr.is_null() {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Drop the physical pages behind `[addr, addr + size)`; the range stays
/// reserved.
///
/// # Safety
/// Same addressing contract as `commit`.
pub unsafe fn decommit(addr: *mut u8, size: usize) {
    VirtualFree(addr as *mut _, size, MEM_DECOMMIT);
}

/// Return the whole reservation to the OS.
///
/// # Safety
/// `addr` must be the base returned by `reserve` for a reservation that
/// has not been released yet.
pub unsafe fn release(addr: *mut u8, _size: usize) {
    // MEM_RELEASE requires a zero size and the original reservation base.
    VirtualFree(addr as *mut _, 0, MEM_RELEASE);
}

/// Page size and physical memory from the OS, plus the crate defaults for
/// the commit chunk (1 MiB) and protection (read|write).
pub fn memory_info() -> io::Result<MemoryInfo> {
    let mut sys: SYSTEM_INFO = unsafe { std::mem::zeroed() };
    unsafe { GetSystemInfo(&mut sys) };

    let mut status: MEMORYSTATUSEX = unsafe { std::mem::zeroed() };
    status.dwLength = std::mem::size_of::<MEMORYSTATUSEX>() as u32;
    if unsafe { GlobalMemoryStatusEx(&mut status) } == 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(MemoryInfo {
        total_memory: status.ullTotalPhys as usize,
        commit_size: megabytes(1),
        page_size: sys.dwPageSize as usize,
        commit_flags: Protect::READ | Protect::WRITE,
    })
}
