// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Process-wide injection points.
//
// Two seams exist so the core can run with caller-provided replacements
// (freestanding targets, test instrumentation):
//   - the error sink, called once per detected contract violation,
//     exhaustion, or backend failure;
//   - the raw memory ops used for zeroing and slot moves.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Called whenever an allocator detects a problem. `object` is the address
/// of the complaining allocator (null when none exists yet) and `name` its
/// short name ("arena", "pool", "tagged_heap"). The sink must not call back
/// into the allocator that reported.
pub type ErrorSink = fn(message: &str, object: *const u8, name: &str);

/// Byte-fill, `ptr::write_bytes` shaped.
pub type MemSet = unsafe fn(dst: *mut u8, byte: u8, len: usize);

/// Non-overlapping byte copy, `ptr::copy_nonoverlapping` shaped.
pub type MemCopy = unsafe fn(dst: *mut u8, src: *const u8, len: usize);

// Stored as raw fn-pointer bits; 0 selects the built-in default.
// (A fn pointer cannot be cast to usize in a const initializer.)
static ERROR_SINK: AtomicUsize = AtomicUsize::new(0);
static MEM_SET: AtomicUsize = AtomicUsize::new(0);
static MEM_COPY: AtomicUsize = AtomicUsize::new(0);

/// Install a process-wide error sink, replacing the default stderr line.
pub fn set_error_sink(sink: ErrorSink) {
    ERROR_SINK.store(sink as usize, Ordering::Release);
}

/// Restore the default stderr error sink.
pub fn reset_error_sink() {
    ERROR_SINK.store(0, Ordering::Release);
}

/// Replace the raw memory ops used for zeroing and slot moves.
pub fn set_mem_ops(set: MemSet, copy: MemCopy) {
    MEM_SET.store(set as usize, Ordering::Release);
    MEM_COPY.store(copy as usize, Ordering::Release);
}

/// Restore the default `ptr::write_bytes` / `ptr::copy_nonoverlapping`
/// memory ops.
pub fn reset_mem_ops() {
    MEM_SET.store(0, Ordering::Release);
    MEM_COPY.store(0, Ordering::Release);
}

pub(crate) fn report(message: &str, object: *const u8, name: &str) {
    match ERROR_SINK.load(Ordering::Acquire) {
        0 => default_error_sink(message, object, name),
        raw => {
            let sink: ErrorSink = unsafe { std::mem::transmute(raw) };
            sink(message, object, name);
        }
    }
}

/// # Safety
/// `dst` must be valid for writes of `len` bytes.
pub(crate) unsafe fn mem_set(dst: *mut u8, byte: u8, len: usize) {
    match MEM_SET.load(Ordering::Acquire) {
        0 => std::ptr::write_bytes(dst, byte, len),
        raw => {
            let f: MemSet = std::mem::transmute(raw);
            f(dst, byte, len);
        }
    }
}

/// # Safety
/// `dst` and `src` must be valid for `len` bytes and must not overlap.
pub(crate) unsafe fn mem_copy(dst: *mut u8, src: *const u8, len: usize) {
    match MEM_COPY.load(Ordering::Acquire) {
        0 => std::ptr::copy_nonoverlapping(src, dst, len),
        raw => {
            let f: MemCopy = std::mem::transmute(raw);
            f(dst, src, len);
        }
    }
}

fn default_error_sink(message: &str, _object: *const u8, name: &str) {
    eprintln!("alloc error: [{name}] {message}");
}
