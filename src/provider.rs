//! The heap provider seam.
//!
//! The underlying memory source (an `sbrk`-style one-way extender plus a
//! fixed heap base) is treated as a pluggable collaborator rather than
//! hardwired into the engine: the allocator in [`crate::allocator`] is
//! generic over a [`HeapProvider`], which keeps the segregated-list engine
//! testable against a fake, bounded provider without dragging `libc` into
//! every test.
//!
//! [`SbrkHeap`] is the real-world default: it extends the process heap with
//! `libc::sbrk`.
use std::ptr;

use libc::{intptr_t, sbrk};

use crate::error::HeapError;

/// A one-way, monotonically-growing memory source.
///
/// Implementations must guarantee that [`HeapProvider::heap_base`] is
/// constant across the run and that every successful
/// [`HeapProvider::extend`] call returns 8-byte-aligned memory immediately
/// adjacent to the previous top of the region (i.e. the region is
/// contiguous).
pub trait HeapProvider {
  /// Returns the address of the first byte ever handed out by this
  /// provider. Constant for the lifetime of the provider.
  fn heap_base(
    &self,
  ) -> *mut u8;

  /// Extends the managed region by `bytes`, returning a pointer to the
  /// start of the newly appended region (the old top), or
  /// [`HeapError::OutOfMemory`] if the extension could not be satisfied.
  ///
  /// `bytes` must already be a multiple of [`crate::align::DALIGN`];
  /// callers are responsible for rounding.
  fn extend(
    &mut self,
    bytes: usize,
  ) -> Result<*mut u8, HeapError>;
}

/// The default [`HeapProvider`]: extends the process heap with `sbrk(2)`.
///
/// Confines the raw syscall to this one module instead of spreading it
/// through the allocation engine.
#[derive(Debug, Default)]
pub struct SbrkHeap {
  base: *mut u8,
  base_set: bool,
}

// Safety: `SbrkHeap` owns no shared state beyond the process-wide break
// pointer, and the allocator built on top of it is single-threaded by
// contract. We do not assert `Send`/`Sync`.
impl SbrkHeap {
  /// Creates a provider with no heap base recorded yet; the base is
  /// captured lazily on the first successful `extend`.
  pub const fn new() -> Self {
    Self {
      base: ptr::null_mut(),
      base_set: false,
    }
  }
}

impl HeapProvider for SbrkHeap {
  fn heap_base(
    &self,
  ) -> *mut u8 {
    self.base
  }

  #[tracing::instrument(level = "trace", skip(self))]
  fn extend(
    &mut self,
    bytes: usize,
  ) -> Result<*mut u8, HeapError> {
    debug_assert_eq!(bytes % crate::align::DALIGN, 0, "extend size must be 8-byte aligned");

    // Safety: `sbrk` is a thin wrapper around the `brk` syscall; it is
    // safe to call as long as nothing else in the process is also
    // moving the program break concurrently, which the single-mutator
    // contract guarantees.
    let raw = unsafe { sbrk(bytes as intptr_t) };
    if raw as usize == usize::MAX {
      tracing::debug!(bytes, "sbrk exhausted");
      return Err(HeapError::OutOfMemory { requested: bytes });
    }

    let raw = raw as *mut u8;
    if !self.base_set {
      self.base = raw;
      self.base_set = true;
    }
    tracing::trace!(bytes, new_region = ?raw, "heap extended");
    Ok(raw)
  }
}

/// A fixed-capacity [`HeapProvider`] backed by a boxed byte buffer, used in
/// tests to exercise out-of-memory paths deterministically (something a
/// live `sbrk`-backed provider cannot do without actually exhausting the
/// process).
#[cfg(test)]
#[derive(Debug)]
pub struct FixedHeap {
  storage: Box<[u8]>,
  base: *mut u8,
  used: usize,
}

#[cfg(test)]
impl FixedHeap {
  /// Allocates a backing buffer of `capacity` bytes and returns a
  /// provider over it. `capacity` need not be aligned; `extend` simply
  /// fails once the buffer is exhausted.
  pub fn new(
    capacity: usize,
  ) -> Self {
    let mut storage = vec![0u8; capacity].into_boxed_slice();
    let base = storage.as_mut_ptr();
    Self {
      storage,
      base,
      used: 0,
    }
  }
}

#[cfg(test)]
impl HeapProvider for FixedHeap {
  fn heap_base(
    &self,
  ) -> *mut u8 {
    self.base
  }

  fn extend(
    &mut self,
    bytes: usize,
  ) -> Result<*mut u8, HeapError> {
    if self.used + bytes > self.storage.len() {
      return Err(HeapError::OutOfMemory { requested: bytes });
    }
    let region = unsafe { self.base.add(self.used) };
    self.used += bytes;
    Ok(region)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fixed_heap_extends_contiguously() {
    let mut heap = FixedHeap::new(256);
    let base = heap.heap_base();
    let a = heap.extend(32).unwrap();
    let b = heap.extend(32).unwrap();
    assert_eq!(a, base);
    assert_eq!(b, unsafe { a.add(32) });
  }

  #[test]
  fn fixed_heap_reports_out_of_memory() {
    let mut heap = FixedHeap::new(16);
    assert!(heap.extend(8).is_ok());
    assert_eq!(heap.extend(16), Err(HeapError::OutOfMemory { requested: 16 }));
  }
}
