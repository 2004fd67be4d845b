//! Block layout and boundary-tag primitives.
//!
//! A block is a contiguous byte range inside the heap:
//!
//! ```text
//! offset 0       : header word (4 B)  — encodes (size, alloc-bit)
//! offset 4       : payload/link area  — size - 8 bytes
//! offset size-4  : footer word (4 B)  — same encoding as header
//! ```
//!
//! The payload address handed to clients is `header + 4`. Everywhere in
//! this crate a "block pointer" (`bp`) means that payload address, never
//! the header address — matching the convention the original malloc-lab
//! source used (`HDRP`/`FTRP`/`NEXT_BLKP`/`PREV_BLKP` all take and are
//! defined relative to `bp`).
//!
//! All raw pointer arithmetic is confined to this module; `freelist` and
//! `allocator` are built on top of the functions here (each still
//! `unsafe fn` since they dereference raw heap-interior pointers, but none
//! of them reach for pointer arithmetic directly).
use crate::align::DALIGN;

/// Header/footer size, in bytes.
pub const TAG_SIZE: usize = 4;
/// Header + footer overhead for an allocated or free block.
pub const OVERHEAD: usize = 2 * TAG_SIZE;
/// Smallest legal block: header(4) + succ(4) + pred(4) + footer(4).
pub const MIN_BLOCK_SIZE: usize = 16;
/// Smallest payload a client can request room for.
pub const MIN_PAYLOAD: usize = 8;

const ALLOC_BIT: u32 = 0x1;
const SIZE_MASK: u32 = !0x7;

/// Packs a `(size, allocated)` pair into a boundary-tag word.
#[inline]
pub const fn pack(
  size: usize,
  allocated: bool,
) -> u32 {
  (size as u32) | (allocated as u32 & ALLOC_BIT)
}

#[inline]
const fn unpack_size(
  word: u32,
) -> usize {
  (word & SIZE_MASK) as usize
}

#[inline]
const fn unpack_alloc(
  word: u32,
) -> bool {
  (word & ALLOC_BIT) != 0
}

/// Reads a raw 4-byte tag word at `ptr`.
///
/// # Safety
/// `ptr` must be a valid, 4-byte-aligned pointer to a boundary tag.
#[inline]
pub unsafe fn read_tag(
  ptr: *const u8,
) -> u32 {
  unsafe { (ptr as *const u32).read() }
}

/// Writes a raw 4-byte tag word at `ptr`.
///
/// # Safety
/// `ptr` must be a valid, 4-byte-aligned, writable pointer.
#[inline]
pub unsafe fn write_tag(
  ptr: *mut u8,
  word: u32,
) {
  unsafe { (ptr as *mut u32).write(word) };
}

/// The header address for the block whose payload starts at `bp`.
#[inline]
pub fn header_at(
  bp: *mut u8,
) -> *mut u8 {
  unsafe { bp.sub(TAG_SIZE) }
}

/// The footer address for a block at `bp` whose size is `size`.
#[inline]
pub fn footer_at(
  bp: *mut u8,
  size: usize,
) -> *mut u8 {
  unsafe { bp.add(size - OVERHEAD) }
}

/// Reads the size encoded in `bp`'s header.
///
/// # Safety
/// `bp` must point at a live block's payload.
#[inline]
pub unsafe fn size_of_block(
  bp: *mut u8,
) -> usize {
  unpack_size(unsafe { read_tag(header_at(bp)) })
}

/// Reads the allocated bit encoded in `bp`'s header.
///
/// # Safety
/// `bp` must point at a live block's payload.
#[inline]
pub unsafe fn is_allocated(
  bp: *mut u8,
) -> bool {
  unpack_alloc(unsafe { read_tag(header_at(bp)) })
}

/// Writes both header and footer of the block at `bp` with `(size, allocated)`.
///
/// # Safety
/// `bp .. bp + size` must be a writable range inside the heap and `size`
/// must be a multiple of [`DALIGN`] and at least [`MIN_BLOCK_SIZE`].
#[inline]
pub unsafe fn set_block(
  bp: *mut u8,
  size: usize,
  allocated: bool,
) {
  debug_assert_eq!(size % DALIGN, 0);
  debug_assert!(size >= MIN_BLOCK_SIZE);
  let word = pack(size, allocated);
  unsafe {
    write_tag(header_at(bp), word);
    write_tag(footer_at(bp, size), word);
  }
}

/// Writes only the epilogue sentinel (a zero-size allocated header with no
/// footer) at `bp`.
///
/// # Safety
/// `bp` must be 4-byte aligned and the 4 bytes at `bp` must be writable.
#[inline]
pub unsafe fn set_epilogue(
  bp: *mut u8,
) {
  unsafe { write_tag(header_at(bp), pack(0, true)) };
}

/// The payload address of the block physically following `bp`.
///
/// # Safety
/// `bp` must point at a live block's payload and the next block must
/// exist (true for every non-epilogue block by construction).
#[inline]
pub unsafe fn next_blkp(
  bp: *mut u8,
) -> *mut u8 {
  unsafe { bp.add(size_of_block(bp)) }
}

/// The payload address of the block physically preceding `bp`, found by
/// reading the previous block's footer.
///
/// # Safety
/// `bp` must point at a live block's payload, and the 4 bytes immediately
/// before `bp`'s header must be a valid footer (true for every block past
/// the prologue).
#[inline]
pub unsafe fn prev_blkp(
  bp: *mut u8,
) -> *mut u8 {
  let prev_footer = unsafe { bp.sub(OVERHEAD) };
  let prev_size = unpack_size(unsafe { read_tag(prev_footer) });
  unsafe { bp.sub(prev_size) }
}

/// Converts a heap-interior pointer into a `u32` offset from `base`.
///
/// Link fields are stored as 4-byte offsets rather than raw 8-byte
/// pointers so that a free block's in-band `succ`/`pred` pair fits in the
/// 8 bytes available to it, keeping [`MIN_BLOCK_SIZE`] at 16 bytes. Offset
/// 0 is reserved for "null": the heap base is always the alignment pad,
/// never a free block's payload.
#[inline]
fn offset_of(
  base: *mut u8,
  ptr: *mut u8,
) -> u32 {
  (ptr as usize - base as usize) as u32
}

#[inline]
fn ptr_from_offset(
  base: *mut u8,
  offset: u32,
) -> *mut u8 {
  unsafe { base.add(offset as usize) }
}

/// Reads the successor link (offset 0 in the payload) of a free block.
///
/// # Safety
/// `bp` must be a currently-free block.
#[inline]
pub unsafe fn succ_of(
  bp: *mut u8,
  base: *mut u8,
) -> Option<*mut u8> {
  let raw = unsafe { read_tag(bp) };
  if raw == 0 { None } else { Some(ptr_from_offset(base, raw)) }
}

/// Writes the successor link of a free block.
///
/// # Safety
/// `bp` must be a currently-free block with at least [`MIN_BLOCK_SIZE`] bytes.
#[inline]
pub unsafe fn set_succ(
  bp: *mut u8,
  base: *mut u8,
  target: Option<*mut u8>,
) {
  let word = target.map(|p| offset_of(base, p)).unwrap_or(0);
  unsafe { write_tag(bp, word) };
}

/// Reads the predecessor link (offset 4 in the payload) of a free block.
///
/// # Safety
/// `bp` must be a currently-free block.
#[inline]
pub unsafe fn pred_of(
  bp: *mut u8,
  base: *mut u8,
) -> Option<*mut u8> {
  let raw = unsafe { read_tag(bp.add(TAG_SIZE)) };
  if raw == 0 { None } else { Some(ptr_from_offset(base, raw)) }
}

/// Writes the predecessor link of a free block.
///
/// # Safety
/// `bp` must be a currently-free block with at least [`MIN_BLOCK_SIZE`] bytes.
#[inline]
pub unsafe fn set_pred(
  bp: *mut u8,
  base: *mut u8,
  target: Option<*mut u8>,
) {
  let word = target.map(|p| offset_of(base, p)).unwrap_or(0);
  unsafe {
    let pred_ptr = bp.add(TAG_SIZE);
    write_tag(pred_ptr, word);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn pack_unpack_roundtrip() {
    for size in [16usize, 24, 256, 65536] {
      for alloc in [true, false] {
        let word = pack(size, alloc);
        assert_eq!(unpack_size(word), size);
        assert_eq!(unpack_alloc(word), alloc);
      }
    }
  }

  #[test]
  fn header_footer_roundtrip_on_a_buffer() {
    let mut buf = vec![0u8; 64];
    let base = buf.as_mut_ptr();
    // pretend payload starts 4 bytes in (room for a header before it)
    let bp = unsafe { base.add(4) };
    unsafe { set_block(bp, 32, false) };
    unsafe {
      assert_eq!(size_of_block(bp), 32);
      assert!(!is_allocated(bp));
    }
  }

  #[test]
  fn succ_pred_offsets_roundtrip() {
    let mut buf = vec![0u8; 128];
    let base = buf.as_mut_ptr();
    let a = unsafe { base.add(16) };
    let b = unsafe { base.add(48) };
    unsafe {
      set_succ(a, base, Some(b));
      set_pred(a, base, None);
      assert_eq!(succ_of(a, base), Some(b));
      assert_eq!(pred_of(a, base), None);
    }
  }
}
