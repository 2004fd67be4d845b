//! Alignment helpers.
//!
//! The allocator works in double-words (8 bytes) regardless of the host
//! pointer width: every block size and every payload address handed back to
//! a client must be a multiple of 8. This is a fixed constant from the data
//! model (spec: "the word is 4 bytes; the double-word is 8 bytes"), not the
//! platform's native pointer size, so alignment here is not keyed off
//! `mem::size_of::<usize>()`.

/// Double-word alignment, in bytes.
pub const DALIGN: usize = 8;

/// Rounds `value` up to the next multiple of [`DALIGN`].
///
/// # Examples
///
/// ```
/// use segalloc::align::align8;
///
/// assert_eq!(align8(0), 0);
/// assert_eq!(align8(1), 8);
/// assert_eq!(align8(8), 8);
/// assert_eq!(align8(9), 16);
/// ```
#[inline]
pub const fn align8(
  value: usize,
) -> usize {
  (value + (DALIGN - 1)) & !(DALIGN - 1)
}

/// Rounds `value` up to the next multiple of `align`, which must be a power of two.
#[inline]
pub const fn align_to(
  value: usize,
  align: usize,
) -> usize {
  (value + (align - 1)) & !(align - 1)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn align8_rounds_up_to_double_words() {
    let cases = [
      (0, 0),
      (1, 8),
      (7, 8),
      (8, 8),
      (9, 16),
      (15, 16),
      (16, 16),
      (17, 24),
    ];
    for (input, expected) in cases {
      assert_eq!(align8(input), expected, "align8({input})");
    }
  }

  #[test]
  fn align_to_respects_arbitrary_power_of_two() {
    assert_eq!(align_to(13, 4), 16);
    assert_eq!(align_to(32, 32), 32);
    assert_eq!(align_to(33, 32), 64);
  }
}
