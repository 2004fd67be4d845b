//! Internal error type for the heap provider and one-time initialization path.
//!
//! This never crosses the public `malloc`/`free`/`realloc` boundary: those
//! report failure by returning `None` (or, for `free`, doing nothing), per
//! the allocator's contract. `HeapError` exists so the *internal*
//! collaborators (the provider and `SegAllocator::init`/`extend`) get to
//! propagate failure with `?` instead of sentinel pointer values.
use thiserror::Error;

/// Failure modes internal to growing or initializing the heap.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeapError {
  /// The underlying provider refused to extend the heap (its `sbrk`
  /// analogue returned its exhaustion sentinel).
  #[error("heap provider refused to extend the heap by {requested} bytes")]
  OutOfMemory {
    /// Number of bytes that were requested.
    requested: usize,
  },
}
