//! # segalloc - A Segregated Free-List Memory Allocator
//!
//! This crate provides a **segregated free-list allocator** implementation in
//! Rust that manages a single, contiguous, monotonically-growable heap
//! obtained from a lower-level memory provider (by default `sbrk(2)`).
//!
//! ## Overview
//!
//! Unlike a bump allocator, which never reuses freed memory, this allocator
//! partitions its heap into variable-sized blocks tagged with boundary tags
//! (a header and footer word encoding size + allocated bit), keeps 24
//! size-classed free lists for fast fit search, splits oversized blocks on
//! allocation, and eagerly coalesces adjacent free blocks on release:
//!
//! ```text
//!   Block layout:
//!
//!   ┌─────────┬───────────────────────────────┬─────────┐
//!   │ header  │     payload / link area        │ footer  │
//!   │ (4 B)   │        (size - 8 B)             │ (4 B)   │
//!   └─────────┴───────────────────────────────┴─────────┘
//!             ▲
//!             └── pointer returned to the client
//!
//!   A free block's payload holds an in-band successor/predecessor pair
//!   so the segregated lists cost no extra heap space.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   segalloc
//!   ├── align      - Alignment helpers (align8, align_to)
//!   ├── block      - Boundary-tag layout and raw pointer-arithmetic primitives
//!   ├── sizeclass  - Maps a block size to one of 24 segregated-list classes
//!   ├── freelist   - The 24 doubly-linked, size-sorted free lists
//!   ├── provider   - The sbrk-style heap-growth seam (`HeapProvider`)
//!   ├── error      - Internal error type for the provider/init path
//!   └── allocator  - Fit search, split, coalesce, grow, realloc, and the
//!                    public SegAllocator entry points
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use segalloc::{SegAllocator, provider::SbrkHeap};
//!
//! fn main() {
//!     let mut allocator = SegAllocator::new(SbrkHeap::new());
//!
//!     unsafe {
//!         let ptr = allocator.malloc(64) as *mut u64;
//!         *ptr = 42;
//!         println!("Value: {}", *ptr);
//!         allocator.free(ptr as *mut u8);
//!     }
//! }
//! ```
//!
//! ## How It Works
//!
//! The heap begins with an alignment pad and an allocated "prologue" left
//! sentinel, and always ends with a zero-size allocated "epilogue" right
//! sentinel, so every boundary check terminates without special cases at
//! the extremities:
//!
//! ```text
//!   ┌─────┬───────────┬──────────────────────────────┬──────────┐
//!   │ pad │  prologue │        live blocks …          │ epilogue │
//!   │ 4 B │    8 B    │                                │   0 B    │
//!   └─────┴───────────┴──────────────────────────────┴──────────┘
//!         ▲                                                      ▲
//!      heap base                                             heap top
//! ```
//!
//! `malloc` searches the segregated lists for a sufficiently large free
//! block (best-fit within a size class, first-fit across classes), splits
//! it if the remainder is worth keeping, and extends the heap via the
//! [`HeapProvider`](provider::HeapProvider) only when no fit exists. `free`
//! clears the allocated bit and coalesces with both neighbors eagerly.
//! `realloc` resizes in place whenever the shrink fits or a free/epilogue
//! right neighbor can absorb the growth, falling back to allocate+copy+free.
//!
//! ## Features
//!
//! - **Size-classed reuse**: 24 segregated free lists (linear then
//!   geometric) keep fit search close to O(1) in practice.
//! - **Eager coalescing**: no two adjacent free blocks ever coexist.
//! - **In-band free-list links**: no extra heap space spent bookkeeping.
//! - **Pluggable heap source**: generic over [`provider::HeapProvider`]; a
//!   `libc::sbrk`-backed default ships alongside a deterministic,
//!   fixed-capacity provider for tests.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: no synchronization primitives; see spec §5.
//! - **No shrinking**: the heap only ever grows; there is no `munmap`.
//! - **No compaction**: fragmentation is fought with segregated lists,
//!   splitting, and coalescing only.
//!
//! ## Safety
//!
//! This crate is inherently unsafe as it deals with raw memory management
//! and pointer arithmetic over a single contiguous heap buffer. Raw access
//! is confined to [`block`]; the rest of the allocator is ordinary code
//! built on top of its primitives.

pub mod align;
pub mod block;
pub mod error;
pub mod freelist;
pub mod provider;
pub mod sizeclass;

mod allocator;

pub use allocator::{Config, SegAllocator};
pub use error::HeapError;
