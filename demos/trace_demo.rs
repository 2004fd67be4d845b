//! Drives a small synthetic allocation trace through [`SegAllocator`] and
//! prints the program break before/after growth.
//!
//! Run with `RUST_LOG=segalloc=trace cargo run --example trace_demo` to see
//! the `tracing` spans for fit search, placement, and coalescing.
use std::io::Read;

use libc::sbrk;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use segalloc::SegAllocator;
use segalloc::provider::SbrkHeap;

/// Waits until the user presses ENTER. Useful for inspecting the process
/// with `pmap`/`htop`/`gdb` between steps.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints the current program break using `sbrk(0)`.
unsafe fn print_program_break(
  label: &str,
) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    unsafe { sbrk(0) },
  );
}

fn main() {
  tracing_subscriber::fmt::init();

  let mut allocator = SegAllocator::new(SbrkHeap::new());
  let mut rng = StdRng::seed_from_u64(0xA110C_A7E);
  let mut live: Vec<(*mut u8, usize)> = Vec::new();

  unsafe {
    print_program_break("start");
    block_until_enter_pressed();

    // --------------------------------------------------------------
    // 1) Allocate a handful of small, same-class blocks.
    // --------------------------------------------------------------
    println!("\n[1] Allocate five 40-byte blocks");
    for _ in 0..5 {
      let p = allocator.malloc(40);
      assert!(!p.is_null());
      live.push((p, 40));
    }
    println!("[1] pointers: {:?}", live.iter().map(|(p, _)| *p).collect::<Vec<_>>());
    block_until_enter_pressed();

    // --------------------------------------------------------------
    // 2) Free the middle block, then allocate a same-size block and
    //    confirm it's recycled rather than taken from the heap top.
    // --------------------------------------------------------------
    let (freed_ptr, _) = live.remove(2);
    allocator.free(freed_ptr);
    println!("\n[2] Freed the middle 40-byte block at {freed_ptr:?}");

    let recycled = allocator.malloc(40);
    println!(
      "[2] Reallocated 40 bytes -> {:?} (recycled? {})",
      recycled,
      recycled == freed_ptr
    );
    live.push((recycled, 40));
    block_until_enter_pressed();

    // --------------------------------------------------------------
    // 3) Drive a random trace of mallocs, frees, and reallocs to
    //    exercise growth and coalescing.
    // --------------------------------------------------------------
    print_program_break("before random trace");
    for step in 0..200 {
      match rng.gen_range(0..3) {
        0 => {
          let size = rng.gen_range(1..=2048);
          let p = allocator.malloc(size);
          if !p.is_null() {
            live.push((p, size));
          }
        }
        1 if !live.is_empty() => {
          let i = rng.gen_range(0..live.len());
          let (p, _) = live.remove(i);
          allocator.free(p);
        }
        _ if !live.is_empty() => {
          let i = rng.gen_range(0..live.len());
          let (p, _) = live.remove(i);
          let newsize = rng.gen_range(1..=2048);
          let r = allocator.realloc(p, newsize);
          if !r.is_null() {
            live.push((r, newsize));
          }
        }
        _ => {}
      }
      if step % 50 == 0 {
        println!("[3] step {step}: {} live allocations", live.len());
      }
    }
    print_program_break("after random trace");
    block_until_enter_pressed();

    // --------------------------------------------------------------
    // 4) Write and read back through a surviving pointer to show the
    //    memory is actually usable, then free everything.
    // --------------------------------------------------------------
    if let Some(&(p, size)) = live.first() {
      if size >= 8 {
        let typed = p as *mut u64;
        typed.write(0xDEAD_BEEF_CAFE_F00D);
        println!("\n[4] Round-tripped value: 0x{:X}", typed.read());
      }
    }

    for (p, _) in live.drain(..) {
      allocator.free(p);
    }
    println!("\n[5] Freed all remaining allocations. Process will exit; the OS reclaims the heap.");
  }
}
