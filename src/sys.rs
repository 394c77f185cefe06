//! Platform primitives: page-size query and stack-growth-direction probe.
//!
//! Spec section 9 calls out the page size as the only process-wide mutable
//! state in this crate ("cached on first use, immutable thereafter"); the
//! rest of the platform surface the original shells out to inline assembly
//! for (`get_stack`, `get_stack_direction`) is representable in plain Rust
//! by comparing addresses of two stack-resident locals across a call
//! boundary, so no assembly is needed for either.

use std::sync::OnceLock;

static PAGE_SIZE: OnceLock<usize> = OnceLock::new();

/// Returns the platform page size, querying `sysconf(_SC_PAGESIZE)` once
/// and caching the result.
pub fn page_size() -> usize {
    *PAGE_SIZE.get_or_init(|| {
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size <= 0 {
            4096
        } else {
            size as usize
        }
    })
}

/// Rounds `addr` up (if `up`) or down (if `!up`) to the next page boundary.
pub fn align_to_page(addr: usize, up: bool) -> usize {
    let size = page_size();
    if up {
        (addr + size - 1) / size * size
    } else {
        addr / size * size
    }
}

static STACK_GROWS_DOWN: OnceLock<bool> = OnceLock::new();

/// True if the stack grows toward lower addresses, which is every
/// architecture this crate ships assembly for (x86_64, aarch64) but is
/// still probed rather than assumed, matching the original's
/// `get_stack_direction` being a runtime call rather than a `#[cfg]`.
pub fn stack_grows_down() -> bool {
    *STACK_GROWS_DOWN.get_or_init(probe_stack_direction)
}

#[inline(never)]
fn probe_stack_direction() -> bool {
    let outer: usize = 0;
    inner(&outer as *const usize as usize)
}

#[inline(never)]
fn inner(outer_addr: usize) -> bool {
    let inner: usize = 0;
    let inner_addr = &inner as *const usize as usize;
    inner_addr < outer_addr
}

/// Current stack pointer, approximated as the address of a local in the
/// caller's frame. Used by the jump/COPY engine to measure the live stack
/// interval at `yield` and to validate the stack-position constraint at
/// `step`; callers must not inline this away, so it is marked `#[inline(never)]`.
#[inline(never)]
pub fn approx_stack_pointer() -> usize {
    let probe: usize = 0;
    &probe as *const usize as usize
}
