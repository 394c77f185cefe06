//! Allocator callback surface (spec section 6: "out of scope, mention only
//! their contracts"). `State::create` uses [`SystemAllocator`]; `create_full`
//! and the [`crate::pool::Pool`] shim plug in their own.

use std::ptr;

use crate::sys;

/// `resize(ptr, old_size, new_size) -> new_ptr`. `ptr` is `None` for a
/// fresh allocation; `new_size == 0` means free. Mirrors spec section 6's
/// `resize(ctx, ptr, new_size) -> new_ptr` with the `ctx` folded into
/// `self` (the idiomatic replacement for a C `void*` context pointer) and
/// the freestanding `free` callback as a default `resize(.., 0)`.
///
/// Both stack strategies route their backing memory through this trait
/// (`stack::shift::ShiftStack::new`/`release`, `stack::copy::CopyStack::capture`/
/// `release`), so a caller-supplied allocator actually governs what backs a
/// `State` built via `create_full`, rather than being stored and ignored.
pub trait Allocator: Send {
    fn resize(&mut self, ptr: Option<ptr::NonNull<u8>>, old_size: usize, new_size: usize)
        -> Option<ptr::NonNull<u8>>;
}

/// The default allocator: `mmap`/`mremap`/`munmap`-backed, used whenever a
/// caller goes through `State::create` instead of `create_full`, and
/// internally by [`crate::pool::Pool`].
///
/// Unlike a `std::alloc`-backed wrapper, every region this hands out is its
/// own page-aligned mapping - `stack::shift::ShiftStack` depends on that to
/// carve a guard page out of it with `mprotect`. Rounding every request up
/// to whole pages costs a little against `CopyStack`'s typically-small
/// snapshot buffers, but keeps one `Allocator` contract serving both stack
/// strategies instead of splitting the trait in two.
pub struct SystemAllocator;

impl SystemAllocator {
    fn mapped_len(size: usize) -> usize {
        sys::align_to_page(size, true).max(sys::page_size())
    }
}

impl Allocator for SystemAllocator {
    fn resize(
        &mut self,
        ptr: Option<ptr::NonNull<u8>>,
        old_size: usize,
        new_size: usize,
    ) -> Option<ptr::NonNull<u8>> {
        unsafe {
            match (ptr, new_size) {
                (None, 0) => None,
                (None, _) => {
                    let len = Self::mapped_len(new_size);
                    let raw = libc::mmap(
                        ptr::null_mut(),
                        len,
                        libc::PROT_READ | libc::PROT_WRITE,
                        libc::MAP_PRIVATE | libc::MAP_ANON,
                        -1,
                        0,
                    );
                    if raw == libc::MAP_FAILED {
                        None
                    } else {
                        ptr::NonNull::new(raw as *mut u8)
                    }
                }
                (Some(p), 0) => {
                    let len = Self::mapped_len(old_size);
                    libc::munmap(p.as_ptr() as *mut libc::c_void, len);
                    None
                }
                (Some(p), _) => {
                    let old_len = Self::mapped_len(old_size);
                    let new_len = Self::mapped_len(new_size);
                    if old_len == new_len {
                        return Some(p);
                    }

                    #[cfg(target_os = "linux")]
                    {
                        let raw = libc::mremap(
                            p.as_ptr() as *mut libc::c_void,
                            old_len,
                            new_len,
                            libc::MREMAP_MAYMOVE,
                        );
                        if raw == libc::MAP_FAILED {
                            None
                        } else {
                            ptr::NonNull::new(raw as *mut u8)
                        }
                    }
                    #[cfg(not(target_os = "linux"))]
                    {
                        // No `mremap` outside Linux: map a fresh region,
                        // copy the live prefix over, unmap the old one.
                        let raw = libc::mmap(
                            ptr::null_mut(),
                            new_len,
                            libc::PROT_READ | libc::PROT_WRITE,
                            libc::MAP_PRIVATE | libc::MAP_ANON,
                            -1,
                            0,
                        );
                        if raw == libc::MAP_FAILED {
                            return None;
                        }
                        std::ptr::copy_nonoverlapping(
                            p.as_ptr(),
                            raw as *mut u8,
                            old_len.min(new_len),
                        );
                        libc::munmap(p.as_ptr() as *mut libc::c_void, old_len);
                        ptr::NonNull::new(raw as *mut u8)
                    }
                }
            }
        }
    }
}
