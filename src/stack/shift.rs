// The MIT License (MIT)
// Copyright (c) 2015 Rustcc Developers
//
// Permission is hereby granted, free of charge, to any person obtaining a
// copy of this software and associated documentation files (the "Software"),
// to deal in the Software without restriction, including without limitation
// the rights to use, copy, modify, merge, publish, distribute, sublicense,
// and/or sell copies of the Software, and to permit persons to whom the
// Software is furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS
// OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
// FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
// DEALINGS IN THE SOFTWARE.

//! `SHIFT` stack strategy: a page-aligned, private, guard-paged region
//! the coroutine runs on directly. Grounded in the teacher's
//! `stack::stack_protected::Stack`, ported from the `mmap` crate to the
//! crate's own [`crate::allocator::Allocator`] (the `mmap` crate has not
//! been touched since 2015, and routing through `Allocator` is what lets
//! `create_full`'s caller-supplied allocator - and `Pool`'s recycling shim -
//! actually govern the stack's backing memory rather than just its size).

use std::fmt;
use std::ptr;

use crate::allocator::Allocator;
use crate::sys;

/// Minimum `SHIFT` stack size: four pages, matching spec section 3's
/// "four pages is typical" guidance.
pub fn minimum_size() -> usize {
    sys::page_size() * 4
}

pub struct ShiftStack {
    base: *mut u8,
    len: usize,
}

unsafe impl Send for ShiftStack {}

impl ShiftStack {
    /// Requests a fresh `size`-byte region (rounded up to a whole number of
    /// pages) from `allocator` and protects the page at the end the stack
    /// grows toward, so an overflow faults instead of silently corrupting a
    /// neighboring allocation.
    pub fn new(allocator: &mut dyn Allocator, size: usize) -> Option<ShiftStack> {
        let page = sys::page_size();
        let len = sys::align_to_page(size.max(minimum_size()), true) + page;

        let base = allocator.resize(None, 0, len)?.as_ptr();

        let guard_page = if sys::stack_grows_down() {
            base
        } else {
            unsafe { base.add(len - page) }
        };
        let protected = unsafe {
            libc::mprotect(guard_page as *mut libc::c_void, page, libc::PROT_NONE)
        };
        if protected != 0 {
            allocator.resize(ptr::NonNull::new(base), len, 0);
            return None;
        }

        Some(ShiftStack { base, len })
    }

    /// Low address of the mapped region (inclusive of the guard page).
    pub fn base(&self) -> *mut u8 {
        self.base
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// The address the engine should install as the initial stack
    /// pointer: the end of the mapping if the stack grows down, the
    /// start if it grows up.
    pub fn top(&self) -> *mut u8 {
        unsafe {
            if sys::stack_grows_down() {
                self.base.add(self.len)
            } else {
                self.base
            }
        }
    }

    /// Releases the mapping through `allocator`, which must be the same
    /// kind of allocator that produced it (see `RawCoroutine::drop` and
    /// `Pool`'s entry-eviction path, the two callers of this). Safe to
    /// call more than once; a no-op once already released.
    pub fn release(&mut self, allocator: &mut dyn Allocator) {
        if let Some(p) = ptr::NonNull::new(self.base) {
            allocator.resize(Some(p), self.len, 0);
        }
        self.base = ptr::null_mut();
        self.len = 0;
    }
}

impl Drop for ShiftStack {
    fn drop(&mut self) {
        // Safety net: every ordinary teardown path calls `release` through
        // the owning allocator first, which already nulls `base`. This
        // only fires if that was skipped (e.g. a panic unwinding through a
        // path that forgot to); `munmap` is always a valid way to tear
        // this down since `ShiftStack` is only ever constructed from an
        // `mmap`-backed region.
        if !self.base.is_null() {
            unsafe {
                libc::munmap(self.base as *mut libc::c_void, self.len);
            }
        }
    }
}

impl fmt::Debug for ShiftStack {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ShiftStack {{ base: {:p}, len: {:#x} }}", self.base, self.len)
    }
}
