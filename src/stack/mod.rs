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

//! The two stack-placement strategies (spec section 4.2). `shift` and
//! `copy` are siblings, not a shared trait: the engines that support
//! each one drive them with entirely different call sequences (`shift`
//! is installed once and never touched again; `copy` is captured and
//! reinstalled on every switch), so a shared abstraction would just be
//! an extra indirection with one implementor on each side.

pub mod copy;
pub mod shift;

pub use copy::CopyStack;
pub use shift::ShiftStack;

/// Which of the two strategies a given `State` was constructed with.
/// Exactly one bit of [`crate::flags::Flags`] maps onto this at any time
/// (spec section 3's "exactly one stack strategy bit set" invariant).
pub enum StackStorage {
    Shift(ShiftStack),
    Copy(CopyStack),
    /// The thread engine's coroutine runs on a stack the OS allocates for
    /// it (`std::thread::Builder::stack_size`), not one this crate maps
    /// itself; this variant avoids mmap'ing a `ShiftStack` nobody reads.
    Native,
}

impl StackStorage {
    pub fn as_shift(&self) -> Option<&ShiftStack> {
        match self {
            StackStorage::Shift(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_copy_mut(&mut self) -> Option<&mut CopyStack> {
        match self {
            StackStorage::Copy(c) => Some(c),
            _ => None,
        }
    }

    /// Size of the memory currently backing this stack, as far as the
    /// governing allocator is concerned. Used by `Pool` to track the
    /// largest buffer ever handed to a slot.
    pub fn backing_len(&self) -> usize {
        match self {
            StackStorage::Shift(s) => s.len(),
            StackStorage::Copy(c) => c.capacity(),
            StackStorage::Native => 0,
        }
    }

    /// Releases whatever memory this stack owns through `allocator`.
    /// `Native` owns nothing of this crate's and is a no-op.
    pub fn release(&mut self, allocator: &mut dyn crate::allocator::Allocator) {
        match self {
            StackStorage::Shift(s) => s.release(allocator),
            StackStorage::Copy(c) => c.release(allocator),
            StackStorage::Native => {}
        }
    }
}
