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

//! Bounded state-buffer pool (spec section 4.5). Grounded in
//! `examples/original_source/examples/libqlsp.c`'s
//! `ql_state_pool_init`/`ql_state_pool_state_new`/`ql_state_pool_free`,
//! renamed to the teacher's own `StackPool`-style naming
//! (`src/stack/stack_pool.rs`) where the two don't conflict.
//!
//! The C original installs `pool_resize`/`pool_free` as each pooled
//! coroutine's own allocator callbacks, closing over the pool's item
//! table, so a coroutine's backing buffer is handed back to the table
//! instead of `free`d when it finishes. [`SharedAllocator`] is the Rust
//! rendering of that shim: every coroutine `new_coroutine` builds shares
//! one [`crate::allocator::Allocator`] behind an `Arc<Mutex<_>>`, and
//! [`State::step_for_pool`]/[`State::cancel_for_pool`] salvage the real
//! `StackStorage` out of a finishing coroutine before it would otherwise
//! drop, so the bytes the allocator handed out are parked in `entries`
//! rather than released back to the system.

use std::sync::{Arc, Mutex};

use crate::allocator::{Allocator, SystemAllocator};
use crate::error::{CoroError, CoroResult};
use crate::flags::Flags;
use crate::stack::StackStorage;
use crate::state::{self, CoroutineFn, PoolRawOutcome, State};
use crate::value::Value;

/// Delegates every call to a shared, lock-protected allocator. Lets one
/// allocator instance's bookkeeping (a custom `create_full`-style hook,
/// or a test's instrumented counter) be observed across every coroutine
/// a [`Pool`] ever constructs, even though each one needs its own owned
/// `Box<dyn Allocator>`.
struct SharedAllocator(Arc<Mutex<Box<dyn Allocator>>>);

impl Allocator for SharedAllocator {
    fn resize(
        &mut self,
        ptr: Option<std::ptr::NonNull<u8>>,
        old_size: usize,
        new_size: usize,
    ) -> Option<std::ptr::NonNull<u8>> {
        self.0
            .lock()
            .expect("pool allocator mutex poisoned")
            .resize(ptr, old_size, new_size)
    }
}

struct Entry {
    state: Option<State>,
    /// The stack salvaged from the last coroutine this slot held, parked
    /// here between uses. `None` for a slot that has never been filled,
    /// or whose occupant is currently running (`state.is_some()`).
    stack: Option<StackStorage>,
    size: usize,
}

impl Entry {
    /// Whether `stack` (if any) can back a request of `kind` without
    /// first being released and replaced. `Native` stacks (thread
    /// engine) are never a match - nothing about them scales with
    /// `size`, and handing one back as a "fit" would just mean
    /// `build_stack` discarding it and allocating nothing in its place.
    fn matches_kind(&self, needs: &state::StackNeeds) -> bool {
        match &self.stack {
            Some(StackStorage::Shift(_)) => needs.shift,
            Some(StackStorage::Copy(_)) => !needs.shift && !needs.native,
            Some(StackStorage::Native) | None => false,
        }
    }
}

struct Inner {
    entries: Vec<Entry>,
    capacity: usize,
    refcount: usize,
    freeable: bool,
    allocator: Arc<Mutex<Box<dyn Allocator>>>,
}

impl Inner {
    fn shared_allocator(&self) -> Box<dyn Allocator> {
        Box::new(SharedAllocator(self.allocator.clone()))
    }

    /// Releases every parked stack still sitting in `entries` through the
    /// pool's allocator, then drops the entries themselves. Called once
    /// the pool is both freeable and has no outstanding coroutines.
    fn clear_entries(&mut self) {
        let mut allocator = self.allocator.lock().expect("pool allocator mutex poisoned");
        for entry in self.entries.drain(..) {
            if let Some(mut stack) = entry.stack {
                stack.release(allocator.as_mut());
            }
        }
    }
}

/// Bounded recycler for coroutine states (spec's `Pool`). Not thread-safe
/// (spec section 5: "the pool is not thread-safe; it serves a single
/// stepper"), so `new_coroutine` takes `&mut self`; the `Arc<Mutex<_>>`
/// inside exists only so that a coroutine drawn from the pool can return
/// its buffer when it finishes, mirroring the C original's
/// "allocator shim closes over the pool" design.
pub struct Pool {
    inner: Arc<Mutex<Inner>>,
}

impl Pool {
    /// Allocates an empty pool with room for up to `capacity` recycled
    /// buffers, backed by the default `mmap`-based allocator.
    pub fn create(capacity: usize) -> Pool {
        Pool::create_full(capacity, Box::new(SystemAllocator))
    }

    /// Same as [`Pool::create`], but with a caller-supplied allocator
    /// (spec section 6's `pool_create_full`) governing every buffer the
    /// pool ever requests or releases.
    pub fn create_full(capacity: usize, allocator: Box<dyn Allocator>) -> Pool {
        Pool {
            inner: Arc::new(Mutex::new(Inner {
                entries: Vec::with_capacity(capacity),
                capacity,
                refcount: 0,
                freeable: false,
                allocator: Arc::new(Mutex::new(allocator)),
            })),
        }
    }

    /// Satisfies a coroutine request from the pool using
    /// largest-fit-then-grow-smallest: reuse the smallest unused,
    /// kind-matching entry that already fits, or grow the largest unused
    /// kind-matching entry up to `size` if nothing fits, or allocate
    /// fresh if the pool has spare capacity. Increments the pool's
    /// reference count on success.
    pub fn new_coroutine(
        &mut self,
        engine: Option<&str>,
        flags: Flags,
        func: CoroutineFn,
        size: usize,
    ) -> CoroResult<PooledState> {
        let needs = state::stack_needs(engine, flags, size)?;
        let mut inner = self.inner.lock().expect("pool mutex poisoned");

        let mut best_fit: Option<usize> = None;
        let mut largest_unused: Option<usize> = None;

        for (i, entry) in inner.entries.iter().enumerate() {
            if entry.state.is_some() || !entry.matches_kind(&needs) {
                continue;
            }
            if entry.size >= needs.size {
                if best_fit.map_or(true, |b| inner.entries[b].size > entry.size) {
                    best_fit = Some(i);
                }
            }
            if largest_unused.map_or(true, |l| inner.entries[l].size < entry.size) {
                largest_unused = Some(i);
            }
        }

        let index = if let Some(i) = best_fit {
            Some(i)
        } else if let Some(i) = largest_unused {
            Some(i)
        } else if inner.entries.len() < inner.capacity {
            inner.entries.push(Entry { state: None, stack: None, size: 0 });
            Some(inner.entries.len() - 1)
        } else {
            // Every slot is occupied by a coroutine of the wrong kind
            // (e.g. the pool has only ever served SHIFT requests and a
            // COPY one just arrived). Evict whichever unused slot holds
            // the most memory rather than fail outright - its buffer is
            // released through the pool's allocator same as any other
            // replacement.
            (0..inner.entries.len())
                .filter(|&i| inner.entries[i].state.is_none())
                .max_by_key(|&i| inner.entries[i].size)
        };

        let index = match index {
            Some(i) => i,
            None => return Err(CoroError::AllocationFailed),
        };

        let kind_matches = inner.entries[index].matches_kind(&needs);
        let reuse = inner.entries[index].stack.take();
        let reuse = match reuse {
            Some(stack) if kind_matches => Some(stack),
            Some(mut stale) => {
                let mut allocator = inner.allocator.lock().expect("pool allocator mutex poisoned");
                stale.release(allocator.as_mut());
                None
            }
            None => None,
        };
        let grown_size = if reuse.is_some() {
            inner.entries[index].size.max(needs.size)
        } else {
            needs.size
        };
        let allocator = inner.shared_allocator();
        drop(inner);

        let state = State::create_internal(engine, flags, func, grown_size, allocator, reuse)?;

        let mut inner = self.inner.lock().expect("pool mutex poisoned");
        inner.entries[index] = Entry { state: Some(state), stack: None, size: grown_size };
        inner.refcount += 1;
        drop(inner);

        Ok(PooledState {
            pool: self.inner.clone(),
            index,
        })
    }

    /// Marks the pool "freeable". If no coroutines are outstanding, the
    /// pool's entries (and whatever buffers they still hold) are
    /// released right away; otherwise the last coroutine to finish
    /// triggers it.
    pub fn free(self) {
        let mut inner = self.inner.lock().expect("pool mutex poisoned");
        inner.freeable = true;
        if inner.refcount == 0 {
            inner.clear_entries();
        }
    }
}

/// Result of [`PooledState::step`] - the pool's counterpart to
/// [`crate::state::StepOutcome`], handing back a `PooledState` (rather than a bare
/// `State`) wherever the coroutine is still resumable.
pub enum PooledStepOutcome {
    Yielded(PooledState, Value),
    Returned(Value),
    Error(PooledState, CoroError),
    Cancelled,
}

/// A coroutine drawn from a [`Pool`]. Behaves like [`State`] for
/// stepping; returns its buffer to the pool (or triggers deferred
/// release) once the body returns or is cancelled, rather than handing
/// it back to the system allocator.
pub struct PooledState {
    pool: Arc<Mutex<Inner>>,
    index: usize,
}

impl PooledState {
    /// Parks `stack` in this coroutine's slot and drops the pool's
    /// refcount, releasing every entry if the pool is freeable and this
    /// was the last outstanding coroutine.
    fn release(&self, stack: StackStorage, size: usize) {
        let mut inner = self.pool.lock().expect("pool mutex poisoned");
        inner.entries[self.index].stack = Some(stack);
        inner.entries[self.index].size = size;
        inner.refcount -= 1;
        if inner.freeable && inner.refcount == 0 {
            inner.clear_entries();
        }
    }

    pub fn step(self, value: Value) -> PooledStepOutcome {
        let state = {
            let mut inner = self.pool.lock().expect("pool mutex poisoned");
            inner.entries[self.index]
                .state
                .take()
                .expect("pooled entry stepped while already running")
        };

        match state.step_for_pool(value) {
            PoolRawOutcome::Yielded(state, v) => {
                let mut inner = self.pool.lock().expect("pool mutex poisoned");
                inner.entries[self.index].state = Some(state);
                drop(inner);
                PooledStepOutcome::Yielded(self, v)
            }
            PoolRawOutcome::Returned(stack, len, v) => {
                self.release(stack, len);
                PooledStepOutcome::Returned(v)
            }
            PoolRawOutcome::Error(state, e) => {
                let mut inner = self.pool.lock().expect("pool mutex poisoned");
                inner.entries[self.index].state = Some(state);
                drop(inner);
                PooledStepOutcome::Error(self, e)
            }
        }
    }

    pub fn cancel(self, resume: bool) {
        let state = {
            let mut inner = self.pool.lock().expect("pool mutex poisoned");
            inner.entries[self.index]
                .state
                .take()
                .expect("pooled entry cancelled while already running")
        };
        let (stack, len) = state.cancel_for_pool(resume);
        self.release(stack, len);
    }
}
