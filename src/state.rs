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

//! The coroutine's opaque handle (spec section 3) and the engine-independent
//! protocol that drives it (spec section 4.1).

use std::marker::PhantomData;

use crate::allocator::{Allocator, SystemAllocator};
use crate::engine::{self, Engine, RawStepResult};
use crate::error::{CoroError, CoroResult};
use crate::flags::Flags;
use crate::stack::{CopyStack, ShiftStack, StackStorage};
use crate::value::Value;

/// A coroutine body. Takes the value delivered by the `step` that entered
/// or resumed it and a handle through which it may `yield`; returns the
/// value delivered to the stepper on final return. This is the Rust
/// rendering of spec's `qlFunction(qlParameter*)` plus the implicit
/// `ctx` every C callback carries — here that's whatever the closure
/// captures.
pub type CoroutineFn = Box<dyn FnOnce(&mut Yielder, Value) -> Value + Send>;

/// The engine-private trailing block (spec section 3: "trailing
/// engine-private block: jump buffers, saved stack pointers, OS machine
/// context, thread handle, barrier, etc."), one variant per engine.
pub(crate) enum Backend {
    Jump(crate::engine::jump::JumpRegs),
    Context(crate::engine::context::ContextRegs),
    Thread(crate::engine::thread::ThreadHandle),
}

/// The non-opaque heart of [`State`]. Split out from `State` itself so
/// that engines can take `&mut RawCoroutine` without also holding the
/// outer `Box`, which matters once a coroutine is mid-switch and its
/// `State` has been logically handed off to the running side.
pub(crate) struct RawCoroutine {
    pub engine: &'static dyn Engine,
    pub flags: Flags,
    pub func: Option<CoroutineFn>,
    pub stack: StackStorage,
    pub backend: Backend,
    pub allocator: Box<dyn Allocator>,
    pub size: usize,
    pub started: bool,
    pub cancelled: bool,
}

impl Drop for RawCoroutine {
    fn drop(&mut self) {
        // The stack owns memory obtained from `allocator` (see
        // `stack::shift`/`stack::copy`); release it through the same
        // allocator before the fields drop for real, so a custom
        // `create_full` allocator sees every free it should. The backend
        // (thread handle, ucontext buffer, jump registers) releases its
        // own OS resources independently.
        self.stack.release(self.allocator.as_mut());
    }
}

/// The handle passed to a running coroutine body, through which it calls
/// `yield`. Kept distinct from `State` (spec's single `qlState*` split
/// into an outside and inside view, matching `willglynn-tinycoro`'s
/// `Handle`/`Coroutine` split).
pub struct Yielder<'a> {
    raw: *mut RawCoroutine,
    _marker: PhantomData<&'a mut RawCoroutine>,
}

impl<'a> Yielder<'a> {
    pub(crate) fn new(raw: *mut RawCoroutine) -> Yielder<'a> {
        Yielder { raw, _marker: PhantomData }
    }

    /// Suspends the calling coroutine, handing `value` out to the
    /// stepper and returning whatever the next `step` delivers, or
    /// [`Suspend::Cancelled`] if the coroutine has been told to unwind.
    pub fn suspend(&mut self, value: Value) -> Suspend {
        let raw = unsafe { &mut *self.raw };
        raw.engine.suspend(raw, value)
    }

    /// True once `cancel(resume = true)` has been issued; a body that
    /// observes this should unwind and return promptly rather than
    /// calling `suspend` again (though `suspend` will keep answering
    /// `Cancelled` if it does).
    pub fn is_cancelled(&self) -> bool {
        unsafe { (*self.raw).cancelled }
    }
}

/// Result of a `Yielder::suspend` call.
pub enum Suspend {
    /// The coroutine was stepped again with this value.
    Resumed(Value),
    /// `cancel(resume = true)` was issued; the body must release its
    /// resources and return.
    Cancelled,
    /// `COPY` only: the snapshot buffer needed to grow to hold the live
    /// stack interval and the allocator refused. The coroutine was never
    /// actually suspended - it is still running on the same stack depth
    /// it called `suspend` from, and may retry (spec section 7: "the
    /// state remains valid").
    Error(CoroError),
}

/// Result of [`State::step`]. `Yielded` and `Error` hand `State` back so
/// a suspended or retryable coroutine cannot be stepped again at the
/// type level once it has actually finished (spec's "handle nulled").
pub enum StepOutcome {
    Yielded(State, Value),
    Returned(Value),
    Error(State, CoroError),
    Cancelled,
}

/// The opaque handle for one coroutine (spec section 3's `State`).
pub struct State {
    pub(crate) raw: Box<RawCoroutine>,
}

impl State {
    /// Creates a coroutine using the default system allocator. See
    /// [`State::create_full`] for the general form.
    pub fn create(
        engine: Option<&str>,
        flags: Flags,
        func: CoroutineFn,
        size: usize,
    ) -> CoroResult<State> {
        State::create_full(engine, flags, func, size, Box::new(SystemAllocator))
    }

    /// Creates a coroutine with a caller-supplied allocator (spec's
    /// `state_create_full`). Picks an engine (by name if given, else by
    /// flag superset; `COPY` is dropped in favor of `SHIFT` if both are
    /// requested; an engine's preferred strategy is used if neither is
    /// requested), constructs the backing stack, and runs the engine's
    /// one-time `init`.
    pub fn create_full(
        engine: Option<&str>,
        flags: Flags,
        func: CoroutineFn,
        size: usize,
        allocator: Box<dyn Allocator>,
    ) -> CoroResult<State> {
        State::create_internal(engine, flags, func, size, allocator, None)
    }

    /// Shared construction path for [`State::create_full`] and
    /// [`crate::pool::Pool::new_coroutine`]. `reuse`, if given, is a
    /// previously-built stack the caller wants adopted instead of
    /// allocating fresh (the pool's buffer-recycling discipline); it is
    /// used only when its kind matches what the resolved flags need and
    /// it is already large enough, and released back through `allocator`
    /// otherwise.
    pub(crate) fn create_internal(
        engine: Option<&str>,
        flags: Flags,
        func: CoroutineFn,
        size: usize,
        mut allocator: Box<dyn Allocator>,
        reuse: Option<StackStorage>,
    ) -> CoroResult<State> {
        let eng = engine::select(engine, flags)?;
        let resolved = engine::resolve_flags(eng, flags);
        let clamped_size = size.max(eng.min_stack_size());

        let stack = build_stack(eng, resolved, clamped_size, allocator.as_mut(), reuse)?;
        let backend = eng.new_backend();

        let mut raw = Box::new(RawCoroutine {
            engine: eng,
            flags: resolved,
            func: Some(func),
            stack,
            backend,
            allocator,
            size: clamped_size,
            started: false,
            cancelled: false,
        });

        eng.init(&mut raw)?;
        log::debug!(
            "qlcoro: created state engine={} flags={:?} size={:#x}",
            eng.name(),
            resolved,
            clamped_size
        );
        Ok(State { raw })
    }

    /// Advances the coroutine: enters `func` on the first call, resumes
    /// at the last `yield` on subsequent calls.
    pub fn step(mut self, value: Value) -> StepOutcome {
        match self.raw.engine.step(&mut self.raw, value) {
            RawStepResult::Yielded(v) => StepOutcome::Yielded(self, v),
            RawStepResult::Returned(v) => {
                log::trace!("qlcoro: coroutine returned");
                StepOutcome::Returned(v)
            }
            RawStepResult::Error(e) => StepOutcome::Error(self, e),
        }
    }

    /// Cancels the coroutine. If `resume`, steps it one last time so its
    /// next (and every subsequent) `yield` observes
    /// [`Suspend::Cancelled`], expecting it to unwind and return
    /// promptly. If not, destroys the state without resuming it at all
    /// (the caller promises no owned resources are left live below the
    /// current suspension point).
    pub fn cancel(mut self, resume: bool) {
        self.raw.cancelled = true;
        self.raw.engine.cancel(&mut self.raw, resume);
    }

    /// Size of the memory currently backing this coroutine's stack.
    pub(crate) fn backing_len(&self) -> usize {
        self.raw.stack.backing_len()
    }

    /// [`State::step`], but for a coroutine drawn from a [`crate::pool::Pool`]:
    /// a `Returned` outcome salvages the stack out of the otherwise-dropped
    /// `RawCoroutine` instead of releasing it, so the pool can park it for
    /// reuse.
    pub(crate) fn step_for_pool(mut self, value: Value) -> PoolRawOutcome {
        match self.raw.engine.step(&mut self.raw, value) {
            RawStepResult::Yielded(v) => PoolRawOutcome::Yielded(self, v),
            RawStepResult::Returned(v) => {
                log::trace!("qlcoro: pooled coroutine returned");
                let stack = std::mem::replace(&mut self.raw.stack, StackStorage::Native);
                let len = stack.backing_len();
                PoolRawOutcome::Returned(stack, len, v)
            }
            RawStepResult::Error(e) => PoolRawOutcome::Error(self, e),
        }
    }

    /// [`State::cancel`], but for a pooled coroutine: always salvages the
    /// stack regardless of `resume`, since cancellation is always a
    /// terminal transition from the pool's point of view.
    pub(crate) fn cancel_for_pool(mut self, resume: bool) -> (StackStorage, usize) {
        self.raw.cancelled = true;
        self.raw.engine.cancel(&mut self.raw, resume);
        let stack = std::mem::replace(&mut self.raw.stack, StackStorage::Native);
        let len = stack.backing_len();
        (stack, len)
    }
}

/// Result of [`State::step_for_pool`]; the pool's counterpart to
/// [`StepOutcome`] that hands back the raw stack (rather than a `State`)
/// on a terminal `Returned` outcome so it can be parked for reuse.
pub(crate) enum PoolRawOutcome {
    Yielded(State, Value),
    Returned(StackStorage, usize, Value),
    Error(State, CoroError),
}

/// What kind of stack a given `(engine, flags, size)` combination needs,
/// without actually constructing anything - used by [`crate::pool::Pool`]
/// to pick a size- and kind-matching parked entry before calling
/// [`State::create_internal`].
pub(crate) struct StackNeeds {
    pub native: bool,
    pub shift: bool,
    pub size: usize,
}

pub(crate) fn stack_needs(engine: Option<&str>, flags: Flags, size: usize) -> CoroResult<StackNeeds> {
    let eng = engine::select(engine, flags)?;
    let resolved = engine::resolve_flags(eng, flags);
    Ok(StackNeeds {
        native: eng.flags().contains(Flags::THREADED),
        shift: resolved.contains(Flags::METHOD_SHIFT),
        size: size.max(eng.min_stack_size()),
    })
}

/// Builds the stack a freshly-selected engine needs, adopting `reuse` in
/// place when its kind matches and it is already large enough, releasing
/// it through `allocator` and allocating fresh otherwise.
fn build_stack(
    eng: &'static dyn Engine,
    flags: Flags,
    size: usize,
    allocator: &mut dyn Allocator,
    reuse: Option<StackStorage>,
) -> CoroResult<StackStorage> {
    if eng.flags().contains(Flags::THREADED) {
        if let Some(mut stale) = reuse {
            stale.release(allocator);
        }
        return Ok(StackStorage::Native);
    }

    if flags.contains(Flags::METHOD_SHIFT) {
        match reuse {
            Some(StackStorage::Shift(s)) if s.len() >= size => Ok(StackStorage::Shift(s)),
            Some(mut stale) => {
                stale.release(allocator);
                Ok(StackStorage::Shift(
                    ShiftStack::new(allocator, size).ok_or(CoroError::AllocationFailed)?,
                ))
            }
            None => Ok(StackStorage::Shift(
                ShiftStack::new(allocator, size).ok_or(CoroError::AllocationFailed)?,
            )),
        }
    } else {
        match reuse {
            Some(StackStorage::Copy(c)) => Ok(StackStorage::Copy(c)),
            Some(mut stale) => {
                stale.release(allocator);
                Ok(StackStorage::Copy(CopyStack::new()))
            }
            None => Ok(StackStorage::Copy(CopyStack::new())),
        }
    }
}
