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

//! Engine back-ends and the dispatcher that picks among them (spec
//! sections 4.3/4.4). Every engine is a `&'static dyn Engine`; the
//! dispatch table is a plain `&'static [(name, engine)]` slice built
//! once, the idiomatic substitute for spec's "small, closed, immutable
//! table indexed by name" (REDESIGN FLAGS in SPEC_FULL.md).

pub mod context;
pub mod jump;
pub mod thread;

use crate::error::{CoroError, CoroResult};
use crate::flags::Flags;
use crate::state::{Backend, RawCoroutine, Suspend};
use crate::value::Value;

/// Outcome of one `Engine::step` call, before `State::step` wraps it
/// back up with (or without) the `State` handle.
pub(crate) enum RawStepResult {
    Yielded(Value),
    Returned(Value),
    Error(CoroError),
}

/// One coroutine-switching back-end (spec section 4.3's per-engine
/// vtable: `{size, init, step, yield, cancel}`, plus `name`/`flags` for
/// the dispatcher).
pub trait Engine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Strategy bits this engine supports, plus any side flags
    /// (`RESTORE_SIGMASK`, `THREADED`) it always sets when selected.
    fn flags(&self) -> Flags;

    /// Smallest stack size this engine will accept; `create` clamps up
    /// to this.
    fn min_stack_size(&self) -> usize;

    /// Allocates this engine's (zeroed/default) trailing private block.
    fn new_backend(&self) -> Backend;

    /// One-time setup run once at construction, before the coroutine is
    /// ever stepped.
    fn init(&self, raw: &mut RawCoroutine) -> CoroResult<()>;

    /// Advances the coroutine: first call enters `func`, later calls
    /// resume at the last `suspend`.
    fn step(&self, raw: &mut RawCoroutine, value: Value) -> RawStepResult;

    /// Called from *inside* the running coroutine body via [`crate::state::Yielder`].
    fn suspend(&self, raw: &mut RawCoroutine, value: Value) -> Suspend;

    /// Cancels the coroutine, optionally resuming it one last time so it
    /// observes [`Suspend::Cancelled`] and can unwind cleanly.
    fn cancel(&self, raw: &mut RawCoroutine, resume: bool);
}

/// Build-time ordered table of compiled-in engines. Order matters: it is
/// both `engine_list`'s return order and the order `select` searches
/// when no name is given.
fn table() -> &'static [(&'static str, &'static dyn Engine)] {
    &[
        ("jump", &jump::JumpEngine),
        ("context", &context::ContextEngine),
        ("thread", &thread::ThreadEngine),
    ]
}

/// Ordered list of compiled-in engine names. Stable across calls (spec
/// section 8's "idempotent engine-list").
pub fn list() -> Vec<&'static str> {
    table().iter().map(|&(name, _)| name).collect()
}

/// The flag set a named engine advertises, or the empty set if no
/// compiled-in engine has that name.
pub fn flags_of(name: &str) -> Flags {
    table()
        .iter()
        .find(|&&(n, _)| n == name)
        .map(|&(_, e)| e.flags())
        .unwrap_or(Flags::EMPTY)
}

/// Selection rule (spec section 4.4): if `name` is given, only that
/// engine qualifies; otherwise the first engine whose flags are a
/// superset of `requested`. `COPY` is dropped in favor of `SHIFT` if a
/// caller asks for both (spec section 4.1).
pub(crate) fn select(name: Option<&str>, requested: Flags) -> CoroResult<&'static dyn Engine> {
    let requested = if requested.contains(Flags::METHOD_COPY | Flags::METHOD_SHIFT) {
        requested.without(Flags::METHOD_COPY)
    } else {
        requested
    };

    let found = match name {
        Some(name) => table().iter().find(|&&(n, _)| n == name).map(|&(_, e)| e),
        None => table()
            .iter()
            .find(|&&(_, e)| e.flags().contains(requested))
            .map(|&(_, e)| e),
    };

    found.ok_or(CoroError::NoMatchingEngine)
}

/// If the caller requested no stack strategy at all, substitutes the
/// selected engine's preferred one (`SHIFT` if supported, else `COPY`);
/// otherwise passes the requested flags through unchanged.
pub(crate) fn resolve_flags(engine: &'static dyn Engine, requested: Flags) -> Flags {
    let mut resolved = if requested.strategy().is_empty() {
        let preferred = if engine.flags().contains(Flags::METHOD_SHIFT) {
            Flags::METHOD_SHIFT
        } else {
            Flags::METHOD_COPY
        };
        requested | preferred
    } else {
        requested
    };
    // `THREADED` is inherent to whichever engine was selected, not a
    // caller-requested bit; fold it in so `State`'s effective flags
    // always reflect what is actually backing the coroutine.
    if engine.flags().contains(Flags::THREADED) {
        resolved |= Flags::THREADED;
    }
    resolved
}
