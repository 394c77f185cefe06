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

//! Stackful, symmetric-resumable coroutines.
//!
//! A caller hands [`State::create`] a function; it gets back an opaque
//! [`State`] that can be [`State::step`]ped from the outside. The
//! function may, from anywhere in its own call chain, call
//! [`Yielder::suspend`] to hand a value back to its stepper and resume
//! later exactly where it left off, with a new value delivered in.
//! Values flow in both directions through this single channel.
//!
//! Three interchangeable [`engine`] back-ends implement the same
//! protocol on top of two [`stack`] placement strategies:
//!
//! - **jump** - a hand-written assembly register swap. Fastest, least
//!   portable, the only engine that also supports the `COPY` strategy.
//! - **context** - the POSIX `ucontext` machine-context primitive.
//! - **thread** - a real OS thread kept in lockstep by a barrier.
//!   Slowest, but entirely safe-Rust and needs no per-target assembly.
//!
//! ```no_run
//! use qlcoro::{Flags, State, StepOutcome, Suspend};
//!
//! let state = State::create(None, Flags::EMPTY, Box::new(|y, v| {
//!     let v = v * 2;
//!     match y.suspend(v) {
//!         Suspend::Resumed(v) => v * 2,
//!         Suspend::Cancelled | Suspend::Error(_) => v,
//!     }
//! }), 0).unwrap();
//!
//! match state.step(1) {
//!     StepOutcome::Yielded(state, v) => {
//!         assert_eq!(v, 2);
//!         match state.step(v) {
//!             StepOutcome::Returned(v) => assert_eq!(v, 4),
//!             _ => unreachable!(),
//!         }
//!     }
//!     _ => unreachable!(),
//! }
//! ```
//!
//! This crate does not provide a scheduler, an event loop, channels, or
//! symmetric coroutine-to-coroutine transfer; it is the switching engine
//! those things would be built on top of, not such a system itself.

pub mod allocator;
pub mod engine;
pub mod error;
pub mod flags;
pub mod pool;
pub mod stack;
pub mod state;
mod sys;
pub mod value;

pub use allocator::{Allocator, SystemAllocator};
pub use error::{CoroError, CoroResult};
pub use flags::Flags;
pub use pool::{Pool, PooledState, PooledStepOutcome};
pub use state::{CoroutineFn, State, StepOutcome, Suspend, Yielder};
pub use value::Value;

/// Ordered list of compiled-in engine names (spec section 6's
/// `engine_list`). Stable across calls.
pub fn engine_list() -> Vec<&'static str> {
    engine::list()
}

/// The flag set a named engine advertises, or the empty set if no
/// compiled-in engine has that name (spec section 6's `engine_flags`).
pub fn engine_flags(name: &str) -> Flags {
    engine::flags_of(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_list_is_stable() {
        assert_eq!(engine_list(), engine_list());
        assert!(engine_list().contains(&"jump"));
        assert!(engine_list().contains(&"context"));
        assert!(engine_list().contains(&"thread"));
    }

    #[test]
    fn unknown_engine_flags_are_empty() {
        assert!(engine_flags("does-not-exist").is_empty());
    }
}
