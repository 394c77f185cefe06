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

//! Context engine (spec section 4.3): swaps the whole CPU/machine
//! context via the POSIX `ucontext` family instead of a hand-written
//! assembly primitive. `swapcontext` already captures "enough state to
//! resume later" (including the program counter), so unlike the jump
//! engine there is no separate trampoline re-entry path for `yield`:
//! the same `swapcontext` call that suspends the coroutine is the one
//! that later resumes it, mid-function. Grounded in
//! `examples/willglynn-tinycoro/src/ucontext/mod.rs` and
//! `examples/original_source/src/libql-ucontext.c`.

use crate::error::CoroResult;
use crate::flags::Flags;
use crate::state::{Backend, RawCoroutine, Suspend, Yielder};
use crate::value::Value;

use super::{Engine, RawStepResult};

pub(crate) struct ContextRegs {
    own: libc::ucontext_t,
    caller: libc::ucontext_t,
    value: Value,
    finished: bool,
}

impl ContextRegs {
    fn zeroed() -> ContextRegs {
        unsafe {
            ContextRegs {
                own: std::mem::zeroed(),
                caller: std::mem::zeroed(),
                value: 0,
                finished: false,
            }
        }
    }
}

fn regs(raw: &mut RawCoroutine) -> &mut ContextRegs {
    match &mut raw.backend {
        Backend::Context(r) => r,
        _ => unreachable!("context engine invoked on a non-context backend"),
    }
}

/// The `ucontext_t*` pointer passed to `makecontext` must be reassembled
/// from integer arguments at entry (spec 4.3: "the `State*` pointer is
/// split across several integer arguments"); on a 64-bit target two
/// `u32`s round-trip a `usize` exactly.
extern "C" fn trampoline(hi: u32, lo: u32) {
    let ptr = ((hi as usize) << 32) | (lo as usize);
    let raw = unsafe { &mut *(ptr as *mut RawCoroutine) };

    let func = raw
        .func
        .take()
        .expect("context engine body entered more than once");
    let initial = regs(raw).value;

    let mut yielder = Yielder::new(raw as *mut RawCoroutine);
    let result = func(&mut yielder, initial);

    let r = regs(raw);
    r.value = result;
    r.finished = true;

    unsafe {
        libc::swapcontext(&mut r.own, &r.caller);
    }
    unreachable!("context engine trampoline resumed after reporting completion");
}

pub struct ContextEngine;

impl Engine for ContextEngine {
    fn name(&self) -> &'static str {
        "context"
    }

    fn flags(&self) -> Flags {
        Flags::METHOD_SHIFT
    }

    fn min_stack_size(&self) -> usize {
        crate::stack::shift::minimum_size()
    }

    fn new_backend(&self) -> Backend {
        Backend::Context(ContextRegs::zeroed())
    }

    fn init(&self, _raw: &mut RawCoroutine) -> CoroResult<()> {
        // `makecontext`/`getcontext` run lazily on first `step`, once the
        // caller-visible `State` (and therefore a stable address for the
        // `RawCoroutine`) exists; nothing to do up front.
        Ok(())
    }

    fn step(&self, raw: &mut RawCoroutine, value: Value) -> RawStepResult {
        if !raw.started {
            raw.started = true;
            let stack = raw
                .stack
                .as_shift()
                .expect("context engine requires a SHIFT stack");
            let stack_base = stack.base();
            let stack_len = stack.len();

            let raw_addr = raw as *mut RawCoroutine as usize;
            let hi = (raw_addr >> 32) as u32;
            let lo = (raw_addr & 0xffff_ffff) as u32;

            let r = regs(raw);
            r.value = value;
            unsafe {
                libc::getcontext(&mut r.own);
                r.own.uc_stack.ss_sp = stack_base as *mut libc::c_void;
                r.own.uc_stack.ss_size = stack_len;
                r.own.uc_link = std::ptr::null_mut();
                libc::makecontext(
                    &mut r.own,
                    std::mem::transmute::<extern "C" fn(u32, u32), extern "C" fn()>(trampoline),
                    2,
                    hi,
                    lo,
                );
                libc::swapcontext(&mut r.caller, &r.own);
            }
        } else {
            regs(raw).value = value;
            unsafe {
                let r = regs(raw) as *mut ContextRegs;
                libc::swapcontext(&mut (*r).caller, &(*r).own);
            }
        }

        let r = regs(raw);
        if r.finished {
            RawStepResult::Returned(r.value)
        } else {
            RawStepResult::Yielded(r.value)
        }
    }

    fn suspend(&self, raw: &mut RawCoroutine, value: Value) -> Suspend {
        regs(raw).value = value;
        unsafe {
            let r = regs(raw) as *mut ContextRegs;
            libc::swapcontext(&mut (*r).own, &(*r).caller);
        }
        if raw.cancelled {
            Suspend::Cancelled
        } else {
            Suspend::Resumed(regs(raw).value)
        }
    }

    fn cancel(&self, raw: &mut RawCoroutine, resume: bool) {
        if resume {
            let _ = self.step(raw, 0);
        }
        // `resume = false`: the coroutine's stack is simply torn down
        // with the `ShiftStack`'s `Drop` impl once `State` is dropped;
        // there is no OS resource here beyond the mapped memory.
    }
}
