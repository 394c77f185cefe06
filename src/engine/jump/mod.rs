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

//! Jump engine (spec section 4.3): a hand-written assembly primitive
//! (`src/engine/jump/asm`) saves/restores the callee-saved registers and
//! the stack pointer directly, the fastest and least portable of the
//! three. The only engine that supports `COPY` as well as `SHIFT`.
//!
//! Grounded in `examples/haraldh-frenetic/src/lib.rs` (`jump_into`/
//! `jump_swap`/`jump_init` naming and the `Context<parent, child>` split)
//! and `examples/other_examples/..generator-rs..src-detail-x86_64_unix.rs.rs`
//! (the single-field `Registers { sp: usize }` design this crate's
//! assembly shim implements).

use crate::error::{CoroError, CoroResult};
use crate::flags::Flags;
use crate::state::{Backend, RawCoroutine, Suspend, Yielder};
use crate::sys;
use crate::value::Value;

use super::{Engine, RawStepResult};

#[cfg(qlcoro_jump_asm)]
extern "C" {
    fn qlco_jump_swap(out_sp: *mut usize, into_sp: *const usize, arg: usize) -> usize;
    fn qlco_trampoline();
}

pub(crate) struct JumpRegs {
    /// Coroutine's saved stack pointer while it is suspended (or, before
    /// the first step, the bootstrap frame built in `bootstrap`).
    sp: usize,
    /// Stepper's saved stack pointer while the coroutine is running.
    caller_sp: usize,
    value: Value,
    finished: bool,
}

impl JumpRegs {
    fn new() -> JumpRegs {
        JumpRegs { sp: 0, caller_sp: 0, value: 0, finished: false }
    }
}

fn regs(raw: &mut RawCoroutine) -> &mut JumpRegs {
    match &mut raw.backend {
        Backend::Jump(r) => r,
        _ => unreachable!("jump engine invoked on a non-jump backend"),
    }
}

extern "C" fn trampoline_entry(arg: usize) -> ! {
    let raw = unsafe { &mut *(arg as *mut RawCoroutine) };

    let func = raw
        .func
        .take()
        .expect("jump engine body entered more than once");
    let initial = regs(raw).value;

    let mut yielder = Yielder::new(raw as *mut RawCoroutine);
    let result = func(&mut yielder, initial);

    let r = regs(raw);
    r.value = result;
    r.finished = true;

    #[cfg(qlcoro_jump_asm)]
    unsafe {
        qlco_jump_swap(&mut r.sp, &r.caller_sp, 0);
    }
    unreachable!("jump engine trampoline resumed after reporting completion");
}

/// Writes the initial stack frame `qlco_jump_swap` expects to "resume"
/// into, landing on `qlco_trampoline`. Each architecture's `.S` file
/// saves/restores a different register set, so the frame layout is
/// architecture-specific; both variants stash the coroutine's argument
/// and the Rust entry function's address in the two slots the landing
/// pad reads (r12/r13 on x86_64, x19/x20 on aarch64) and leave the rest
/// zeroed - they are real callee-saved registers, but the trampoline
/// never reads them, and the coroutine body establishes its own values
/// for them on entry.
#[cfg(all(qlcoro_jump_asm, target_arch = "x86_64"))]
fn bootstrap(stack_top: *mut u8, raw_ptr: usize) -> usize {
    // Six callee-saved-register slots (low to high address: r15, r14,
    // r13, r12, rbx, rbp) followed by a return address, matching the
    // push order in `asm/x86_64_sysv.S`'s `qlco_jump_swap`.
    const SLOTS: usize = 7; // 6 callee-saved + return address
    let aligned_top = (stack_top as usize & !0xf) - 8;
    let sp_base = aligned_top - SLOTS * std::mem::size_of::<usize>();

    unsafe {
        let frame = sp_base as *mut usize;
        frame.add(0).write(0); // r15 (unused)
        frame.add(1).write(0); // r14 (unused)
        frame.add(2).write(trampoline_entry as usize); // r13: entry fn
        frame.add(3).write(raw_ptr); // r12: argument
        frame.add(4).write(0); // rbx (unused)
        frame.add(5).write(0); // rbp (unused)
        frame.add(6).write(qlco_trampoline as usize); // return address
    }

    sp_base
}

/// aarch64 counterpart of the x86_64 `bootstrap` above. `asm/aarch64_aapcs.S`'s
/// `qlco_jump_swap` saves/restores a 160-byte frame (x19-x28, fp/x29,
/// lr/x30, d8-d15), so the bootstrap frame must be the same size and
/// layout: x19 carries the argument, x20 the entry function (the
/// landing pad's `mov x0, x19` / `br x20`), and lr/x30 is the address
/// `qlco_jump_swap`'s final `ret` jumps to.
#[cfg(all(qlcoro_jump_asm, target_arch = "aarch64"))]
fn bootstrap(stack_top: *mut u8, raw_ptr: usize) -> usize {
    const FRAME_SLOTS: usize = 20; // 12 GP (x19-x29,lr) + 8 FP (d8-d15), 8 bytes each
    let aligned_top = stack_top as usize & !0xf;
    let sp_base = aligned_top - FRAME_SLOTS * std::mem::size_of::<usize>();

    unsafe {
        let frame = sp_base as *mut usize;
        frame.add(0).write(raw_ptr); // x19: argument
        frame.add(1).write(trampoline_entry as usize); // x20: entry fn
        for i in 2..11 {
            frame.add(i).write(0); // x21-x28, x29/fp (unused)
        }
        frame.add(11).write(qlco_trampoline as usize); // x30/lr
        for i in 12..FRAME_SLOTS {
            frame.add(i).write(0); // d8-d15 (unused)
        }
    }

    sp_base
}

/// Computes the "fresh" stack-top address `COPY` bootstraps onto: a
/// page below (or, on an up-growing stack, above) `current`, aligned to
/// the page grid. Grounded in `libql-assembly.c`'s `assembly_step`,
/// which carves the coroutine's initial frame out of the caller's own
/// stack the same way - one page further in the growth direction,
/// rounded to a page boundary - rather than installing a private
/// mapping. The margin exists so the bootstrap frame and everything the
/// coroutine body later pushes stays clear of the live frames above
/// `current` (this call's own stack, which must remain intact while the
/// coroutine runs and the stepper is suspended).
#[cfg(qlcoro_jump_asm)]
fn copy_virtual_top(current: usize) -> usize {
    let page = sys::page_size();
    if sys::stack_grows_down() {
        sys::align_to_page(current, false).saturating_sub(page)
    } else {
        sys::align_to_page(current, true) + page
    }
}

pub struct JumpEngine;

impl Engine for JumpEngine {
    fn name(&self) -> &'static str {
        "jump"
    }

    fn flags(&self) -> Flags {
        Flags::METHOD_SHIFT | Flags::METHOD_COPY
    }

    fn min_stack_size(&self) -> usize {
        crate::stack::shift::minimum_size()
    }

    fn new_backend(&self) -> Backend {
        Backend::Jump(JumpRegs::new())
    }

    fn init(&self, _raw: &mut RawCoroutine) -> CoroResult<()> {
        #[cfg(not(qlcoro_jump_asm))]
        {
            return Err(CoroError::NoMatchingEngine);
        }
        #[cfg(qlcoro_jump_asm)]
        Ok(())
    }

    #[cfg(qlcoro_jump_asm)]
    fn step(&self, raw: &mut RawCoroutine, value: Value) -> RawStepResult {
        if !raw.started {
            raw.started = true;

            let stack_top = match &raw.stack {
                crate::stack::StackStorage::Shift(s) => s.top(),
                crate::stack::StackStorage::Copy(_) => {
                    // COPY: there is no separately mapped stack; plant the
                    // bootstrap frame a page below (above, if the stack
                    // grows up) the current live stack pointer, on the
                    // same physical stack `step` is itself running on.
                    // `step_pos` is the real, unadjusted current depth
                    // (spec 4.2: "captures the current stack pointer as
                    // step_pos"), not the padded bootstrap address.
                    let pos = sys::approx_stack_pointer();
                    if let Some(copy) = raw.stack.as_copy_mut() {
                        copy.step_pos = pos;
                    }
                    copy_virtual_top(pos) as *mut u8
                }
            };

            let raw_ptr = raw as *mut RawCoroutine as usize;
            regs(raw).value = value;

            let sp = bootstrap(stack_top, raw_ptr);
            regs(raw).sp = sp;
        } else {
            if raw.flags.contains(Flags::METHOD_COPY) {
                let depth = sys::approx_stack_pointer();
                let copy = raw.stack.as_copy_mut().expect("COPY state missing snapshot");
                let shallower = if sys::stack_grows_down() {
                    depth > copy.step_pos
                } else {
                    depth < copy.step_pos
                };
                if shallower {
                    return RawStepResult::Error(CoroError::StackPositionMismatch);
                }
                unsafe {
                    copy.restore(sys::stack_grows_down());
                }
            }
            regs(raw).value = value;
        }

        let r = regs(raw) as *mut JumpRegs;
        unsafe {
            qlco_jump_swap(&mut (*r).caller_sp, &(*r).sp, regs(raw).value);
        }

        let r = regs(raw);
        if r.finished {
            RawStepResult::Returned(r.value)
        } else {
            RawStepResult::Yielded(r.value)
        }
    }

    #[cfg(not(qlcoro_jump_asm))]
    fn step(&self, _raw: &mut RawCoroutine, _value: Value) -> RawStepResult {
        RawStepResult::Error(CoroError::NoMatchingEngine)
    }

    #[cfg(qlcoro_jump_asm)]
    fn suspend(&self, raw: &mut RawCoroutine, value: Value) -> Suspend {
        if raw.flags.contains(Flags::METHOD_COPY) {
            let depth = sys::approx_stack_pointer();
            let RawCoroutine { stack, allocator, .. } = &mut *raw;
            let copy = stack.as_copy_mut().expect("COPY state missing snapshot");
            copy.yield_pos = depth;
            if let Err(e) = unsafe { copy.capture(allocator.as_mut(), sys::stack_grows_down()) } {
                // The coroutine never actually suspended (no switch back
                // to the stepper happened), so the state is still valid
                // at the same depth - spec section 7's "the state
                // remains valid; caller may try again".
                return Suspend::Error(e);
            }
        }

        regs(raw).value = value;
        let r = regs(raw) as *mut JumpRegs;
        unsafe {
            qlco_jump_swap(&mut (*r).sp, &(*r).caller_sp, regs(raw).value);
        }

        if raw.cancelled {
            Suspend::Cancelled
        } else {
            Suspend::Resumed(regs(raw).value)
        }
    }

    #[cfg(not(qlcoro_jump_asm))]
    fn suspend(&self, _raw: &mut RawCoroutine, _value: Value) -> Suspend {
        Suspend::Cancelled
    }

    fn cancel(&self, raw: &mut RawCoroutine, resume: bool) {
        // Stepping a never-started coroutine here is correct, not
        // wasted work: it runs the body up to its first `suspend`
        // (which will observe `raw.cancelled` and return `Cancelled`)
        // or its return, same as `context`/`thread`'s cancel.
        if resume {
            let _ = self.step(raw, 0);
        }
    }
}
