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

//! Thread engine (spec section 4.3): the coroutine body runs on a real
//! OS thread, kept in lockstep with its stepper by a two-party barrier.
//! Slowest of the three engines, but entirely safe-Rust and portable to
//! anything `std::thread` runs on; useful as a reference implementation
//! and a fallback when the jump engine has no assembly for the target
//! architecture.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread::JoinHandle;

use crate::error::CoroResult;
use crate::flags::Flags;
use crate::state::{Backend, RawCoroutine, Suspend, Yielder};
use crate::value::Value;

use super::{Engine, RawStepResult};

/// A `*mut RawCoroutine` is only ever touched by whichever side the
/// barrier currently has running, never both at once; this wrapper lets
/// it cross the `thread::spawn` closure's `Send` bound.
struct SendPtr(*mut RawCoroutine);
unsafe impl Send for SendPtr {}

pub(crate) struct ThreadHandle {
    barrier: Arc<Barrier>,
    slot: Arc<Mutex<Value>>,
    finished: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

fn handle(raw: &mut RawCoroutine) -> &mut ThreadHandle {
    match &mut raw.backend {
        Backend::Thread(h) => h,
        _ => unreachable!("thread engine invoked on a non-thread backend"),
    }
}

pub struct ThreadEngine;

impl Engine for ThreadEngine {
    fn name(&self) -> &'static str {
        "thread"
    }

    fn flags(&self) -> Flags {
        Flags::METHOD_SHIFT | Flags::THREADED
    }

    fn min_stack_size(&self) -> usize {
        crate::stack::shift::minimum_size()
    }

    fn new_backend(&self) -> Backend {
        Backend::Thread(ThreadHandle {
            barrier: Arc::new(Barrier::new(2)),
            slot: Arc::new(Mutex::new(0)),
            finished: Arc::new(AtomicBool::new(false)),
            join: None,
        })
    }

    fn init(&self, raw: &mut RawCoroutine) -> CoroResult<()> {
        let size = raw.size;
        let raw_ptr = SendPtr(raw as *mut RawCoroutine);
        let (barrier, slot, finished) = {
            let h = handle(raw);
            (h.barrier.clone(), h.slot.clone(), h.finished.clone())
        };

        let join = std::thread::Builder::new()
            .stack_size(size)
            .spawn(move || {
                let raw_ptr = raw_ptr;
                barrier.wait();

                let raw = unsafe { &mut *raw_ptr.0 };
                let func = raw
                    .func
                    .take()
                    .expect("thread engine body entered more than once");
                let initial = *slot.lock().expect("thread engine value slot poisoned");
                let mut yielder = Yielder::new(raw_ptr.0);

                let result = func(&mut yielder, initial);

                *slot.lock().expect("thread engine value slot poisoned") = result;
                finished.store(true, Ordering::Release);
                barrier.wait();
            })
            .expect("failed to spawn thread engine coroutine thread");

        handle(raw).join = Some(join);
        Ok(())
    }

    fn step(&self, raw: &mut RawCoroutine, value: Value) -> RawStepResult {
        {
            let h = handle(raw);
            *h.slot.lock().expect("thread engine value slot poisoned") = value;
            h.barrier.wait(); // release: let the coroutine thread run
            h.barrier.wait(); // wait: block until it suspends or returns
        }

        let h = handle(raw);
        let out = *h.slot.lock().expect("thread engine value slot poisoned");
        if h.finished.load(Ordering::Acquire) {
            if let Some(join) = h.join.take() {
                let _ = join.join();
            }
            RawStepResult::Returned(out)
        } else {
            RawStepResult::Yielded(out)
        }
    }

    fn suspend(&self, raw: &mut RawCoroutine, value: Value) -> Suspend {
        let h = handle(raw);
        *h.slot.lock().expect("thread engine value slot poisoned") = value;
        h.barrier.wait(); // signal suspension to the stepper
        h.barrier.wait(); // block until the stepper resumes us

        if raw.cancelled {
            return Suspend::Cancelled;
        }
        let h = handle(raw);
        let v = *h.slot.lock().expect("thread engine value slot poisoned");
        Suspend::Resumed(v)
    }

    fn cancel(&self, raw: &mut RawCoroutine, resume: bool) {
        if resume {
            // Drive one more handoff; the body's next `suspend` call
            // observes `raw.cancelled` and returns `Cancelled`.
            let _ = self.step(raw, 0);
            return;
        }

        // `cancel(resume = false)`: the body is never given a chance to
        // unwind. Spec section 9 leaves behavior undefined for resources
        // held across the yield point; this crate cancels the OS thread
        // outright via `pthread_cancel`, matching the original's
        // documented "the thread is cancelled" contract.
        let h = handle(raw);
        if let Some(join) = h.join.take() {
            #[cfg(unix)]
            {
                use std::os::unix::thread::JoinHandleExt;
                let native = join.into_pthread_t();
                unsafe {
                    libc::pthread_cancel(native);
                }
            }
            #[cfg(not(unix))]
            {
                drop(join);
            }
        }
    }
}
