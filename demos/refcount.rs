//! Two coroutines closing over the same shared cell, each writing
//! and then yielding out what it sees. Port of `rustcc/coroutine-rs`'s
//! `examples/refcount.rs`, which used `Rc<RefCell<_>>` - this crate's
//! `CoroutineFn` is `Send` (every engine, including the thread-backed
//! one, must be able to move the closure onto another stack or thread),
//! so the shared cell here is `Arc<Mutex<_>>` instead.

use std::sync::{Arc, Mutex};

use qlcoro::{Flags, State, StepOutcome};

fn main() {
    let cell = Arc::new(Mutex::new(0usize));

    let cell1 = cell.clone();
    let coro1 = State::create(
        None,
        Flags::EMPTY,
        Box::new(move |y, _| {
            *cell1.lock().unwrap() = 1;
            let val = *cell1.lock().unwrap();
            y.suspend(val);
            usize::MAX
        }),
        0,
    )
    .expect("failed to create coroutine");

    let cell2 = cell.clone();
    let coro2 = State::create(
        None,
        Flags::EMPTY,
        Box::new(move |y, _| {
            *cell2.lock().unwrap() = 2;
            let val = *cell2.lock().unwrap();
            y.suspend(val);
            usize::MAX
        }),
        0,
    )
    .expect("failed to create coroutine");

    match coro1.step(0) {
        StepOutcome::Yielded(_state, v) => println!("First: {}", v),
        _ => unreachable!("refcount demo bodies always yield before returning"),
    }
    match coro2.step(0) {
        StepOutcome::Yielded(_state, v) => println!("Second: {}", v),
        _ => unreachable!("refcount demo bodies always yield before returning"),
    }
}
