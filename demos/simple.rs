//! Minimal asymmetric coroutine: step in, yield once, step in again,
//! return. Port of `rustcc/coroutine-rs`'s `examples/simple.rs` to the
//! single-value-slot, caller-stepped protocol this crate provides in
//! place of that crate's symmetric `Coroutine::sched()`.

use qlcoro::{Flags, State, StepOutcome, Suspend};

fn main() {
    env_logger::init();

    let state = State::create(
        None,
        Flags::EMPTY,
        Box::new(|y, _initial| {
            println!("1. Hello in coroutine!");

            match y.suspend(0) {
                Suspend::Resumed(_) => println!("3. We are back!!"),
                Suspend::Cancelled | Suspend::Error(_) => return 0,
            }

            println!("4. Good bye");
            0
        }),
        0,
    )
    .expect("failed to create coroutine");

    match state.step(0) {
        StepOutcome::Yielded(state, _) => {
            println!("2. We are here!");
            match state.step(0) {
                StepOutcome::Returned(_) => println!("5. Back to main."),
                _ => unreachable!("simple demo body only suspends once"),
            }
        }
        _ => unreachable!("simple demo body always yields before returning"),
    }
}
