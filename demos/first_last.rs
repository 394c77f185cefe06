//! Smallest possible coroutine: receive the first stepped-in value,
//! print it, return a final one. Direct port of
//! `rustcc/coroutine-rs`'s `examples/first_last.rs`.

use qlcoro::{Flags, State, StepOutcome};

fn main() {
    let state = State::create(
        None,
        Flags::EMPTY,
        Box::new(|_y, initial| {
            println!("Initial value: {}", initial);
            2
        }),
        0,
    )
    .expect("failed to create coroutine");

    match state.step(1) {
        StepOutcome::Returned(v) => println!("Final value: {}", v),
        _ => unreachable!("first_last demo body never yields"),
    }
}
