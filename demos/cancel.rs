//! Cooperative cancellation: a coroutine holding a guard value across
//! a `suspend` is told to unwind instead of being resumed normally.

use qlcoro::{Flags, State, StepOutcome, Suspend};

struct Guard(&'static str);

impl Drop for Guard {
    fn drop(&mut self) {
        println!("releasing {}", self.0);
    }
}

fn main() {
    let state = State::create(
        None,
        Flags::EMPTY,
        Box::new(|y, _| {
            let guard = Guard("resource");
            println!("acquired {}", guard.0);

            loop {
                match y.suspend(0) {
                    Suspend::Resumed(_) => continue,
                    Suspend::Cancelled => {
                        println!("cancelled, unwinding");
                        break;
                    }
                    Suspend::Error(_) => break,
                }
            }

            drop(guard);
            0
        }),
        0,
    )
    .expect("failed to create coroutine");

    let state = match state.step(0) {
        StepOutcome::Yielded(state, _) => state,
        _ => unreachable!("cancel demo body always yields before returning"),
    };

    // Told to unwind: its next `suspend` observes `Cancelled` and it
    // drops its guard before returning.
    state.cancel(true);
}
