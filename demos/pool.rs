//! Running a churn of short-lived coroutines against a bounded
//! [`qlcoro::Pool`] instead of letting each one hit the system
//! allocator. Grounded in `examples/original_source/examples/libqlsp.c`'s
//! own demonstration of `ql_state_pool_state_init` churn.

use qlcoro::pool::PooledStepOutcome;
use qlcoro::{Flags, Pool};

fn main() {
    env_logger::init();

    let mut pool = Pool::create(4);

    for i in 0..10 {
        let pooled = pool
            .new_coroutine(
                None,
                Flags::EMPTY,
                Box::new(move |y, v| {
                    let doubled = v * 2;
                    y.suspend(doubled);
                    doubled * 2
                }),
                0,
            )
            .expect("pool failed to produce a coroutine");

        match pooled.step(i) {
            PooledStepOutcome::Yielded(pooled, v) => match pooled.step(v) {
                PooledStepOutcome::Returned(v) => println!("run {}: {}", i, v),
                _ => unreachable!("pool demo body yields exactly once"),
            },
            _ => unreachable!("pool demo body always yields before returning"),
        }
    }

    pool.free();
}
