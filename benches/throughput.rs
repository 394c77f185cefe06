//! Throughput benchmarks translating `examples/original_source/tests/benchmark.c`'s
//! four configurations (return-only, yield-until-return, pre-sized
//! single coroutine, pooled) from its raw `gettimeofday` loop into
//! `criterion` benchmark groups, the way other benchmarked crates in
//! this corpus structure theirs.

use criterion::{criterion_group, criterion_main, Criterion};

use qlcoro::pool::PooledStepOutcome;
use qlcoro::{Flags, Pool, State, StepOutcome};

const YIELDS: usize = 5;

fn yielding_body(y: &mut qlcoro::Yielder, initial: usize) -> usize {
    let mut v = initial;
    for _ in 0..YIELDS - 1 {
        match y.suspend(v) {
            qlcoro::Suspend::Resumed(next) => v = next,
            qlcoro::Suspend::Cancelled | qlcoro::Suspend::Error(_) => return v,
        }
    }
    v
}

fn run_to_completion(mut state: State, mut value: usize) -> usize {
    loop {
        match state.step(value) {
            StepOutcome::Returned(v) => return v,
            StepOutcome::Yielded(next, v) => {
                state = next;
                value = v;
            }
            StepOutcome::Error(_, _) | StepOutcome::Cancelled => return value,
        }
    }
}

fn bench_return_only(c: &mut Criterion) {
    c.bench_function("return_only", |b| {
        b.iter(|| {
            let state =
                State::create(None, Flags::EMPTY, Box::new(|_y, v| v), 0).expect("create");
            run_to_completion(state, 1)
        })
    });
}

fn bench_yield_until_return(c: &mut Criterion) {
    c.bench_function("yield_until_return", |b| {
        b.iter(|| {
            let state = State::create(None, Flags::EMPTY, Box::new(yielding_body), 0)
                .expect("create");
            run_to_completion(state, 1)
        })
    });
}

fn bench_prealloc(c: &mut Criterion) {
    c.bench_function("prealloc", |b| {
        b.iter(|| {
            let state = State::create(None, Flags::EMPTY, Box::new(yielding_body), 1024 * 1024)
                .expect("create");
            run_to_completion(state, 1)
        })
    });
}

fn bench_pooled(c: &mut Criterion) {
    c.bench_function("pooled", |b| {
        b.iter_batched(
            || Pool::create(5),
            |mut pool| {
                let pooled = pool
                    .new_coroutine(None, Flags::EMPTY, Box::new(yielding_body), 0)
                    .expect("pool create");
                let mut pooled = pooled;
                let mut value = 1;
                loop {
                    match pooled.step(value) {
                        PooledStepOutcome::Returned(v) => break v,
                        PooledStepOutcome::Yielded(next, v) => {
                            pooled = next;
                            value = v;
                        }
                        PooledStepOutcome::Error(_, _) | PooledStepOutcome::Cancelled => {
                            break value
                        }
                    }
                }
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

criterion_group!(
    throughput,
    bench_return_only,
    bench_yield_until_return,
    bench_prealloc,
    bench_pooled
);
criterion_main!(throughput);
