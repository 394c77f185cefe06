//! Error taxonomy (spec section 7): construction failures, suspension
//! failures (COPY only), and cancellation are the only three kinds that
//! ever surface to a caller. Everything else is a `debug_assert!` on an
//! engine-internal invariant.

use thiserror::Error;

/// Errors surfaced from `State::create`, `State::step`, and the
/// coroutine-side `Yielder::suspend`.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum CoroError {
    /// No compiled-in engine matches the requested name, or none of the
    /// compiled-in engines advertises a superset of the requested flags.
    #[error("no engine matches the requested name/flags")]
    NoMatchingEngine,

    /// `create`/`create_full` was called with no coroutine body.
    #[error("coroutine function was null")]
    NullFunction,

    /// The allocator failed to produce (or grow) the state's backing buffer.
    #[error("allocation failed")]
    AllocationFailed,

    /// `COPY` only: `step` was called from a stack position shallower than
    /// the depth recorded at the coroutine's first step.
    #[error("step() resumed from a shallower stack position than the first step")]
    StackPositionMismatch,

    /// `COPY` only: the snapshot buffer needed to grow to hold the live
    /// stack interval at `yield`, and the allocator refused.
    #[error("COPY snapshot buffer failed to grow")]
    SnapshotGrowthFailed,
}

pub type CoroResult<T> = Result<T, CoroError>;
