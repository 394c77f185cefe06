//! The single bidirectional value channel between a stepper and a
//! coroutine. Spec leaves the payload type abstract ("pointer-typed
//! values for illustration"); a `usize` is wide enough to carry a
//! pointer, an integer, or a packed enum discriminant, and is what
//! every engine's register-swap primitive already threads through as
//! its argument/return value.

/// A value passed across a `step`/`yield` boundary.
pub type Value = usize;
