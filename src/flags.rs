//! Capability flags shared by every engine.
//!
//! The original C vtable encodes these as a bitmask passed straight
//! through to `create`; kept as a hand-rolled bitmask here rather than
//! pulling in a `bitflags`-style crate, since the whole set is four
//! well-known bits that never need derive-macro ergonomics.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Capability/strategy bitmask. Exactly one of [`Flags::METHOD_COPY`] or
/// [`Flags::METHOD_SHIFT`] is ever set on a constructed `State`; the other
/// bits are side flags advertised by individual engines.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags(u32);

impl Flags {
    pub const EMPTY: Flags = Flags(0);

    /// Stack-borrow snapshot strategy.
    pub const METHOD_COPY: Flags = Flags(1 << 0);
    /// Private pre-allocated stack strategy.
    pub const METHOD_SHIFT: Flags = Flags(1 << 1);
    /// Save/restore of the signal mask across switches (context engine only).
    pub const RESTORE_SIGMASK: Flags = Flags(1 << 2);
    /// Back-end uses a real OS thread (thread engine only).
    pub const THREADED: Flags = Flags(1 << 3);

    /// True if every bit set in `other` is also set in `self`.
    pub fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn strategy(self) -> Flags {
        Flags(self.0 & (Self::METHOD_COPY.0 | Self::METHOD_SHIFT.0))
    }

    pub fn without(self, other: Flags) -> Flags {
        Flags(self.0 & !other.0)
    }
}

impl BitOr for Flags {
    type Output = Flags;
    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

impl BitOrAssign for Flags {
    fn bitor_assign(&mut self, rhs: Flags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut first = true;
        write!(f, "Flags(")?;
        for (bit, name) in [
            (Self::METHOD_COPY, "METHOD_COPY"),
            (Self::METHOD_SHIFT, "METHOD_SHIFT"),
            (Self::RESTORE_SIGMASK, "RESTORE_SIGMASK"),
            (Self::THREADED, "THREADED"),
        ] {
            if self.contains(bit) {
                if !first {
                    write!(f, " | ")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        if first {
            write!(f, "0")?;
        }
        write!(f, ")")
    }
}
