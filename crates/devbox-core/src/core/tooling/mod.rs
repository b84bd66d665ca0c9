//! Outcome shaping and diagnostic codes.

pub(crate) mod diagnostics;
pub(crate) mod outcome;
