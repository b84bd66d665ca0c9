//! Internal implementation modules for `devbox-core`.
//!
//! Callers go through the re-exports at the crate root.

pub mod collect;
pub mod config;
pub mod lock;
pub mod runtime;
pub mod sandbox;
pub mod tooling;
