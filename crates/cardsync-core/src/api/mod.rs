//! API implementation submodules.
//!
//! Each submodule contains `impl CardSync` blocks that extend the public API
//! with domain-specific methods. The struct definition remains in `lib.rs`.

mod builder;
mod cards;
mod libraries;
mod patterns;

pub use builder::CardSyncBuilder;
