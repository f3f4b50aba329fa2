//! Atomic persistence helpers shared by settings and thumbnail artifacts.

mod atomic;

pub use atomic::{atomic_read_json, atomic_write_bytes, atomic_write_json};
