//! Scan coordination.
//!
//! [`SyncOrchestrator`] serializes scan requests per library, bumps the
//! index revision after each pass and publishes the outcome. The
//! [`RequestSequencer`] gives query callers the same "take latest" guard.

mod orchestrator;
mod sequencer;

pub use orchestrator::{LibraryScanner, SyncOrchestrator};
pub use sequencer::{RequestSequencer, RequestTicket};
