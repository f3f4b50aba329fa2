//! Thumbnail artifacts for indexed cards.
//!
//! Artifacts live at `<thumbnail_dir>/<card_id>.jpg`. A card's id survives
//! content edits, so an artifact stays valid until the card is removed.

mod generator;
mod queue;

pub use generator::{ImageThumbnailGenerator, ThumbnailGenerator};
pub use queue::{ThumbnailQueue, ThumbnailSweep};

use thiserror::Error;

/// Outcome of a failed or unfinished thumbnail request.
///
/// Cloneable so one generation result can be handed to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ThumbnailError {
    #[error("Card not found: {0}")]
    CardNotFound(String),

    #[error("No readable source file for card {0}")]
    SourceMissing(String),

    #[error("Thumbnail generation failed: {0}")]
    GenerationFailed(String),

    /// The wait timed out; generation keeps running.
    #[error("Thumbnail is still being generated")]
    Pending,
}

impl ThumbnailError {
    /// Whether asking again later can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ThumbnailError::Pending | ThumbnailError::GenerationFailed(_))
    }
}
