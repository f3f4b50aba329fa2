//! Card query and thumbnail methods on CardSync.

use std::path::PathBuf;

use crate::error::Result;
use crate::index::{CardFileRecord, CardPage, CardQuery, CardRecord};
use crate::thumbnail::{ThumbnailError, ThumbnailSweep};
use crate::CardSync;

impl CardSync {
    // ========================================
    // Cards
    // ========================================

    /// Page through cards. The page carries the revision it was read at.
    pub fn list_cards(&self, query: &CardQuery) -> Result<CardPage> {
        self.index.list_cards(query, self.revision())
    }

    pub fn get_card(&self, card_id: &str) -> Result<Option<CardRecord>> {
        self.index.get_card(card_id)
    }

    pub fn card_files(&self, card_id: &str) -> Result<Vec<CardFileRecord>> {
        self.index.card_files(card_id)
    }

    // ========================================
    // Thumbnails
    // ========================================

    /// Thumbnail for a card, waiting at most the configured timeout.
    ///
    /// [`ThumbnailError::Pending`] means generation is still running and a
    /// later call will pick up the result.
    pub async fn ensure_thumbnail(&self, card_id: &str) -> std::result::Result<PathBuf, ThumbnailError> {
        let timeout = self.settings().thumbnail_timeout();
        self.thumbnails
            .ensure_thumbnail_within(card_id, timeout)
            .await
    }

    pub async fn generate_missing_thumbnails(&self, library_id: &str) -> Result<ThumbnailSweep> {
        self.thumbnails.generate_missing_for_library(library_id).await
    }
}
