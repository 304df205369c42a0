use async_trait::async_trait;
use watchmap_models::{EnrichmentMetadata, LibraryInfo, LibraryPage};
use crate::SourceError;

/// Adapter contract for a media-library indexer (one integration).
///
/// The mapping engine awaits every call in sequence; implementations do not
/// need to be reentrant.
#[async_trait]
pub trait LibrarySource: Send + Sync {
    /// Integration name, used to scope caches and persisted state
    fn source_name(&self) -> &str;

    async fn fetch_libraries(&self) -> Result<Vec<LibraryInfo>, SourceError>;

    /// Fetch up to `length` discovery rows starting at `start`
    async fn fetch_library_media_page(
        &self,
        library: &LibraryInfo,
        start: usize,
        length: usize,
    ) -> Result<LibraryPage, SourceError>;

    /// Fetch supplemental metadata for an item or show by rating key.
    ///
    /// `Ok(None)` means the indexer does not know the key.
    async fn fetch_metadata(&self, rating_key: &str) -> Result<Option<EnrichmentMetadata>, SourceError>;
}
