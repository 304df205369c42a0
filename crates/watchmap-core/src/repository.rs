use anyhow::Result;
use serde::{Deserialize, Serialize};
use watchmap_models::{
    ExternalIdKind, IdentityFields, IntegrationMappingState, MappingState, ShowId, WatchableRef,
};

/// Read side of the watchable inventory.
///
/// Inventory itself is owned by upstream content sync; the engine only looks
/// things up. Lookups return every match so resolvers can count candidates.
pub trait WatchableRepository: Send + Sync {
    /// Watchables with an associated file at this canonical path
    fn watchables_by_path(&self, canonical_path: &str) -> Vec<WatchableRef>;

    /// Movies and episodes carrying this external id
    fn watchables_by_external_id(&self, kind: ExternalIdKind, value: &str) -> Vec<WatchableRef>;

    fn shows_by_rating_key(&self, rating_key: &str) -> Vec<ShowId>;

    fn shows_by_external_id(&self, kind: ExternalIdKind, value: &str) -> Vec<ShowId>;

    fn episodes_at(&self, show: ShowId, season_number: u32, episode_number: u32) -> Vec<WatchableRef>;

    /// Movies whose normalized title equals `normalized_title`, with their year
    fn movies_by_title(&self, normalized_title: &str) -> Vec<(WatchableRef, Option<i32>)>;

    fn identity(&self, watchable: WatchableRef) -> Option<IdentityFields>;

    fn mapping_state(&self, watchable: WatchableRef) -> Option<MappingState>;
}

/// Identity fields the engine may overwrite on a verified match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityUpdate {
    pub plex_rating_key: String,
    #[serde(default)]
    pub plex_guid: Option<String>,
}

/// Write side: one durable commit per row
pub trait MappingWriter: Send + Sync {
    fn commit_mapping(
        &mut self,
        watchable: WatchableRef,
        mapping: &MappingState,
        identity: Option<&IdentityUpdate>,
    ) -> Result<()>;
}

/// A catalog the engine can both read and commit to
pub trait WatchableStore: WatchableRepository + MappingWriter {
    fn as_repository(&self) -> &dyn WatchableRepository;
}

impl<T: WatchableRepository + MappingWriter> WatchableStore for T {
    fn as_repository(&self) -> &dyn WatchableRepository {
        self
    }
}

/// Persisted per-integration traversal state
pub trait MappingStateStore: Send + Sync {
    fn load(&self, integration: &str) -> Result<IntegrationMappingState>;

    /// Replace the whole document for `integration` in one atomic write
    fn save(&self, integration: &str, state: &IntegrationMappingState) -> Result<()>;

    fn clear(&self, integration: &str) -> Result<()>;
}

/// Normalized key used by the title/year index and lookups
pub fn normalize_title(title: &str) -> String {
    title.trim().to_lowercase()
}

/// Years at or below zero carry no information
pub fn normalize_year(year: Option<i32>) -> Option<i32> {
    year.filter(|y| *y > 0)
}
