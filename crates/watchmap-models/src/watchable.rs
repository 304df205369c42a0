use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::{ExternalIds, MappingDiagnostics, MappingStatus, MappingStrategy, ShowId, WatchableRef};

/// Identity fields of a watchable. The mapping engine may overwrite the
/// Plex fields under the identity-overwrite rule; external ids and file
/// paths belong to upstream inventory sync.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IdentityFields {
    #[serde(default)]
    pub plex_rating_key: Option<String>,
    #[serde(default)]
    pub plex_guid: Option<String>,
    #[serde(default)]
    pub external_ids: ExternalIds,
}

impl IdentityFields {
    /// Stored rating key, ignoring blank values
    pub fn rating_key(&self) -> Option<&str> {
        crate::discovery::non_blank(self.plex_rating_key.as_deref())
    }
}

/// Mapping-state fields, written only by the mapping engine
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MappingState {
    #[serde(default)]
    pub mapping_status_code: Option<MappingStatus>,
    #[serde(default)]
    pub mapping_strategy: Option<MappingStrategy>,
    #[serde(default)]
    pub mapping_status_changed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub mapping_diagnostics: Option<MappingDiagnostics>,
}

/// A movie or episode already inventoried by upstream content-management sync
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Watchable {
    pub reference: WatchableRef,
    pub title: String,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub identity: IdentityFields,
    #[serde(default)]
    pub file_paths: Vec<String>,
    /// Parent show, episodes only
    #[serde(default)]
    pub show_id: Option<ShowId>,
    #[serde(default)]
    pub season_number: Option<u32>,
    #[serde(default)]
    pub episode_number: Option<u32>,
    #[serde(default)]
    pub mapping: MappingState,
}

impl Watchable {
    pub fn movie(id: i64, title: &str, year: Option<i32>) -> Self {
        Self {
            reference: WatchableRef::movie(id),
            title: title.to_string(),
            year,
            identity: IdentityFields::default(),
            file_paths: Vec::new(),
            show_id: None,
            season_number: None,
            episode_number: None,
            mapping: MappingState::default(),
        }
    }

    pub fn episode(id: i64, show_id: ShowId, season_number: u32, episode_number: u32, title: &str) -> Self {
        Self {
            reference: WatchableRef::episode(id),
            title: title.to_string(),
            year: None,
            identity: IdentityFields::default(),
            file_paths: Vec::new(),
            show_id: Some(show_id),
            season_number: Some(season_number),
            episode_number: Some(episode_number),
            mapping: MappingState::default(),
        }
    }

    pub fn with_file_path(mut self, path: &str) -> Self {
        self.file_paths.push(path.to_string());
        self
    }

    pub fn with_external_ids(mut self, ids: ExternalIds) -> Self {
        self.identity.external_ids = ids;
        self
    }

    pub fn with_rating_key(mut self, rating_key: &str) -> Self {
        self.identity.plex_rating_key = Some(rating_key.to_string());
        self
    }
}

/// A TV show: parent of episode watchables, resolvable by rating key or
/// external ids
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Show {
    pub id: ShowId,
    pub title: String,
    #[serde(default)]
    pub plex_rating_key: Option<String>,
    #[serde(default)]
    pub external_ids: ExternalIds,
}

impl Show {
    pub fn new(id: i64, title: &str) -> Self {
        Self {
            id: ShowId(id),
            title: title.to_string(),
            plex_rating_key: None,
            external_ids: ExternalIds::default(),
        }
    }

    pub fn with_rating_key(mut self, rating_key: &str) -> Self {
        self.plex_rating_key = Some(rating_key.to_string());
        self
    }

    pub fn with_external_ids(mut self, ids: ExternalIds) -> Self {
        self.external_ids = ids;
        self
    }
}
