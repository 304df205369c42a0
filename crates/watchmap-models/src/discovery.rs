use serde::{Deserialize, Serialize};
use crate::{ExternalIds, MediaType};

/// Library section kinds reported by the library indexer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SectionType {
    Movie,
    Show,
    /// Music, photos and anything else the mapper does not traverse
    Other(String),
}

impl SectionType {
    pub fn from_plex_type(type_: &str) -> Self {
        match type_ {
            "movie" => SectionType::Movie,
            "show" => SectionType::Show,
            other => SectionType::Other(other.to_string()),
        }
    }

    pub fn is_mappable(&self) -> bool {
        matches!(self, SectionType::Movie | SectionType::Show)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LibraryInfo {
    pub library_id: String,
    pub title: String,
    pub section_type: SectionType,
}

/// One external record describing a watchable candidate
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoveryRow {
    pub media_type: MediaType,
    pub title: String,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub plex_rating_key: Option<String>,
    #[serde(default)]
    pub plex_guid: Option<String>,
    #[serde(default)]
    pub plex_parent_rating_key: Option<String>,
    #[serde(default)]
    pub plex_grandparent_rating_key: Option<String>,
    #[serde(default)]
    pub season_number: Option<u32>,
    #[serde(default)]
    pub episode_number: Option<u32>,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub external_ids: ExternalIds,
    #[serde(default)]
    pub provenance: Option<String>,
}

impl DiscoveryRow {
    pub fn movie(title: &str, year: Option<i32>) -> Self {
        Self::new(MediaType::Movie, title, year)
    }

    pub fn episode(title: &str) -> Self {
        Self::new(MediaType::Episode, title, None)
    }

    fn new(media_type: MediaType, title: &str, year: Option<i32>) -> Self {
        Self {
            media_type,
            title: title.to_string(),
            year,
            plex_rating_key: None,
            plex_guid: None,
            plex_parent_rating_key: None,
            plex_grandparent_rating_key: None,
            season_number: None,
            episode_number: None,
            file_path: None,
            external_ids: ExternalIds::default(),
            provenance: None,
        }
    }

    /// Rating key, ignoring blank values
    pub fn rating_key(&self) -> Option<&str> {
        non_blank(self.plex_rating_key.as_deref())
    }

    /// Show (grandparent) rating key of an episode, ignoring blank values
    pub fn show_rating_key(&self) -> Option<&str> {
        non_blank(self.plex_grandparent_rating_key.as_deref())
    }

    pub fn guid(&self) -> Option<&str> {
        non_blank(self.plex_guid.as_deref())
    }
}

/// One page of discovery rows for a library
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LibraryPage {
    pub rows: Vec<DiscoveryRow>,
    pub raw_rows_count: usize,
    pub rows_skipped_invalid: usize,
    pub records_total: usize,
    pub has_more: bool,
    pub next_start: usize,
}

/// Supplemental per-item data fetched on demand
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EnrichmentMetadata {
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub external_ids: ExternalIds,
    #[serde(default)]
    pub provenance: Option<String>,
}

impl EnrichmentMetadata {
    /// Usable iff it carries a non-blank file path or at least one external id
    pub fn is_usable(&self) -> bool {
        non_blank(self.file_path.as_deref()).is_some() || !self.external_ids.is_empty()
    }
}

/// Supplemental per-show data: external ids only
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ShowEnrichmentMetadata {
    #[serde(default)]
    pub external_ids: ExternalIds,
    #[serde(default)]
    pub provenance: Option<String>,
}

impl ShowEnrichmentMetadata {
    pub fn is_usable(&self) -> bool {
        !self.external_ids.is_empty()
    }
}

impl From<EnrichmentMetadata> for ShowEnrichmentMetadata {
    fn from(metadata: EnrichmentMetadata) -> Self {
        Self {
            external_ids: metadata.external_ids,
            provenance: metadata.provenance,
        }
    }
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
