use crate::plex::api::{PlexHttpClient, PLEX_TYPE_EPISODE, PLEX_TYPE_MOVIE};
use crate::{LibrarySource, SourceError};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, trace};
use watchmap_models::{
    DiscoveryRow, EnrichmentMetadata, ExternalIds, LibraryInfo, LibraryPage, MediaType, SectionType,
};

const DISCOVERY_PROVENANCE: &str = "plex_library_page";
const METADATA_PROVENANCE: &str = "plex_metadata";

/// `LibrarySource` backed by a Plex Media Server
pub struct PlexLibrarySource {
    name: String,
    api: PlexHttpClient,
}

impl PlexLibrarySource {
    pub fn new(name: &str, token: &str, server_url: &str) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            api: PlexHttpClient::new(token, server_url)?,
        })
    }

    fn error(&self, err: anyhow::Error) -> SourceError {
        SourceError::new(&self.name, format!("{:#}", err))
    }
}

#[async_trait]
impl LibrarySource for PlexLibrarySource {
    fn source_name(&self) -> &str {
        &self.name
    }

    async fn fetch_libraries(&self) -> Result<Vec<LibraryInfo>, SourceError> {
        let json = self.api.get_sections().await.map_err(|e| self.error(e))?;
        let libraries = parse_sections(&json);
        debug!("Plex {}: found {} library sections", self.name, libraries.len());
        Ok(libraries)
    }

    async fn fetch_library_media_page(
        &self,
        library: &LibraryInfo,
        start: usize,
        length: usize,
    ) -> Result<LibraryPage, SourceError> {
        let (item_type, media_type) = match library.section_type {
            SectionType::Movie => (PLEX_TYPE_MOVIE, MediaType::Movie),
            SectionType::Show => (PLEX_TYPE_EPISODE, MediaType::Episode),
            SectionType::Other(ref other) => {
                return Err(SourceError::new(
                    &self.name,
                    format!("library {} has unsupported section type '{}'", library.library_id, other),
                ));
            }
        };
        let json = self
            .api
            .get_section_page(&library.library_id, item_type, start, length)
            .await
            .map_err(|e| self.error(e))?;
        Ok(parse_library_page(&json, media_type, start))
    }

    async fn fetch_metadata(&self, rating_key: &str) -> Result<Option<EnrichmentMetadata>, SourceError> {
        let json = self
            .api
            .get_metadata_item(rating_key)
            .await
            .map_err(|e| self.error(e))?;
        Ok(json.as_ref().and_then(parse_metadata))
    }
}

fn media_container(json: &Value) -> Option<&Value> {
    json.get("MediaContainer")
}

fn str_field(item: &Value, field: &str) -> Option<String> {
    match item.get(field)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        // Rating keys occasionally arrive as numbers
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn u32_field(item: &Value, field: &str) -> Option<u32> {
    item.get(field)
        .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
        .and_then(|v| u32::try_from(v).ok())
}

pub(crate) fn parse_sections(json: &Value) -> Vec<LibraryInfo> {
    let mut libraries = Vec::new();
    let directories = media_container(json)
        .and_then(|c| c.get("Directory"))
        .and_then(|d| d.as_array());
    if let Some(directories) = directories {
        for dir in directories {
            let Some(key) = str_field(dir, "key") else {
                continue;
            };
            let type_ = str_field(dir, "type").unwrap_or_default();
            let title = str_field(dir, "title").unwrap_or_default();
            libraries.push(LibraryInfo {
                library_id: key,
                title,
                section_type: SectionType::from_plex_type(&type_),
            });
        }
    }
    libraries
}

/// Collect GUID strings from both the `guid` attribute and the `Guid` array
fn collect_guids(item: &Value) -> Vec<String> {
    let mut guids = Vec::new();
    if let Some(guid) = str_field(item, "guid") {
        guids.push(guid);
    }
    match item.get("Guid") {
        Some(Value::Array(entries)) => {
            for entry in entries {
                if let Some(id) = entry.get("id").and_then(|i| i.as_str()) {
                    guids.push(id.to_string());
                } else if let Some(id) = entry.as_str() {
                    guids.push(id.to_string());
                }
            }
        }
        Some(Value::Object(obj)) => {
            if let Some(id) = obj.get("id").and_then(|i| i.as_str()) {
                guids.push(id.to_string());
            }
        }
        _ => {}
    }
    guids
}

/// Extract the value following `scheme://`, dropping query parameters
fn guid_value<'a>(guid: &'a str, scheme: &str) -> Option<&'a str> {
    let start = guid.find(scheme)? + scheme.len();
    let rest = &guid[start..];
    let value = rest.split(['?', '&']).next()?.trim();
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Parse external ids from Plex GUID strings.
///
/// GUIDs can be in formats like:
/// - "imdb://tt1234567", "tmdb://603", "tvdb://81189"
/// - "com.plexapp.agents.imdb://tt1234567?lang=en"
/// - "com.plexapp.agents.themoviedb://603?lang=en"
/// - "com.plexapp.agents.thetvdb://81189/1/2?lang=en" (show id plus position; ignored)
/// - "plex://movie/5d776b5e1e5c36001f8e9b8a" (not an external id; ignored)
pub fn parse_external_ids_from_guids<S: AsRef<str>>(guids: &[S]) -> ExternalIds {
    let mut imdb: Option<String> = None;
    let mut tmdb: Option<u32> = None;
    let mut tvdb: Option<u32> = None;

    for guid in guids {
        let guid = guid.as_ref();
        if imdb.is_none() {
            if let Some(value) = guid_value(guid, "imdb://") {
                let candidate = value.to_ascii_lowercase();
                if candidate.starts_with("tt")
                    && candidate.len() >= 9
                    && candidate[2..].chars().all(|c| c.is_ascii_digit())
                {
                    imdb = Some(candidate);
                }
            }
        }
        if tmdb.is_none() {
            tmdb = guid_value(guid, "tmdb://")
                .or_else(|| guid_value(guid, "themoviedb://"))
                .and_then(|v| v.parse().ok());
        }
        if tvdb.is_none() {
            tvdb = guid_value(guid, "tvdb://")
                .filter(|v| !v.contains('/'))
                .and_then(|v| v.parse().ok());
        }
    }

    ExternalIds::new(imdb.as_deref(), tmdb, tvdb)
}

/// First `Media[].Part[].file` of an item
fn first_part_file(item: &Value) -> Option<String> {
    item.get("Media")?
        .as_array()?
        .iter()
        .filter_map(|media| media.get("Part").and_then(|p| p.as_array()))
        .flatten()
        .find_map(|part| str_field(part, "file"))
}

pub(crate) fn parse_discovery_row(item: &Value, media_type: MediaType) -> Option<DiscoveryRow> {
    let rating_key = str_field(item, "ratingKey")?;
    let title = str_field(item, "title")?;

    let year = item
        .get("year")
        .and_then(|y| y.as_i64())
        .and_then(|y| i32::try_from(y).ok());
    let guids = collect_guids(item);

    let (parent, grandparent, season, episode) = match media_type {
        MediaType::Movie => (None, None, None, None),
        MediaType::Episode => (
            str_field(item, "parentRatingKey"),
            str_field(item, "grandparentRatingKey"),
            u32_field(item, "parentIndex"),
            u32_field(item, "index"),
        ),
    };

    Some(DiscoveryRow {
        media_type,
        title,
        year,
        plex_rating_key: Some(rating_key),
        plex_guid: str_field(item, "guid"),
        plex_parent_rating_key: parent,
        plex_grandparent_rating_key: grandparent,
        season_number: season,
        episode_number: episode,
        file_path: first_part_file(item),
        external_ids: parse_external_ids_from_guids(&guids),
        provenance: Some(DISCOVERY_PROVENANCE.to_string()),
    })
}

pub(crate) fn parse_library_page(json: &Value, media_type: MediaType, start: usize) -> LibraryPage {
    let container = media_container(json);
    let items: &[Value] = container
        .and_then(|c| c.get("Metadata"))
        .and_then(|m| m.as_array())
        .map(|a| a.as_slice())
        .unwrap_or(&[]);

    let mut rows = Vec::with_capacity(items.len());
    let mut skipped = 0;
    for item in items {
        match parse_discovery_row(item, media_type) {
            Some(row) => rows.push(row),
            None => {
                skipped += 1;
                trace!("Plex: skipping item without rating key or title: {}", item);
            }
        }
    }

    let raw_rows_count = items.len();
    let records_total = container
        .and_then(|c| c.get("totalSize"))
        .and_then(|t| t.as_u64())
        .map(|t| t as usize)
        .unwrap_or(start + raw_rows_count);
    let next_start = start + raw_rows_count;
    let has_more = raw_rows_count > 0 && next_start < records_total;

    LibraryPage {
        rows,
        raw_rows_count,
        rows_skipped_invalid: skipped,
        records_total,
        has_more,
        next_start,
    }
}

pub(crate) fn parse_metadata(json: &Value) -> Option<EnrichmentMetadata> {
    let item = media_container(json)?
        .get("Metadata")?
        .as_array()?
        .first()?;
    let guids = collect_guids(item);
    Some(EnrichmentMetadata {
        file_path: first_part_file(item),
        external_ids: parse_external_ids_from_guids(&guids),
        provenance: Some(METADATA_PROVENANCE.to_string()),
    })
}
