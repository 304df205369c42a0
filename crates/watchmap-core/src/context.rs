use watchmap_models::{DiscoveryRow, EnrichmentMetadata, ExternalIds, MediaType, ShowEnrichmentMetadata};

use crate::paths::{Ownership, PathClassification, PathPolicy};

/// Canonical, read-only view of one discovery row plus whatever enrichment
/// fed it. Resolvers see only this.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchContext {
    pub media_type: MediaType,
    pub title: String,
    pub year: Option<i32>,
    pub rating_key: Option<String>,
    pub guid: Option<String>,
    pub show_rating_key: Option<String>,
    pub season_number: Option<u32>,
    pub episode_number: Option<u32>,
    /// Discovery ids overlaid with item enrichment ids, per key
    pub external_ids: ExternalIds,
    /// Show-level ids, only known from show enrichment
    pub show_external_ids: ExternalIds,
    pub canonical_path: Option<String>,
    pub classification: Option<PathClassification>,
    pub discovery_provenance: Option<String>,
    pub item_provenance: Option<String>,
    pub show_provenance: Option<String>,
    pub episode_enrichment_used: bool,
    pub show_enrichment_used: bool,
}

impl MatchContext {
    pub fn build(
        row: &DiscoveryRow,
        item: Option<&EnrichmentMetadata>,
        show: Option<&ShowEnrichmentMetadata>,
        policy: &PathPolicy,
    ) -> Self {
        let raw_path = item
            .and_then(|m| m.file_path.as_deref())
            .filter(|p| !p.trim().is_empty())
            .or(row.file_path.as_deref());
        let canonical_path = raw_path.and_then(|p| policy.canonicalize(p));
        let classification = canonical_path.as_deref().map(|p| policy.classify(p));

        let discovery_ids = row.external_ids.normalized();
        let external_ids = match item {
            Some(metadata) => discovery_ids.overlaid_with(&metadata.external_ids.normalized()),
            None => discovery_ids,
        };
        let show_external_ids = show
            .map(|s| s.external_ids.normalized())
            .unwrap_or_default();

        Self {
            media_type: row.media_type,
            title: row.title.clone(),
            year: row.year,
            rating_key: row.rating_key().map(str::to_string),
            guid: row.guid().map(str::to_string),
            show_rating_key: row.show_rating_key().map(str::to_string),
            season_number: row.season_number,
            episode_number: row.episode_number,
            external_ids,
            show_external_ids,
            canonical_path,
            classification,
            discovery_provenance: row.provenance.clone(),
            item_provenance: item.and_then(|m| m.provenance.clone()),
            show_provenance: show.and_then(|s| s.provenance.clone()),
            episode_enrichment_used: item.is_some() && row.media_type == MediaType::Episode,
            show_enrichment_used: show.is_some(),
        }
    }

    pub fn ownership(&self) -> Option<Ownership> {
        self.classification.as_ref().map(|c| c.ownership)
    }

    pub fn is_external(&self) -> bool {
        self.ownership() == Some(Ownership::External)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enrichment_overrides_ids_per_key() {
        let mut row = DiscoveryRow::movie("Heat", Some(1995));
        row.external_ids = ExternalIds::new(Some("tt0113277"), Some(949), None);
        let item = EnrichmentMetadata {
            external_ids: ExternalIds::new(None, Some(950), Some(7)),
            provenance: Some("plex_metadata".to_string()),
            ..Default::default()
        };

        let ctx = MatchContext::build(&row, Some(&item), None, &PathPolicy::default());
        assert_eq!(ctx.external_ids, ExternalIds::new(Some("tt0113277"), Some(950), Some(7)));
        assert_eq!(ctx.item_provenance.as_deref(), Some("plex_metadata"));
        assert!(!ctx.episode_enrichment_used);
    }

    #[test]
    fn test_enrichment_path_wins_over_blank() {
        let mut row = DiscoveryRow::episode("Pilot");
        row.file_path = Some("/tv/show/s01e01.mkv".to_string());

        let blank = EnrichmentMetadata {
            file_path: Some("  ".to_string()),
            ..Default::default()
        };
        let policy = PathPolicy::new(&["/tv".to_string()], &[]);
        let ctx = MatchContext::build(&row, Some(&blank), None, &policy);
        assert_eq!(ctx.canonical_path.as_deref(), Some("/tv/show/s01e01.mkv"));
        assert!(ctx.episode_enrichment_used);

        let moved = EnrichmentMetadata {
            file_path: Some("/elsewhere/s01e01.mkv".to_string()),
            ..Default::default()
        };
        let ctx = MatchContext::build(&row, Some(&moved), None, &policy);
        assert_eq!(ctx.canonical_path.as_deref(), Some("/elsewhere/s01e01.mkv"));
        assert!(ctx.is_external());
    }

    #[test]
    fn test_no_path_has_no_ownership() {
        let row = DiscoveryRow::episode("Pilot");
        let policy = PathPolicy::new(&["/tv".to_string()], &[]);
        let ctx = MatchContext::build(&row, None, None, &policy);
        assert_eq!(ctx.ownership(), None);
        assert!(!ctx.is_external());
    }
}
