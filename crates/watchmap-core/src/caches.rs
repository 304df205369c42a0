use std::collections::{BTreeSet, HashMap};
use tracing::debug;
use watchmap_models::{
    DiscoveryRow, EnrichmentMetadata, ExternalIdKind, MediaType, ShowEnrichmentMetadata, ShowId,
    WatchableRef,
};

use crate::repository::{normalize_title, normalize_year, WatchableRepository};

type TitleYearKey = (String, Option<i32>);

/// Cache slot for enrichment fetched during the current run
#[derive(Debug, Clone, PartialEq)]
pub enum CachedEnrichment<T> {
    NotCached,
    Usable(T),
    /// Fetched (or failed) without anything worth re-evaluating against
    Unusable,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub lookup_hits: usize,
    pub lookup_misses: usize,
}

/// Memoized lookups for one integration's traversal.
///
/// Built at the start of an integration run and dropped at its end. Rating
/// keys and ids are not unique across sources, so a cache is never shared
/// between integrations.
pub struct RunCaches {
    integration: String,
    by_path: HashMap<String, Vec<WatchableRef>>,
    by_external_id: HashMap<(ExternalIdKind, String), Vec<WatchableRef>>,
    shows_by_rating_key: HashMap<String, Vec<ShowId>>,
    shows_by_external_id: HashMap<(ExternalIdKind, String), Vec<ShowId>>,
    episodes_by_position: HashMap<(ShowId, u32, u32), Vec<WatchableRef>>,
    /// Title/year index, filled from each page's movie rows before evaluation
    by_title_year: HashMap<TitleYearKey, Vec<WatchableRef>>,
    loaded_titles: BTreeSet<String>,
    item_enrichment: HashMap<String, Option<EnrichmentMetadata>>,
    show_enrichment: HashMap<String, Option<ShowEnrichmentMetadata>>,
    stats: CacheStats,
}

impl RunCaches {
    pub fn new(integration: &str) -> Self {
        Self {
            integration: integration.to_string(),
            by_path: HashMap::new(),
            by_external_id: HashMap::new(),
            shows_by_rating_key: HashMap::new(),
            shows_by_external_id: HashMap::new(),
            episodes_by_position: HashMap::new(),
            by_title_year: HashMap::new(),
            loaded_titles: BTreeSet::new(),
            item_enrichment: HashMap::new(),
            show_enrichment: HashMap::new(),
            stats: CacheStats::default(),
        }
    }

    pub fn integration(&self) -> &str {
        &self.integration
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn watchables_by_path(
        &mut self,
        repo: &dyn WatchableRepository,
        canonical_path: &str,
    ) -> Vec<WatchableRef> {
        if let Some(hit) = self.by_path.get(canonical_path) {
            self.stats.lookup_hits += 1;
            return hit.clone();
        }
        self.stats.lookup_misses += 1;
        let found = sorted_unique(repo.watchables_by_path(canonical_path));
        self.by_path.insert(canonical_path.to_string(), found.clone());
        found
    }

    pub fn watchables_by_external_id(
        &mut self,
        repo: &dyn WatchableRepository,
        kind: ExternalIdKind,
        value: &str,
    ) -> Vec<WatchableRef> {
        let key = (kind, value.to_string());
        if let Some(hit) = self.by_external_id.get(&key) {
            self.stats.lookup_hits += 1;
            return hit.clone();
        }
        self.stats.lookup_misses += 1;
        let found = sorted_unique(repo.watchables_by_external_id(kind, value));
        self.by_external_id.insert(key, found.clone());
        found
    }

    pub fn shows_by_rating_key(&mut self, repo: &dyn WatchableRepository, rating_key: &str) -> Vec<ShowId> {
        if let Some(hit) = self.shows_by_rating_key.get(rating_key) {
            self.stats.lookup_hits += 1;
            return hit.clone();
        }
        self.stats.lookup_misses += 1;
        let found = sorted_unique(repo.shows_by_rating_key(rating_key));
        self.shows_by_rating_key.insert(rating_key.to_string(), found.clone());
        found
    }

    pub fn shows_by_external_id(
        &mut self,
        repo: &dyn WatchableRepository,
        kind: ExternalIdKind,
        value: &str,
    ) -> Vec<ShowId> {
        let key = (kind, value.to_string());
        if let Some(hit) = self.shows_by_external_id.get(&key) {
            self.stats.lookup_hits += 1;
            return hit.clone();
        }
        self.stats.lookup_misses += 1;
        let found = sorted_unique(repo.shows_by_external_id(kind, value));
        self.shows_by_external_id.insert(key, found.clone());
        found
    }

    pub fn episodes_at(
        &mut self,
        repo: &dyn WatchableRepository,
        show: ShowId,
        season_number: u32,
        episode_number: u32,
    ) -> Vec<WatchableRef> {
        let key = (show, season_number, episode_number);
        if let Some(hit) = self.episodes_by_position.get(&key) {
            self.stats.lookup_hits += 1;
            return hit.clone();
        }
        self.stats.lookup_misses += 1;
        let found = sorted_unique(repo.episodes_at(show, season_number, episode_number));
        self.episodes_by_position.insert(key, found.clone());
        found
    }

    /// Load title/year index entries for every movie title on a page.
    ///
    /// Titles already loaded earlier in the run are not looked up again.
    pub fn prime_titles(&mut self, repo: &dyn WatchableRepository, rows: &[DiscoveryRow]) {
        let mut loaded = 0;
        for row in rows.iter().filter(|r| r.media_type == MediaType::Movie) {
            let title = normalize_title(&row.title);
            if title.is_empty() || self.loaded_titles.contains(&title) {
                continue;
            }
            for (watchable, year) in repo.movies_by_title(&title) {
                let entry = self
                    .by_title_year
                    .entry((title.clone(), normalize_year(year)))
                    .or_default();
                if !entry.contains(&watchable) {
                    entry.push(watchable);
                    entry.sort();
                }
            }
            self.loaded_titles.insert(title);
            loaded += 1;
        }
        if loaded > 0 {
            debug!(integration = %self.integration, titles = loaded, "Primed title/year index");
        }
    }

    /// Exact title/year candidates; titles not primed yield nothing
    pub fn title_year_candidates(&self, title: &str, year: Option<i32>) -> Vec<WatchableRef> {
        let key = (normalize_title(title), normalize_year(year));
        self.by_title_year.get(&key).cloned().unwrap_or_default()
    }

    pub fn item_enrichment(&self, rating_key: &str) -> CachedEnrichment<EnrichmentMetadata> {
        match self.item_enrichment.get(rating_key) {
            None => CachedEnrichment::NotCached,
            Some(Some(metadata)) => CachedEnrichment::Usable(metadata.clone()),
            Some(None) => CachedEnrichment::Unusable,
        }
    }

    /// Remember a fetch result; anything not usable becomes the sentinel
    pub fn store_item_enrichment(&mut self, rating_key: &str, metadata: Option<EnrichmentMetadata>) {
        let value = metadata.filter(EnrichmentMetadata::is_usable);
        self.item_enrichment.insert(rating_key.to_string(), value);
    }

    pub fn show_enrichment(&self, show_rating_key: &str) -> CachedEnrichment<ShowEnrichmentMetadata> {
        match self.show_enrichment.get(show_rating_key) {
            None => CachedEnrichment::NotCached,
            Some(Some(metadata)) => CachedEnrichment::Usable(metadata.clone()),
            Some(None) => CachedEnrichment::Unusable,
        }
    }

    pub fn store_show_enrichment(&mut self, show_rating_key: &str, metadata: Option<ShowEnrichmentMetadata>) {
        let value = metadata.filter(ShowEnrichmentMetadata::is_usable);
        self.show_enrichment.insert(show_rating_key.to_string(), value);
    }
}

fn sorted_unique<T: Ord>(mut items: Vec<T>) -> Vec<T> {
    items.sort();
    items.dedup();
    items
}
