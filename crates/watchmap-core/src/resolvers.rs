//! The four independent match signals.
//!
//! Each resolver reads a [`MatchContext`] and reports every candidate it
//! found. Nothing here writes to the catalog; lookups go through the per-run
//! caches only to avoid repeating them.

use std::collections::BTreeSet;
use watchmap_models::{ConflictReason, ExternalIdKind, MediaType, ShowId, WatchableKind, WatchableRef};

use crate::caches::RunCaches;
use crate::context::MatchContext;
use crate::repository::WatchableRepository;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathResolution {
    /// Every watchable at the canonical path, regardless of kind
    pub candidates: Vec<WatchableRef>,
    /// Subset of `candidates` of the kind the row expects
    pub expected_candidates: Vec<WatchableRef>,
    pub mismatch_present: bool,
}

impl PathResolution {
    pub fn candidate_count(&self) -> usize {
        self.candidates.len()
    }

    pub fn expected_candidate_count(&self) -> usize {
        self.expected_candidates.len()
    }

    pub fn unique_watchable(&self) -> Option<WatchableRef> {
        match (self.candidates.as_slice(), self.expected_candidates.as_slice()) {
            ([_], [only]) => Some(*only),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalIdResolution {
    pub candidates: Vec<WatchableRef>,
}

impl ExternalIdResolution {
    pub fn candidate_count(&self) -> usize {
        self.candidates.len()
    }

    pub fn unique_watchable(&self) -> Option<WatchableRef> {
        unique(&self.candidates)
    }
}

/// Why the TV-structure signal produced no unique episode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TvStructureNote {
    NotApplicable,
    MissingStructureKeys,
    UnresolvedShowIdentity,
    UnresolvedEpisodePosition,
}

impl TvStructureNote {
    pub fn code(&self) -> &'static str {
        match self {
            TvStructureNote::NotApplicable => "not_applicable",
            TvStructureNote::MissingStructureKeys => "missing_structure_keys",
            TvStructureNote::UnresolvedShowIdentity => "unresolved_show_identity",
            TvStructureNote::UnresolvedEpisodePosition => "unresolved_episode_position",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TvStructureResolution {
    pub show: Option<ShowId>,
    /// Episodes at the requested position of the resolved show
    pub candidates: Vec<WatchableRef>,
    pub conflict_reason: Option<ConflictReason>,
    pub note: Option<TvStructureNote>,
}

impl TvStructureResolution {
    fn noted(note: TvStructureNote) -> Self {
        Self { note: Some(note), ..Default::default() }
    }

    fn conflict(reason: ConflictReason) -> Self {
        Self { conflict_reason: Some(reason), ..Default::default() }
    }

    pub fn candidate_count(&self) -> usize {
        self.candidates.len()
    }

    pub fn unique_watchable(&self) -> Option<WatchableRef> {
        if self.conflict_reason.is_some() {
            return None;
        }
        unique(&self.candidates)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TitleYearResolution {
    pub candidates: Vec<WatchableRef>,
}

impl TitleYearResolution {
    pub fn candidate_count(&self) -> usize {
        self.candidates.len()
    }

    pub fn unique_watchable(&self) -> Option<WatchableRef> {
        unique(&self.candidates)
    }
}

/// Output of all four resolvers for one context
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalResults {
    pub path: PathResolution,
    pub external_ids: ExternalIdResolution,
    pub tv_structure: TvStructureResolution,
    pub title_year: TitleYearResolution,
}

pub fn resolve_signals(
    ctx: &MatchContext,
    repo: &dyn WatchableRepository,
    caches: &mut RunCaches,
) -> SignalResults {
    SignalResults {
        path: resolve_path(ctx, repo, caches),
        external_ids: resolve_external_ids(ctx, repo, caches),
        tv_structure: resolve_tv_structure(ctx, repo, caches),
        title_year: resolve_title_year(ctx, caches),
    }
}

pub fn resolve_path(
    ctx: &MatchContext,
    repo: &dyn WatchableRepository,
    caches: &mut RunCaches,
) -> PathResolution {
    let Some(path) = ctx.canonical_path.as_deref() else {
        return PathResolution::default();
    };
    let candidates = caches.watchables_by_path(repo, path);
    let expected_kind = ctx.media_type.expected_kind();
    let expected_candidates: Vec<WatchableRef> = candidates
        .iter()
        .copied()
        .filter(|w| w.kind == expected_kind)
        .collect();
    let mismatch_present = !candidates.is_empty() && expected_candidates.is_empty();

    PathResolution {
        candidates,
        expected_candidates,
        mismatch_present,
    }
}

pub fn resolve_external_ids(
    ctx: &MatchContext,
    repo: &dyn WatchableRepository,
    caches: &mut RunCaches,
) -> ExternalIdResolution {
    let mut found = BTreeSet::new();
    for (kind, value) in ctx.external_ids.keys() {
        let applies = match kind {
            ExternalIdKind::Imdb | ExternalIdKind::Tmdb => true,
            ExternalIdKind::Tvdb => ctx.media_type == MediaType::Episode,
        };
        if applies {
            found.extend(caches.watchables_by_external_id(repo, kind, &value));
        }
    }
    ExternalIdResolution {
        candidates: found.into_iter().collect(),
    }
}

pub fn resolve_tv_structure(
    ctx: &MatchContext,
    repo: &dyn WatchableRepository,
    caches: &mut RunCaches,
) -> TvStructureResolution {
    if ctx.media_type != MediaType::Episode {
        return TvStructureResolution::noted(TvStructureNote::NotApplicable);
    }
    let (Some(season), Some(episode)) = (ctx.season_number, ctx.episode_number) else {
        return TvStructureResolution::noted(TvStructureNote::MissingStructureKeys);
    };

    let by_rating_key: Vec<ShowId> = match ctx.show_rating_key.as_deref() {
        Some(key) => caches.shows_by_rating_key(repo, key),
        None => Vec::new(),
    };
    let mut by_ids = BTreeSet::new();
    for (kind, value) in ctx.show_external_ids.keys() {
        by_ids.extend(caches.shows_by_external_id(repo, kind, &value));
    }
    let by_ids: Vec<ShowId> = by_ids.into_iter().collect();

    if by_rating_key.len() > 1 || by_ids.len() > 1 {
        return TvStructureResolution::conflict(ConflictReason::MultipleExternalIdCandidates);
    }
    let show = match (by_rating_key.first(), by_ids.first()) {
        (Some(a), Some(b)) if a != b => {
            return TvStructureResolution::conflict(ConflictReason::StrongSignalDisagreement);
        }
        (Some(show), _) | (None, Some(show)) => *show,
        (None, None) => return TvStructureResolution::noted(TvStructureNote::UnresolvedShowIdentity),
    };

    let candidates: Vec<WatchableRef> = caches
        .episodes_at(repo, show, season, episode)
        .into_iter()
        .filter(|w| w.kind == WatchableKind::Episode)
        .collect();

    match candidates.len() {
        0 => TvStructureResolution {
            show: Some(show),
            note: Some(TvStructureNote::UnresolvedEpisodePosition),
            ..Default::default()
        },
        1 => TvStructureResolution {
            show: Some(show),
            candidates,
            ..Default::default()
        },
        _ => TvStructureResolution {
            show: Some(show),
            candidates,
            conflict_reason: Some(ConflictReason::MultipleEpisodeCandidates),
            note: None,
        },
    }
}

/// Movies only. Reads the title/year index primed for the current page.
pub fn resolve_title_year(ctx: &MatchContext, caches: &RunCaches) -> TitleYearResolution {
    match ctx.media_type {
        MediaType::Movie => TitleYearResolution {
            candidates: caches.title_year_candidates(&ctx.title, ctx.year),
        },
        MediaType::Episode => TitleYearResolution::default(),
    }
}

fn unique(candidates: &[WatchableRef]) -> Option<WatchableRef> {
    match candidates {
        [only] => Some(*only),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogStore;
    use crate::paths::PathPolicy;
    use watchmap_models::{DiscoveryRow, ExternalIds, Show, ShowEnrichmentMetadata, Watchable};

    fn ctx_for(row: &DiscoveryRow) -> MatchContext {
        MatchContext::build(row, None, None, &PathPolicy::default())
    }

    #[test]
    fn test_path_resolver_separates_expected_kind() {
        let mut catalog = CatalogStore::new();
        catalog.insert_show(Show::new(1, "Show"));
        catalog.insert_watchable(
            Watchable::episode(10, ShowId(1), 1, 1, "Pilot").with_file_path("/media/file.mkv"),
        );

        let mut row = DiscoveryRow::movie("Pilot", None);
        row.file_path = Some("/media/file.mkv".to_string());
        let mut caches = RunCaches::new("plex");
        let resolution = resolve_path(&ctx_for(&row), &catalog, &mut caches);

        assert_eq!(resolution.candidate_count(), 1);
        assert_eq!(resolution.expected_candidate_count(), 0);
        assert!(resolution.mismatch_present);
        assert_eq!(resolution.unique_watchable(), None);
    }

    #[test]
    fn test_external_ids_ignore_tvdb_for_movies() {
        let mut catalog = CatalogStore::new();
        catalog.insert_watchable(
            Watchable::movie(1, "Heat", Some(1995)).with_external_ids(ExternalIds::new(None, None, Some(77))),
        );
        catalog.insert_watchable(
            Watchable::movie(2, "Heat", Some(1995)).with_external_ids(ExternalIds::new(Some("tt0113277"), None, None)),
        );

        let mut row = DiscoveryRow::movie("Heat", Some(1995));
        row.external_ids = ExternalIds::new(Some("TT0113277"), None, Some(77));
        let mut caches = RunCaches::new("plex");
        let resolution = resolve_external_ids(&ctx_for(&row), &catalog, &mut caches);

        assert_eq!(resolution.candidates, vec![WatchableRef::movie(2)]);
        assert_eq!(resolution.unique_watchable(), Some(WatchableRef::movie(2)));
    }

    #[test]
    fn test_external_ids_dedupe_across_namespaces() {
        let mut catalog = CatalogStore::new();
        catalog.insert_watchable(
            Watchable::movie(1, "Heat", Some(1995))
                .with_external_ids(ExternalIds::new(Some("tt0113277"), Some(949), None)),
        );
        let mut row = DiscoveryRow::movie("Heat", Some(1995));
        row.external_ids = ExternalIds::new(Some("tt0113277"), Some(949), None);
        let mut caches = RunCaches::new("plex");

        let resolution = resolve_external_ids(&ctx_for(&row), &catalog, &mut caches);
        assert_eq!(resolution.candidate_count(), 1);
    }

    fn tv_catalog() -> CatalogStore {
        let mut catalog = CatalogStore::new();
        catalog.insert_show(
            Show::new(1, "The Wire")
                .with_rating_key("500")
                .with_external_ids(ExternalIds::new(None, None, Some(79126))),
        );
        catalog.insert_show(
            Show::new(2, "Other Show").with_external_ids(ExternalIds::new(None, None, Some(80000))),
        );
        catalog.insert_watchable(Watchable::episode(10, ShowId(1), 1, 1, "The Target"));
        catalog.insert_watchable(Watchable::episode(11, ShowId(1), 1, 2, "The Detail"));
        catalog
    }

    fn episode_row(show_key: Option<&str>, season: Option<u32>, episode: Option<u32>) -> DiscoveryRow {
        let mut row = DiscoveryRow::episode("The Target");
        row.plex_grandparent_rating_key = show_key.map(str::to_string);
        row.season_number = season;
        row.episode_number = episode;
        row
    }

    #[test]
    fn test_tv_structure_resolves_by_show_rating_key() {
        let catalog = tv_catalog();
        let mut caches = RunCaches::new("plex");
        let row = episode_row(Some("500"), Some(1), Some(1));

        let resolution = resolve_tv_structure(&ctx_for(&row), &catalog, &mut caches);
        assert_eq!(resolution.show, Some(ShowId(1)));
        assert_eq!(resolution.unique_watchable(), Some(WatchableRef::episode(10)));
        assert_eq!(resolution.conflict_reason, None);
    }

    #[test]
    fn test_tv_structure_reports_notes() {
        let catalog = tv_catalog();
        let mut caches = RunCaches::new("plex");

        let missing = resolve_tv_structure(&ctx_for(&episode_row(Some("500"), None, Some(1))), &catalog, &mut caches);
        assert_eq!(missing.note, Some(TvStructureNote::MissingStructureKeys));

        let no_show = resolve_tv_structure(&ctx_for(&episode_row(Some("999"), Some(1), Some(1))), &catalog, &mut caches);
        assert_eq!(no_show.note, Some(TvStructureNote::UnresolvedShowIdentity));

        let no_episode = resolve_tv_structure(&ctx_for(&episode_row(Some("500"), Some(9), Some(9))), &catalog, &mut caches);
        assert_eq!(no_episode.note, Some(TvStructureNote::UnresolvedEpisodePosition));
        assert_eq!(no_episode.show, Some(ShowId(1)));
    }

    #[test]
    fn test_tv_structure_show_signals_disagree() {
        let catalog = tv_catalog();
        let mut caches = RunCaches::new("plex");
        let row = episode_row(Some("500"), Some(1), Some(1));
        let show = ShowEnrichmentMetadata {
            external_ids: ExternalIds::new(None, None, Some(80000)),
            provenance: None,
        };
        let ctx = MatchContext::build(&row, None, Some(&show), &PathPolicy::default());

        let resolution = resolve_tv_structure(&ctx, &catalog, &mut caches);
        assert_eq!(resolution.conflict_reason, Some(ConflictReason::StrongSignalDisagreement));
        assert_eq!(resolution.unique_watchable(), None);
    }

    #[test]
    fn test_tv_structure_duplicate_position() {
        let mut catalog = tv_catalog();
        catalog.insert_watchable(Watchable::episode(12, ShowId(1), 1, 1, "The Target (dup)"));
        let mut caches = RunCaches::new("plex");
        let row = episode_row(Some("500"), Some(1), Some(1));

        let resolution = resolve_tv_structure(&ctx_for(&row), &catalog, &mut caches);
        assert_eq!(resolution.conflict_reason, Some(ConflictReason::MultipleEpisodeCandidates));
        assert_eq!(resolution.candidate_count(), 2);
    }

    #[test]
    fn test_title_year_only_for_movies() {
        let mut catalog = CatalogStore::new();
        catalog.insert_watchable(Watchable::movie(1, "Heat", Some(1995)));
        let mut caches = RunCaches::new("plex");
        let movie = DiscoveryRow::movie("heat", Some(1995));
        caches.prime_titles(&catalog, std::slice::from_ref(&movie));

        let resolution = resolve_title_year(&ctx_for(&movie), &caches);
        assert_eq!(resolution.unique_watchable(), Some(WatchableRef::movie(1)));

        let mut episode = DiscoveryRow::episode("Heat");
        episode.year = Some(1995);
        assert_eq!(resolve_title_year(&ctx_for(&episode), &caches).candidate_count(), 0);
    }
}
