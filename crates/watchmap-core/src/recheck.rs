use tracing::{debug, warn};
use watchmap_models::{
    DiscoveryRow, EnrichmentMetadata, MappingStatus, MediaType, RecheckDisposition,
    ShowEnrichmentMetadata,
};
use watchmap_sources::LibrarySource;

use crate::caches::{CachedEnrichment, RunCaches};
use crate::context::MatchContext;
use crate::evaluator::{evaluate_context, Evaluation};
use crate::paths::PathPolicy;
use crate::repository::WatchableRepository;

/// Why an eligible row was not rechecked with a fresh adapter call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SkipReason {
    MissingRatingKey,
    EnrichmentCached,
    RecheckBudgetExhausted,
}

impl SkipReason {
    pub fn code(&self) -> &'static str {
        match self {
            SkipReason::MissingRatingKey => "missing_rating_key",
            SkipReason::EnrichmentCached => "enrichment_cached",
            SkipReason::RecheckBudgetExhausted => "recheck_budget_exhausted",
        }
    }
}

/// Cap on enrichment calls for one integration run. `None` is unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecheckBudget {
    remaining: Option<usize>,
}

impl RecheckBudget {
    pub fn new(limit: Option<usize>) -> Self {
        Self { remaining: limit }
    }

    pub fn unlimited() -> Self {
        Self::new(None)
    }

    pub fn remaining(&self) -> Option<usize> {
        self.remaining
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == Some(0)
    }

    fn try_consume(&mut self) -> bool {
        match self.remaining.as_mut() {
            None => true,
            Some(0) => false,
            Some(left) => {
                *left -= 1;
                true
            }
        }
    }
}

/// What the recheck phase did for one row
#[derive(Debug, Clone, PartialEq)]
pub struct RecheckOutcome {
    pub disposition: RecheckDisposition,
    pub skip_reason: Option<SkipReason>,
    /// Re-evaluation against usable enrichment, if any was available
    pub evaluation: Option<Evaluation>,
    pub failed: bool,
    pub item_calls: usize,
    pub show_calls: usize,
    pub show_enrichment_used: bool,
    pub episode_enrichment_fallback: bool,
}

impl RecheckOutcome {
    pub fn not_eligible() -> Self {
        Self {
            disposition: RecheckDisposition::NotEligible,
            skip_reason: None,
            evaluation: None,
            failed: false,
            item_calls: 0,
            show_calls: 0,
            show_enrichment_used: false,
            episode_enrichment_fallback: false,
        }
    }

    fn skipped(reason: SkipReason) -> Self {
        Self {
            disposition: RecheckDisposition::Skipped,
            skip_reason: Some(reason),
            ..Self::not_eligible()
        }
    }

    pub fn calls(&self) -> usize {
        self.item_calls + self.show_calls
    }

    /// A usable enrichment fed a re-evaluation
    pub fn succeeded(&self) -> bool {
        self.evaluation.is_some()
    }

    pub fn status(&self) -> Option<MappingStatus> {
        self.evaluation.as_ref().map(Evaluation::status)
    }
}

enum Fetch<T> {
    Cached(Option<T>),
    Fetched(Option<T>),
    BudgetExhausted,
}

/// Bookkeeping while one row is being rechecked
#[derive(Default)]
struct Progress {
    item_calls: usize,
    show_calls: usize,
    cache_served: bool,
    budget_blocked: bool,
    show_enrichment_used: bool,
    episode_enrichment_fallback: bool,
    evaluation: Option<Evaluation>,
}

impl Progress {
    fn note<T>(&mut self, fetch: Fetch<T>, show_level: bool) -> Option<T> {
        match fetch {
            Fetch::Cached(value) => {
                self.cache_served = true;
                value
            }
            Fetch::Fetched(value) => {
                if show_level {
                    self.show_calls += 1;
                } else {
                    self.item_calls += 1;
                }
                value
            }
            Fetch::BudgetExhausted => {
                self.budget_blocked = true;
                None
            }
        }
    }

    fn finish(self) -> RecheckOutcome {
        let calls = self.item_calls + self.show_calls;
        if calls == 0 {
            let reason = if self.budget_blocked {
                SkipReason::RecheckBudgetExhausted
            } else if self.cache_served {
                SkipReason::EnrichmentCached
            } else {
                SkipReason::MissingRatingKey
            };
            return RecheckOutcome {
                evaluation: self.evaluation,
                show_enrichment_used: self.show_enrichment_used,
                episode_enrichment_fallback: self.episode_enrichment_fallback,
                ..RecheckOutcome::skipped(reason)
            };
        }

        let resolving = self
            .evaluation
            .as_ref()
            .map(|e| e.status().is_resolving())
            .unwrap_or(false);
        RecheckOutcome {
            disposition: RecheckDisposition::Attempted,
            skip_reason: None,
            evaluation: self.evaluation,
            failed: !resolving,
            item_calls: self.item_calls,
            show_calls: self.show_calls,
            show_enrichment_used: self.show_enrichment_used,
            episode_enrichment_fallback: self.episode_enrichment_fallback,
        }
    }
}

/// Fetches supplemental enrichment for eligible rows and re-evaluates them.
///
/// Every fetch goes through the run caches first; only cache misses spend
/// budget. Adapter failures are logged and cached as unusable.
pub struct RecheckOrchestrator<'a> {
    source: &'a dyn LibrarySource,
    policy: &'a PathPolicy,
    budget: RecheckBudget,
}

impl<'a> RecheckOrchestrator<'a> {
    pub fn new(source: &'a dyn LibrarySource, policy: &'a PathPolicy, budget: RecheckBudget) -> Self {
        Self { source, policy, budget }
    }

    pub async fn recheck(
        &mut self,
        row: &DiscoveryRow,
        first_pass: &Evaluation,
        repo: &dyn WatchableRepository,
        caches: &mut RunCaches,
    ) -> RecheckOutcome {
        let status = first_pass.status();
        if !status.is_recheck_eligible() {
            return RecheckOutcome::not_eligible();
        }

        let outcome = match (row.media_type, status) {
            (MediaType::Episode, MappingStatus::Unresolved) => {
                self.recheck_episode(row, repo, caches).await
            }
            _ => self.recheck_item(row, repo, caches).await,
        };

        debug!(
            rating_key = row.rating_key().unwrap_or(""),
            disposition = ?outcome.disposition,
            skip_reason = outcome.skip_reason.map(|r| r.code()).unwrap_or(""),
            recheck_status = outcome.status().map(|s| s.code()).unwrap_or(""),
            "Recheck finished"
        );
        outcome
    }

    async fn recheck_item(
        &mut self,
        row: &DiscoveryRow,
        repo: &dyn WatchableRepository,
        caches: &mut RunCaches,
    ) -> RecheckOutcome {
        let Some(rating_key) = row.rating_key() else {
            return RecheckOutcome::skipped(SkipReason::MissingRatingKey);
        };

        let mut progress = Progress::default();
        let fetch = self.fetch_item(rating_key, caches).await;
        if let Some(item) = progress.note(fetch, false) {
            let ctx = MatchContext::build(row, Some(&item), None, self.policy);
            progress.episode_enrichment_fallback = ctx.episode_enrichment_used;
            progress.evaluation = Some(evaluate_context(ctx, repo, caches));
        }
        progress.finish()
    }

    /// Show-level enrichment first; the episode's own metadata is only
    /// fetched when the show context does not settle the row.
    async fn recheck_episode(
        &mut self,
        row: &DiscoveryRow,
        repo: &dyn WatchableRepository,
        caches: &mut RunCaches,
    ) -> RecheckOutcome {
        let show_key = row.show_rating_key();
        let item_key = row.rating_key();
        if show_key.is_none() && item_key.is_none() {
            return RecheckOutcome::skipped(SkipReason::MissingRatingKey);
        }

        let mut progress = Progress::default();
        let mut show_metadata: Option<ShowEnrichmentMetadata> = None;

        if let Some(show_key) = show_key {
            let fetch = self.fetch_show(show_key, caches).await;
            show_metadata = progress.note(fetch, true);
            if let Some(show) = show_metadata.as_ref() {
                let ctx = MatchContext::build(row, None, Some(show), self.policy);
                let evaluation = evaluate_context(ctx, repo, caches);
                progress.show_enrichment_used = true;
                let resolving = evaluation.status().is_resolving();
                progress.evaluation = Some(evaluation);
                if resolving {
                    return progress.finish();
                }
            }
        }

        if let Some(item_key) = item_key {
            let fetch = self.fetch_item(item_key, caches).await;
            if let Some(item) = progress.note(fetch, false) {
                let ctx = MatchContext::build(row, Some(&item), show_metadata.as_ref(), self.policy);
                progress.episode_enrichment_fallback = true;
                progress.evaluation = Some(evaluate_context(ctx, repo, caches));
            }
        }
        progress.finish()
    }

    async fn fetch_item(&mut self, rating_key: &str, caches: &mut RunCaches) -> Fetch<EnrichmentMetadata> {
        match caches.item_enrichment(rating_key) {
            CachedEnrichment::Usable(metadata) => return Fetch::Cached(Some(metadata)),
            CachedEnrichment::Unusable => return Fetch::Cached(None),
            CachedEnrichment::NotCached => {}
        }
        if !self.budget.try_consume() {
            return Fetch::BudgetExhausted;
        }

        let fetched = match self.source.fetch_metadata(rating_key).await {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(rating_key, error = %e, "Item enrichment fetch failed, treating as unusable");
                None
            }
        };
        caches.store_item_enrichment(rating_key, fetched);
        match caches.item_enrichment(rating_key) {
            CachedEnrichment::Usable(metadata) => Fetch::Fetched(Some(metadata)),
            _ => Fetch::Fetched(None),
        }
    }

    async fn fetch_show(&mut self, show_rating_key: &str, caches: &mut RunCaches) -> Fetch<ShowEnrichmentMetadata> {
        match caches.show_enrichment(show_rating_key) {
            CachedEnrichment::Usable(metadata) => return Fetch::Cached(Some(metadata)),
            CachedEnrichment::Unusable => return Fetch::Cached(None),
            CachedEnrichment::NotCached => {}
        }
        if !self.budget.try_consume() {
            return Fetch::BudgetExhausted;
        }

        let fetched = match self.source.fetch_metadata(show_rating_key).await {
            Ok(metadata) => metadata.map(ShowEnrichmentMetadata::from),
            Err(e) => {
                warn!(show_rating_key, error = %e, "Show enrichment fetch failed, treating as unusable");
                None
            }
        };
        caches.store_show_enrichment(show_rating_key, fetched);
        match caches.show_enrichment(show_rating_key) {
            CachedEnrichment::Usable(metadata) => Fetch::Fetched(Some(metadata)),
            _ => Fetch::Fetched(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_counts_down_and_stops() {
        let mut budget = RecheckBudget::new(Some(2));
        assert!(budget.try_consume());
        assert!(budget.try_consume());
        assert!(budget.is_exhausted());
        assert!(!budget.try_consume());
        assert_eq!(budget.remaining(), Some(0));

        let mut unlimited = RecheckBudget::unlimited();
        for _ in 0..100 {
            assert!(unlimited.try_consume());
        }
        assert!(!unlimited.is_exhausted());
    }

    #[test]
    fn test_skip_reason_precedence() {
        let progress = Progress {
            cache_served: true,
            budget_blocked: true,
            ..Default::default()
        };
        let outcome = progress.finish();
        assert_eq!(outcome.disposition, RecheckDisposition::Skipped);
        assert_eq!(outcome.skip_reason, Some(SkipReason::RecheckBudgetExhausted));
        assert!(!outcome.failed);

        let cached = Progress { cache_served: true, ..Default::default() }.finish();
        assert_eq!(cached.skip_reason, Some(SkipReason::EnrichmentCached));
    }

    #[test]
    fn test_attempt_without_usable_data_fails() {
        let progress = Progress { item_calls: 1, ..Default::default() };
        let outcome = progress.finish();
        assert_eq!(outcome.disposition, RecheckDisposition::Attempted);
        assert!(outcome.failed);
        assert!(!outcome.succeeded());
        assert_eq!(outcome.calls(), 1);
    }
}
