use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};
use watchmap_config::{validate_integration_name, BudgetConfig, ProfileBudget};
use watchmap_models::{DiscoveryRow, LibraryInfo, LibraryPage, MappingStatus, RecheckDisposition};
use watchmap_sources::LibrarySource;

use crate::caches::RunCaches;
use crate::context::MatchContext;
use crate::diagnostics::build_diagnostics;
use crate::error::MappingError;
use crate::evaluator::{evaluate_context, Evaluation};
use crate::finalize::{apply_identity_rule, finalize};
use crate::paths::PathPolicy;
use crate::recheck::{RecheckBudget, RecheckOrchestrator, RecheckOutcome, SkipReason};
use crate::repository::{MappingStateStore, WatchableStore};
use crate::upsert::{upsert_mapping, UpsertOutcome};

/// Operating profile for one integration run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TraversalProfile {
    /// Until every library has completed a full cycle
    Bootstrap,
    /// Tighter budgets and priority-ordered rechecks
    Scheduled,
}

impl TraversalProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            TraversalProfile::Bootstrap => "bootstrap",
            TraversalProfile::Scheduled => "scheduled",
        }
    }

    pub fn budget<'a>(&self, budgets: &'a BudgetConfig) -> &'a ProfileBudget {
        match self {
            TraversalProfile::Bootstrap => &budgets.bootstrap,
            TraversalProfile::Scheduled => &budgets.scheduled,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MappingCounters {
    pub pages_fetched: usize,
    pub rows_fetched: usize,
    pub rows_skipped_invalid: usize,
    pub rows_processed: usize,
    pub rows_persisted: usize,
    pub rows_unchanged: usize,
    pub rows_without_target: usize,
    pub status_counts: BTreeMap<MappingStatus, usize>,
    pub recheck_eligible_rows: usize,
    pub metadata_recheck_attempted: usize,
    pub metadata_recheck_skipped: usize,
    pub metadata_recheck_failed: usize,
    pub metadata_calls: usize,
    pub show_metadata_calls: usize,
    pub recheck_budget_exhausted_rows: usize,
    pub skip_reasons: BTreeMap<String, usize>,
}

impl MappingCounters {
    fn record_recheck(&mut self, outcome: &RecheckOutcome) {
        self.metadata_calls += outcome.item_calls;
        self.show_metadata_calls += outcome.show_calls;
        match outcome.disposition {
            RecheckDisposition::NotEligible => {}
            RecheckDisposition::Attempted => {
                self.metadata_recheck_attempted += 1;
                if outcome.failed {
                    self.metadata_recheck_failed += 1;
                }
            }
            RecheckDisposition::Skipped => {
                self.metadata_recheck_skipped += 1;
                if let Some(reason) = outcome.skip_reason {
                    *self.skip_reasons.entry(reason.code().to_string()).or_insert(0) += 1;
                    if reason == SkipReason::RecheckBudgetExhausted {
                        self.recheck_budget_exhausted_rows += 1;
                    }
                }
            }
        }
    }

    pub fn status_count(&self, status: MappingStatus) -> usize {
        self.status_counts.get(&status).copied().unwrap_or(0)
    }

    /// `attempted + skipped == eligible` and `failed <= attempted`
    pub fn check_invariants(&self, integration: &str) -> Result<(), MappingError> {
        let balanced = self.metadata_recheck_attempted + self.metadata_recheck_skipped
            == self.recheck_eligible_rows;
        if balanced && self.metadata_recheck_failed <= self.metadata_recheck_attempted {
            return Ok(());
        }
        error!(
            integration,
            attempted = self.metadata_recheck_attempted,
            skipped = self.metadata_recheck_skipped,
            eligible = self.recheck_eligible_rows,
            failed = self.metadata_recheck_failed,
            "Recheck counting invariant violated"
        );
        Err(MappingError::CountingInvariant {
            integration: integration.to_string(),
            attempted: self.metadata_recheck_attempted,
            skipped: self.metadata_recheck_skipped,
            eligible: self.recheck_eligible_rows,
            failed: self.metadata_recheck_failed,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrationRunReport {
    pub integration: String,
    pub profile: TraversalProfile,
    pub libraries_visited: usize,
    pub libraries_completed_cycle: usize,
    pub row_budget_exhausted: bool,
    /// The bootstrap marker was set by this run
    pub bootstrap_completed: bool,
    pub counters: MappingCounters,
}

impl IntegrationRunReport {
    fn new(integration: &str, profile: TraversalProfile) -> Self {
        Self {
            integration: integration.to_string(),
            profile,
            libraries_visited: 0,
            libraries_completed_cycle: 0,
            row_budget_exhausted: false,
            bootstrap_completed: false,
            counters: MappingCounters::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MappingRunSummary {
    pub integrations: Vec<IntegrationRunReport>,
    pub errors: Vec<String>,
    pub duration: Duration,
}

impl MappingRunSummary {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Use the bootstrap profile even when the marker is already set
    pub force_bootstrap: bool,
}

/// Per-integration mutable run state, passed down the page pipeline
struct RunScope<'r> {
    integration: &'r str,
    profile: TraversalProfile,
    caches: RunCaches,
    orchestrator: RecheckOrchestrator<'r>,
    counters: MappingCounters,
}

/// Drives paging, the per-row pipeline and state persistence.
pub struct MappingEngine<'a> {
    policy: &'a PathPolicy,
    budgets: &'a BudgetConfig,
}

impl<'a> MappingEngine<'a> {
    pub fn new(policy: &'a PathPolicy, budgets: &'a BudgetConfig) -> Self {
        Self { policy, budgets }
    }

    /// One pass over every mappable library of one integration.
    ///
    /// State is loaded once and written once. On a page fetch or commit
    /// failure the cursors of completed pages are still saved, without the
    /// bootstrap marker, and the error is returned.
    #[instrument(skip_all, fields(integration = source.source_name()))]
    pub async fn run_integration(
        &self,
        source: &dyn LibrarySource,
        store: &mut dyn WatchableStore,
        state_store: &dyn MappingStateStore,
        options: &SyncOptions,
    ) -> Result<IntegrationRunReport, MappingError> {
        let integration = source.source_name();
        validate_integration_name(integration)?;
        let run_started = Utc::now();
        let mut state = state_store.load(integration)?;

        let profile = if options.force_bootstrap || !state.is_bootstrap_complete() {
            TraversalProfile::Bootstrap
        } else {
            TraversalProfile::Scheduled
        };
        let budget = profile.budget(self.budgets);
        info!(
            profile = profile.as_str(),
            page_size = budget.page_size,
            run_row_budget = budget.run_row_budget,
            recheck_call_budget = ?budget.recheck_call_budget,
            "Starting mapping run"
        );

        let libraries: Vec<LibraryInfo> = source
            .fetch_libraries()
            .await
            .map_err(|e| MappingError::Source {
                integration: integration.to_string(),
                source: e,
            })?
            .into_iter()
            .filter(|library| library.section_type.is_mappable())
            .collect();

        let mut report = IntegrationRunReport::new(integration, profile);
        let mut scope = RunScope {
            integration,
            profile,
            caches: RunCaches::new(integration),
            orchestrator: RecheckOrchestrator::new(
                source,
                self.policy,
                RecheckBudget::new(budget.recheck_call_budget),
            ),
            counters: MappingCounters::default(),
        };
        let mut rows_remaining = budget.run_row_budget;
        let mut abort: Option<MappingError> = None;

        'libraries: for library in &libraries {
            if rows_remaining == 0 {
                report.row_budget_exhausted = true;
                break;
            }
            report.libraries_visited += 1;
            let mut cursor = state.cursor(&library.library_id);

            loop {
                if rows_remaining == 0 {
                    report.row_budget_exhausted = true;
                    break 'libraries;
                }
                let length = budget.page_size.min(rows_remaining);
                let page = match source
                    .fetch_library_media_page(library, cursor.next_start, length)
                    .await
                {
                    Ok(page) => page,
                    Err(e) => {
                        abort = Some(MappingError::Source {
                            integration: integration.to_string(),
                            source: e,
                        });
                        break 'libraries;
                    }
                };

                if let Err(e) = self
                    .process_page(library, cursor.next_start, &page, store, &mut scope)
                    .await
                {
                    abort = Some(e);
                    break 'libraries;
                }
                rows_remaining = rows_remaining.saturating_sub(page.raw_rows_count);

                let last_page = !page.has_more || page.raw_rows_count == 0;
                if last_page {
                    cursor.complete_cycle(Utc::now());
                    report.libraries_completed_cycle += 1;
                } else {
                    cursor.advance(page.next_start);
                }
                state
                    .library_mapping_state
                    .insert(library.library_id.clone(), cursor.clone());
                if last_page {
                    debug!(
                        library_id = %library.library_id,
                        completed_cycle_count = cursor.completed_cycle_count,
                        "Library cycle completed"
                    );
                    break;
                }
            }
        }

        let current: BTreeSet<&str> = libraries.iter().map(|l| l.library_id.as_str()).collect();
        state
            .library_mapping_state
            .retain(|library_id, _| current.contains(library_id.as_str()));
        state.last_run_at = Some(run_started);

        if abort.is_none()
            && !state.is_bootstrap_complete()
            && state.all_cycles_completed(current.iter().copied())
        {
            state.library_mapping_bootstrap_completed_at = Some(Utc::now());
            report.bootstrap_completed = true;
            info!("Bootstrap completed for every library");
        }

        scope.counters.check_invariants(integration)?;
        report.counters = scope.counters;
        state_store.save(integration, &state)?;

        if let Some(e) = abort {
            warn!(error = %e, "Mapping run aborted; progress up to the last completed page was kept");
            return Err(e);
        }

        let cache_stats = scope.caches.stats();
        info!(
            libraries = report.libraries_visited,
            rows = report.counters.rows_processed,
            persisted = report.counters.rows_persisted,
            recheck_attempted = report.counters.metadata_recheck_attempted,
            recheck_skipped = report.counters.metadata_recheck_skipped,
            lookup_hits = cache_stats.lookup_hits,
            lookup_misses = cache_stats.lookup_misses,
            "Mapping run finished"
        );
        Ok(report)
    }

    async fn process_page(
        &self,
        library: &LibraryInfo,
        start: usize,
        page: &LibraryPage,
        store: &mut dyn WatchableStore,
        scope: &mut RunScope<'_>,
    ) -> Result<(), MappingError> {
        scope.counters.pages_fetched += 1;
        scope.counters.rows_fetched += page.raw_rows_count;
        scope.counters.rows_skipped_invalid += page.rows_skipped_invalid;

        scope.caches.prime_titles(store.as_repository(), &page.rows);
        let first_passes: Vec<Evaluation> = page
            .rows
            .iter()
            .map(|row| {
                let ctx = MatchContext::build(row, None, None, self.policy);
                evaluate_context(ctx, store.as_repository(), &mut scope.caches)
            })
            .collect();

        let order = recheck_order(scope.profile, &first_passes);
        scope.counters.recheck_eligible_rows += order.len();
        let mut rechecks: Vec<RecheckOutcome> = page.rows.iter().map(|_| RecheckOutcome::not_eligible()).collect();
        for index in order {
            let outcome = scope
                .orchestrator
                .recheck(&page.rows[index], &first_passes[index], store.as_repository(), &mut scope.caches)
                .await;
            scope.counters.record_recheck(&outcome);
            rechecks[index] = outcome;
        }

        let now = Utc::now();
        let mut page_statuses: BTreeMap<MappingStatus, usize> = BTreeMap::new();
        for ((row, first_pass), recheck) in page.rows.iter().zip(&first_passes).zip(&rechecks) {
            let status = self.commit_row(row, first_pass, recheck, store, &mut scope.counters, now)?;
            *page_statuses.entry(status).or_insert(0) += 1;
        }

        info!(
            integration = scope.integration,
            library_id = %library.library_id,
            start,
            fetched = page.raw_rows_count,
            skipped_invalid = page.rows_skipped_invalid,
            statuses = ?page_statuses,
            "Processed discovery page"
        );
        Ok(())
    }

    /// Finalize, explain and persist one row. Returns the final status.
    fn commit_row(
        &self,
        row: &DiscoveryRow,
        first_pass: &Evaluation,
        recheck: &RecheckOutcome,
        store: &mut dyn WatchableStore,
        counters: &mut MappingCounters,
        now: DateTime<Utc>,
    ) -> Result<MappingStatus, MappingError> {
        let mut decision = finalize(first_pass, recheck);
        let stored_key = decision
            .resolution
            .selected_watchable
            .and_then(|target| store.identity(target))
            .and_then(|identity| identity.rating_key().map(str::to_string));
        apply_identity_rule(&mut decision.resolution, row.rating_key(), stored_key.as_deref());

        let resolution = &decision.resolution;
        let diagnostics = build_diagnostics(row, first_pass, recheck, &decision);
        counters.rows_processed += 1;
        *counters.status_counts.entry(resolution.status).or_insert(0) += 1;

        debug!(
            rating_key = row.rating_key().unwrap_or(""),
            status = resolution.status.code(),
            conflict_reason = resolution.conflict_reason.map(|r| r.code()).unwrap_or(""),
            "Row resolved"
        );

        let targets = resolution.persistence_targets();
        if targets.is_empty() {
            counters.rows_without_target += 1;
            return Ok(resolution.status);
        }

        let mut written = false;
        for target in targets {
            if let UpsertOutcome::Written { .. } = upsert_mapping(store, target, resolution, &diagnostics, row, now)? {
                written = true;
            }
        }
        if written {
            counters.rows_persisted += 1;
        } else {
            counters.rows_unchanged += 1;
        }
        Ok(resolution.status)
    }
}

/// Indices of recheck-eligible rows in the order they are rechecked.
///
/// Scheduled runs take provisional rows first, then unresolved ones; both
/// groups keep discovery order.
fn recheck_order(profile: TraversalProfile, first_passes: &[Evaluation]) -> Vec<usize> {
    let eligible = first_passes
        .iter()
        .enumerate()
        .filter(|(_, e)| e.status().is_recheck_eligible())
        .map(|(index, _)| index);

    match profile {
        TraversalProfile::Bootstrap => eligible.collect(),
        TraversalProfile::Scheduled => {
            let (mut provisional, unresolved): (Vec<usize>, Vec<usize>) = eligible
                .partition(|index| first_passes[*index].status() == MappingStatus::ProvisionalTitleYear);
            provisional.extend(unresolved);
            provisional
        }
    }
}

/// Run one mapping pass over each integration in turn.
///
/// A failed integration is recorded and the next one still runs; only
/// fatal errors (counting-invariant violations) stop the whole pass.
#[instrument(skip_all, fields(integrations = sources.len()))]
pub async fn run_mapping_sync(
    engine: &MappingEngine<'_>,
    sources: &[&dyn LibrarySource],
    store: &mut dyn WatchableStore,
    state_store: &dyn MappingStateStore,
    options: &SyncOptions,
) -> Result<MappingRunSummary, MappingError> {
    let start = Instant::now();
    let mut summary = MappingRunSummary::default();

    for source in sources {
        match engine.run_integration(*source, store, state_store, options).await {
            Ok(report) => summary.integrations.push(report),
            Err(e) if e.is_fatal() => {
                error!(integration = source.source_name(), error = %e, "Mapping sync stopped");
                return Err(e);
            }
            Err(e) => {
                warn!(integration = source.source_name(), error = %e, "Integration failed, continuing");
                summary.errors.push(format!("{}: {}", source.source_name(), e));
            }
        }
    }

    summary.duration = start.elapsed();
    info!(
        integrations = summary.integrations.len(),
        errors = summary.errors.len(),
        "Mapping sync finished in {:?}",
        summary.duration
    );
    Ok(summary)
}
