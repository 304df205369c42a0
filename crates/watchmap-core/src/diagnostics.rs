use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use watchmap_models::{
    CandidateCounts, DiagnosticsProvenance, DiscoveryRow, MappingDiagnostics, MappingStatus,
    MatchStep, PassSummary, RecheckSummary, WatchableRef, DIAGNOSTICS_SCHEMA_VERSION,
};

use crate::evaluator::Evaluation;
use crate::finalize::FinalDecision;
use crate::recheck::RecheckOutcome;

/// Provenance tag used when a discovery row carries none
pub const DEFAULT_DISCOVERY_PROVENANCE: &str = "discovery";

/// Default cap on sampled child ids per status in a rollup
pub const DEFAULT_ROLLUP_SAMPLE_LIMIT: usize = 10;

pub fn pass_summary(evaluation: &Evaluation) -> PassSummary {
    let signals = &evaluation.signals;
    PassSummary {
        status: evaluation.resolution.status,
        selected_step: evaluation.resolution.selected_step,
        conflict_reason: evaluation.resolution.conflict_reason,
        candidates: CandidateCounts {
            path: signals.path.candidate_count(),
            path_expected_kind: signals.path.expected_candidate_count(),
            path_kind_mismatch: signals.path.mismatch_present,
            external_ids: signals.external_ids.candidate_count(),
            tv_structure: signals.tv_structure.candidate_count(),
            title_year: signals.title_year.candidate_count(),
        },
        tv_structure_note: signals.tv_structure.note.map(|n| n.code().to_string()),
    }
}

pub fn recheck_summary(outcome: &RecheckOutcome) -> RecheckSummary {
    RecheckSummary {
        disposition: outcome.disposition,
        skip_reason: outcome.skip_reason.map(|r| r.code().to_string()),
        failed: outcome.failed,
        show_enrichment_used: outcome.show_enrichment_used,
        episode_enrichment_fallback: outcome.episode_enrichment_fallback,
        pass: outcome.evaluation.as_ref().map(pass_summary),
    }
}

/// Build the persisted explanation for one row's final decision.
///
/// Contains no timestamps, so re-running over unchanged input yields an
/// identical record.
pub fn build_diagnostics(
    row: &DiscoveryRow,
    first_pass: &Evaluation,
    recheck: &RecheckOutcome,
    decision: &FinalDecision,
) -> MappingDiagnostics {
    let resolution = &decision.resolution;
    let ctx = decision.context(first_pass, recheck);
    let recheck_ctx = recheck.evaluation.as_ref().map(|e| &e.context);

    MappingDiagnostics {
        schema_version: DIAGNOSTICS_SCHEMA_VERSION,
        attempt_order: MatchStep::ATTEMPT_ORDER.to_vec(),
        status: resolution.status,
        strategy: resolution.strategy,
        selected_step: resolution.selected_step,
        conflict_reason: resolution.conflict_reason,
        implicated_watchables: resolution.implicated.iter().map(|w| w.to_string()).collect(),
        identity_overwrite_allowed: resolution.allow_overwrite_rating_key,
        canonical_path: ctx.canonical_path.clone(),
        ownership: ctx.ownership().map(|o| o.as_str().to_string()),
        matched_root: ctx.classification.as_ref().and_then(|c| c.matched_root.clone()),
        first_pass: pass_summary(first_pass),
        recheck: recheck_summary(recheck),
        provenance: DiagnosticsProvenance {
            discovery: row
                .provenance
                .clone()
                .unwrap_or_else(|| DEFAULT_DISCOVERY_PROVENANCE.to_string()),
            item_enrichment: recheck_ctx.and_then(|c| c.item_provenance.clone()),
            show_enrichment: recheck_ctx.and_then(|c| c.show_provenance.clone()),
        },
    }
}

/// Aggregate view over the children of a rollup entity (e.g. a show's
/// episodes), computed from their persisted statuses alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollupDiagnostics {
    pub child_count: usize,
    pub unmapped_children: usize,
    pub worst_status: Option<MappingStatus>,
    pub status_counts: BTreeMap<MappingStatus, usize>,
    /// Sorted, capped sample of child ids per status
    pub samples: BTreeMap<MappingStatus, Vec<String>>,
}

impl RollupDiagnostics {
    pub fn from_children<'a, I>(children: I, sample_limit: usize) -> Self
    where
        I: IntoIterator<Item = (WatchableRef, Option<&'a MappingDiagnostics>)>,
    {
        let mut rollup = RollupDiagnostics::default();
        let mut ids_by_status: BTreeMap<MappingStatus, Vec<WatchableRef>> = BTreeMap::new();

        for (child_id, diagnostics) in children {
            rollup.child_count += 1;
            let Some(diagnostics) = diagnostics else {
                rollup.unmapped_children += 1;
                continue;
            };
            let status = diagnostics.status;
            *rollup.status_counts.entry(status).or_insert(0) += 1;
            ids_by_status.entry(status).or_default().push(child_id);
            rollup.worst_status = match rollup.worst_status {
                Some(worst) if worst.severity() >= status.severity() => Some(worst),
                _ => Some(status),
            };
        }

        // Sort by (kind, id) so numeric ids keep numeric order
        for (status, mut ids) in ids_by_status {
            ids.sort();
            ids.truncate(sample_limit);
            rollup.samples.insert(status, ids.iter().map(|w| w.to_string()).collect());
        }
        rollup
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::MappingResolution;
    use crate::finalize::finalize;
    use crate::paths::PathPolicy;
    use crate::context::MatchContext;
    use crate::resolvers::SignalResults;
    use watchmap_models::{ConflictReason, RecheckDisposition};

    fn diagnostics_with(status: MappingStatus) -> MappingDiagnostics {
        let row = DiscoveryRow::episode("Pilot");
        let first = Evaluation {
            context: MatchContext::build(&row, None, None, &PathPolicy::default()),
            signals: SignalResults::default(),
            resolution: MappingResolution::with_status(status),
        };
        let recheck = RecheckOutcome::not_eligible();
        let decision = finalize(&first, &recheck);
        build_diagnostics(&row, &first, &recheck, &decision)
    }

    #[test]
    fn test_diagnostics_record_fixed_shape() {
        let mut row = DiscoveryRow::movie("Heat", Some(1995));
        row.file_path = Some("/data/movies/heat.mkv".to_string());
        let policy = PathPolicy::new(&["/data".to_string()], &[]);
        let first = Evaluation {
            context: MatchContext::build(&row, None, None, &policy),
            signals: SignalResults::default(),
            resolution: MappingResolution::conflict(
                ConflictReason::MultiplePathCandidates,
                [WatchableRef::movie(2), WatchableRef::movie(1)],
            ),
        };
        let recheck = RecheckOutcome::not_eligible();
        let decision = finalize(&first, &recheck);

        let diagnostics = build_diagnostics(&row, &first, &recheck, &decision);
        assert_eq!(diagnostics.schema_version, DIAGNOSTICS_SCHEMA_VERSION);
        assert_eq!(diagnostics.attempt_order, MatchStep::ATTEMPT_ORDER.to_vec());
        assert_eq!(diagnostics.conflict_reason, Some(ConflictReason::MultiplePathCandidates));
        assert_eq!(diagnostics.implicated_watchables, vec!["movie:1", "movie:2"]);
        assert_eq!(diagnostics.ownership.as_deref(), Some("managed"));
        assert_eq!(diagnostics.matched_root.as_deref(), Some("/data"));
        assert_eq!(diagnostics.provenance.discovery, DEFAULT_DISCOVERY_PROVENANCE);
        assert_eq!(diagnostics.recheck.disposition, RecheckDisposition::NotEligible);
        assert_eq!(diagnostics.first_pass.status, MappingStatus::AmbiguousConflict);
    }

    #[test]
    fn test_rollup_worst_status_counts_and_samples() {
        let verified = diagnostics_with(MappingStatus::VerifiedTvStructure);
        let unresolved = diagnostics_with(MappingStatus::Unresolved);

        let mut children: Vec<(WatchableRef, Option<&MappingDiagnostics>)> = Vec::new();
        for id in (1..=12).rev() {
            children.push((WatchableRef::episode(id), Some(&verified)));
        }
        children.push((WatchableRef::episode(99), Some(&unresolved)));
        children.push((WatchableRef::episode(50), None));

        let rollup = RollupDiagnostics::from_children(children, DEFAULT_ROLLUP_SAMPLE_LIMIT);
        assert_eq!(rollup.child_count, 14);
        assert_eq!(rollup.unmapped_children, 1);
        assert_eq!(rollup.worst_status, Some(MappingStatus::Unresolved));
        assert_eq!(rollup.status_counts[&MappingStatus::VerifiedTvStructure], 12);
        assert_eq!(rollup.samples[&MappingStatus::Unresolved], vec!["episode:99"]);
    }

    #[test]
    fn test_rollup_samples_sort_ids_numerically() {
        let verified = diagnostics_with(MappingStatus::VerifiedTvStructure);
        let children: Vec<(WatchableRef, Option<&MappingDiagnostics>)> =
            (1..=12).rev().map(|id| (WatchableRef::episode(id), Some(&verified))).collect();

        let rollup = RollupDiagnostics::from_children(children, DEFAULT_ROLLUP_SAMPLE_LIMIT);
        let expected: Vec<String> = (1..=10).map(|id| WatchableRef::episode(id).to_string()).collect();
        assert_eq!(rollup.samples[&MappingStatus::VerifiedTvStructure], expected);
    }

    #[test]
    fn test_rollup_of_nothing_has_no_worst_status() {
        let rollup = RollupDiagnostics::from_children(Vec::<(WatchableRef, Option<&MappingDiagnostics>)>::new(), 10);
        assert_eq!(rollup.worst_status, None);
        assert_eq!(rollup.child_count, 0);
    }
}
