use std::collections::BTreeSet;
use watchmap_models::{ConflictReason, MappingStatus, MappingStrategy, MatchStep, MediaType, WatchableRef};

use crate::caches::RunCaches;
use crate::context::MatchContext;
use crate::repository::WatchableRepository;
use crate::resolvers::{resolve_signals, SignalResults};

/// Transient outcome of evaluating one row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingResolution {
    pub status: MappingStatus,
    pub strategy: MappingStrategy,
    pub selected_step: Option<MatchStep>,
    pub selected_watchable: Option<WatchableRef>,
    pub conflict_reason: Option<ConflictReason>,
    pub allow_overwrite_rating_key: bool,
    /// Watchables a conflict points at, sorted
    pub implicated: Vec<WatchableRef>,
}

impl MappingResolution {
    pub fn matched(step: MatchStep, watchable: WatchableRef) -> Self {
        let status = step.status();
        Self {
            status,
            strategy: status.strategy(),
            selected_step: Some(step),
            selected_watchable: Some(watchable),
            conflict_reason: None,
            allow_overwrite_rating_key: false,
            implicated: vec![watchable],
        }
    }

    pub fn conflict(reason: ConflictReason, implicated: impl IntoIterator<Item = WatchableRef>) -> Self {
        let implicated: BTreeSet<WatchableRef> = implicated.into_iter().collect();
        Self {
            status: MappingStatus::AmbiguousConflict,
            strategy: MappingStrategy::Conflict,
            selected_step: None,
            selected_watchable: None,
            conflict_reason: Some(reason),
            allow_overwrite_rating_key: false,
            implicated: implicated.into_iter().collect(),
        }
    }

    pub fn with_status(status: MappingStatus) -> Self {
        Self {
            status,
            strategy: status.strategy(),
            selected_step: None,
            selected_watchable: None,
            conflict_reason: None,
            allow_overwrite_rating_key: false,
            implicated: Vec::new(),
        }
    }

    pub fn unresolved() -> Self {
        Self::with_status(MappingStatus::Unresolved)
    }

    /// Watchables a commit should touch: the selected one, else every
    /// implicated candidate.
    pub fn persistence_targets(&self) -> Vec<WatchableRef> {
        match self.selected_watchable {
            Some(selected) => vec![selected],
            None => self.implicated.clone(),
        }
    }
}

/// A context together with what the resolvers made of it
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub context: MatchContext,
    pub signals: SignalResults,
    pub resolution: MappingResolution,
}

impl Evaluation {
    pub fn status(&self) -> MappingStatus {
        self.resolution.status
    }
}

/// Resolve all signals for `ctx` and combine them
pub fn evaluate_context(
    ctx: MatchContext,
    repo: &dyn WatchableRepository,
    caches: &mut RunCaches,
) -> Evaluation {
    let signals = resolve_signals(&ctx, repo, caches);
    let resolution = evaluate(ctx.media_type, &signals);
    Evaluation {
        context: ctx,
        signals,
        resolution,
    }
}

/// Combine resolver outputs. Conflicts are checked in a fixed order and the
/// first hit wins; otherwise the highest-priority unique step is selected.
pub fn evaluate(media_type: MediaType, signals: &SignalResults) -> MappingResolution {
    let path = &signals.path;
    let ids = &signals.external_ids;
    let tv = &signals.tv_structure;

    if path.expected_candidate_count() > 1 || path.candidate_count() > 1 {
        return MappingResolution::conflict(ConflictReason::MultiplePathCandidates, path.candidates.clone());
    }
    if path.mismatch_present {
        return MappingResolution::conflict(ConflictReason::TypeMismatch, path.candidates.clone());
    }
    if ids.candidate_count() > 1 {
        return MappingResolution::conflict(
            ConflictReason::MultipleExternalIdCandidates,
            ids.candidates.clone(),
        );
    }
    if let Some(reason) = tv.conflict_reason {
        return MappingResolution::conflict(reason, tv.candidates.clone());
    }

    // Title/year never takes part in disagreement checks
    let strong: Vec<(MatchStep, WatchableRef)> = [
        (MatchStep::Path, path.unique_watchable()),
        (MatchStep::ExternalIds, ids.unique_watchable()),
        (MatchStep::TvStructure, tv.unique_watchable()),
    ]
    .into_iter()
    .filter_map(|(step, winner)| winner.map(|w| (step, w)))
    .collect();

    let distinct: BTreeSet<WatchableRef> = strong.iter().map(|(_, w)| *w).collect();
    if distinct.len() > 1 {
        return MappingResolution::conflict(ConflictReason::StrongSignalDisagreement, distinct);
    }

    if let Some(&(step, winner)) = strong.first() {
        if winner.kind != media_type.expected_kind() {
            return MappingResolution::conflict(ConflictReason::TypeMismatch, [winner]);
        }
        return MappingResolution::matched(step, winner);
    }

    match (media_type, signals.title_year.unique_watchable()) {
        (MediaType::Movie, Some(winner)) => MappingResolution::matched(MatchStep::TitleYear, winner),
        (MediaType::Movie, None) | (MediaType::Episode, _) => MappingResolution::unresolved(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolvers::{ExternalIdResolution, PathResolution, TitleYearResolution, TvStructureResolution};

    fn path_with(candidates: Vec<WatchableRef>, expected: watchmap_models::WatchableKind) -> PathResolution {
        let expected_candidates: Vec<WatchableRef> =
            candidates.iter().copied().filter(|w| w.kind == expected).collect();
        PathResolution {
            mismatch_present: !candidates.is_empty() && expected_candidates.is_empty(),
            candidates,
            expected_candidates,
        }
    }

    fn no_signals() -> SignalResults {
        SignalResults::default()
    }

    #[test]
    fn test_unique_path_wins() {
        let mut signals = no_signals();
        signals.path = path_with(vec![WatchableRef::movie(1)], watchmap_models::WatchableKind::Movie);
        signals.title_year = TitleYearResolution { candidates: vec![WatchableRef::movie(2)] };

        let resolution = evaluate(MediaType::Movie, &signals);
        assert_eq!(resolution.status, MappingStatus::VerifiedPath);
        assert_eq!(resolution.strategy, MappingStrategy::PathMatch);
        assert_eq!(resolution.selected_step, Some(MatchStep::Path));
        assert_eq!(resolution.selected_watchable, Some(WatchableRef::movie(1)));
        assert_eq!(resolution.conflict_reason, None);
    }

    #[test]
    fn test_multiple_path_candidates_beats_everything() {
        let mut signals = no_signals();
        signals.path = path_with(
            vec![WatchableRef::movie(1), WatchableRef::movie(2)],
            watchmap_models::WatchableKind::Movie,
        );
        signals.external_ids = ExternalIdResolution {
            candidates: vec![WatchableRef::movie(3), WatchableRef::movie(4)],
        };

        let resolution = evaluate(MediaType::Movie, &signals);
        assert_eq!(resolution.conflict_reason, Some(ConflictReason::MultiplePathCandidates));
        assert_eq!(resolution.implicated, vec![WatchableRef::movie(1), WatchableRef::movie(2)]);
        assert_eq!(resolution.persistence_targets().len(), 2);
    }

    #[test]
    fn test_path_kind_mismatch() {
        let mut signals = no_signals();
        signals.path = path_with(vec![WatchableRef::episode(9)], watchmap_models::WatchableKind::Movie);

        let resolution = evaluate(MediaType::Movie, &signals);
        assert_eq!(resolution.status, MappingStatus::AmbiguousConflict);
        assert_eq!(resolution.conflict_reason, Some(ConflictReason::TypeMismatch));
    }

    #[test]
    fn test_multiple_external_ids_before_tv_reason() {
        let mut signals = no_signals();
        signals.external_ids = ExternalIdResolution {
            candidates: vec![WatchableRef::episode(1), WatchableRef::episode(2)],
        };
        signals.tv_structure = TvStructureResolution {
            conflict_reason: Some(ConflictReason::MultipleEpisodeCandidates),
            ..Default::default()
        };

        let resolution = evaluate(MediaType::Episode, &signals);
        assert_eq!(resolution.conflict_reason, Some(ConflictReason::MultipleExternalIdCandidates));
    }

    #[test]
    fn test_tv_reason_propagated_verbatim() {
        let mut signals = no_signals();
        signals.tv_structure = TvStructureResolution {
            conflict_reason: Some(ConflictReason::StrongSignalDisagreement),
            ..Default::default()
        };
        let resolution = evaluate(MediaType::Episode, &signals);
        assert_eq!(resolution.conflict_reason, Some(ConflictReason::StrongSignalDisagreement));
        assert!(resolution.persistence_targets().is_empty());
    }

    #[test]
    fn test_strong_winners_disagree() {
        let mut signals = no_signals();
        signals.path = path_with(vec![WatchableRef::episode(1)], watchmap_models::WatchableKind::Episode);
        signals.tv_structure = TvStructureResolution {
            candidates: vec![WatchableRef::episode(2)],
            ..Default::default()
        };

        let resolution = evaluate(MediaType::Episode, &signals);
        assert_eq!(resolution.conflict_reason, Some(ConflictReason::StrongSignalDisagreement));
        assert_eq!(resolution.implicated, vec![WatchableRef::episode(1), WatchableRef::episode(2)]);
    }

    #[test]
    fn test_title_year_does_not_disagree() {
        let mut signals = no_signals();
        signals.external_ids = ExternalIdResolution { candidates: vec![WatchableRef::movie(1)] };
        signals.title_year = TitleYearResolution { candidates: vec![WatchableRef::movie(2)] };

        let resolution = evaluate(MediaType::Movie, &signals);
        assert_eq!(resolution.status, MappingStatus::VerifiedExternalIds);
        assert_eq!(resolution.selected_watchable, Some(WatchableRef::movie(1)));
    }

    #[test]
    fn test_single_strong_winner_of_wrong_kind() {
        let mut signals = no_signals();
        signals.external_ids = ExternalIdResolution { candidates: vec![WatchableRef::episode(5)] };

        let resolution = evaluate(MediaType::Movie, &signals);
        assert_eq!(resolution.conflict_reason, Some(ConflictReason::TypeMismatch));
        assert_eq!(resolution.implicated, vec![WatchableRef::episode(5)]);
    }

    #[test]
    fn test_agreeing_signals_pick_highest_priority_step() {
        let mut signals = no_signals();
        signals.path = path_with(vec![WatchableRef::episode(1)], watchmap_models::WatchableKind::Episode);
        signals.external_ids = ExternalIdResolution { candidates: vec![WatchableRef::episode(1)] };
        signals.tv_structure = TvStructureResolution {
            candidates: vec![WatchableRef::episode(1)],
            ..Default::default()
        };

        let resolution = evaluate(MediaType::Episode, &signals);
        assert_eq!(resolution.status, MappingStatus::VerifiedPath);
    }

    #[test]
    fn test_title_year_is_provisional_and_nothing_is_unresolved() {
        let mut signals = no_signals();
        signals.title_year = TitleYearResolution { candidates: vec![WatchableRef::movie(7)] };
        let provisional = evaluate(MediaType::Movie, &signals);
        assert_eq!(provisional.status, MappingStatus::ProvisionalTitleYear);
        assert_eq!(provisional.strategy, MappingStrategy::TitleYearMatch);

        let unresolved = evaluate(MediaType::Movie, &no_signals());
        assert_eq!(unresolved.status, MappingStatus::Unresolved);
        assert_eq!(unresolved.strategy, MappingStrategy::NoMatch);
        assert!(unresolved.persistence_targets().is_empty());
    }
}
