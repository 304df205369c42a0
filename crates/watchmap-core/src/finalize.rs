use watchmap_models::{ConflictReason, MappingStatus, MappingStrategy};

use crate::context::MatchContext;
use crate::evaluator::{Evaluation, MappingResolution};
use crate::recheck::RecheckOutcome;

/// Which pass the final resolution came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecidedBy {
    FirstPass,
    Recheck,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalDecision {
    pub resolution: MappingResolution,
    pub decided_by: DecidedBy,
}

impl FinalDecision {
    fn first_pass(resolution: MappingResolution) -> Self {
        Self { resolution, decided_by: DecidedBy::FirstPass }
    }

    fn recheck(resolution: MappingResolution) -> Self {
        Self { resolution, decided_by: DecidedBy::Recheck }
    }

    /// The context whose path and ownership describe the final decision
    pub fn context<'a>(&self, first_pass: &'a Evaluation, recheck: &'a RecheckOutcome) -> &'a MatchContext {
        match (self.decided_by, recheck.evaluation.as_ref()) {
            (DecidedBy::Recheck, Some(evaluation)) => &evaluation.context,
            _ => &first_pass.context,
        }
    }
}

/// Merge first pass and recheck by first-pass status
pub fn finalize(first_pass: &Evaluation, recheck: &RecheckOutcome) -> FinalDecision {
    let first = &first_pass.resolution;
    match first.status {
        MappingStatus::VerifiedPath
        | MappingStatus::VerifiedExternalIds
        | MappingStatus::VerifiedTvStructure
        | MappingStatus::AmbiguousConflict
        | MappingStatus::ExternalSourceNotManaged => FinalDecision::first_pass(first.clone()),
        MappingStatus::ProvisionalTitleYear => finalize_provisional(first, recheck.evaluation.as_ref()),
        MappingStatus::Unresolved => finalize_unresolved(first_pass, recheck.evaluation.as_ref()),
    }
}

fn finalize_provisional(first: &MappingResolution, recheck: Option<&Evaluation>) -> FinalDecision {
    let Some(recheck) = recheck else {
        return FinalDecision::first_pass(first.clone());
    };
    let provisional = first.selected_watchable;
    let rechecked = &recheck.resolution;

    match rechecked.status {
        MappingStatus::AmbiguousConflict => {
            let mut adopted = rechecked.clone();
            adopted.selected_watchable = provisional;
            adopted.implicated.extend(provisional);
            adopted.implicated.sort();
            adopted.implicated.dedup();
            FinalDecision::recheck(adopted)
        }
        MappingStatus::VerifiedPath | MappingStatus::VerifiedExternalIds => {
            if rechecked.selected_watchable == provisional {
                FinalDecision::recheck(rechecked.clone())
            } else {
                let mut conflict = MappingResolution::conflict(
                    ConflictReason::IdConflictsWithProvisional,
                    provisional.into_iter().chain(rechecked.selected_watchable),
                );
                conflict.selected_watchable = provisional;
                FinalDecision::recheck(conflict)
            }
        }
        _ => FinalDecision::first_pass(first.clone()),
    }
}

fn finalize_unresolved(first_pass: &Evaluation, recheck: Option<&Evaluation>) -> FinalDecision {
    if let Some(recheck) = recheck {
        match recheck.resolution.status {
            MappingStatus::VerifiedPath
            | MappingStatus::VerifiedExternalIds
            | MappingStatus::VerifiedTvStructure
            | MappingStatus::AmbiguousConflict => {
                return FinalDecision::recheck(recheck.resolution.clone());
            }
            _ => {}
        }
    }

    let latest = recheck.unwrap_or(first_pass);
    let no_strong_candidates = latest.signals.path.candidate_count() == 0
        && latest.signals.external_ids.candidate_count() == 0;
    if latest.context.is_external() && no_strong_candidates {
        let decided_by = if recheck.is_some() { DecidedBy::Recheck } else { DecidedBy::FirstPass };
        return FinalDecision {
            resolution: MappingResolution::with_status(MappingStatus::ExternalSourceNotManaged),
            decided_by,
        };
    }
    FinalDecision::first_pass(first_pass.resolution.clone())
}

/// Stored vs incoming rating key check, applied after finalization.
///
/// A differing non-blank stored key only yields to a path match; any other
/// status becomes a `plex_rating_key_conflict`.
pub fn apply_identity_rule(resolution: &mut MappingResolution, incoming_key: Option<&str>, stored_key: Option<&str>) {
    if resolution.selected_watchable.is_none() {
        resolution.allow_overwrite_rating_key = false;
        return;
    }

    match (incoming_key, stored_key) {
        (Some(incoming), Some(stored)) if incoming != stored => {
            if resolution.status == MappingStatus::VerifiedPath {
                resolution.allow_overwrite_rating_key = true;
            } else {
                resolution.status = MappingStatus::AmbiguousConflict;
                resolution.strategy = MappingStrategy::Conflict;
                resolution.selected_step = None;
                resolution.conflict_reason = Some(ConflictReason::PlexRatingKeyConflict);
                resolution.allow_overwrite_rating_key = false;
            }
        }
        (Some(_), _) => resolution.allow_overwrite_rating_key = true,
        (None, _) => resolution.allow_overwrite_rating_key = false,
    }
}
