use serde::{Deserialize, Serialize};
use std::fmt;

/// Mapping status of a watchable, owned exclusively by the mapping engine
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum MappingStatus {
    VerifiedPath,
    VerifiedExternalIds,
    VerifiedTvStructure,
    ProvisionalTitleYear,
    ExternalSourceNotManaged,
    Unresolved,
    AmbiguousConflict,
}

impl MappingStatus {
    pub const ALL: [MappingStatus; 7] = [
        MappingStatus::VerifiedPath,
        MappingStatus::VerifiedExternalIds,
        MappingStatus::VerifiedTvStructure,
        MappingStatus::ProvisionalTitleYear,
        MappingStatus::ExternalSourceNotManaged,
        MappingStatus::Unresolved,
        MappingStatus::AmbiguousConflict,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            MappingStatus::VerifiedPath => "verified_path",
            MappingStatus::VerifiedExternalIds => "verified_external_ids",
            MappingStatus::VerifiedTvStructure => "verified_tv_structure",
            MappingStatus::ProvisionalTitleYear => "provisional_title_year",
            MappingStatus::ExternalSourceNotManaged => "external_source_not_managed",
            MappingStatus::Unresolved => "unresolved",
            MappingStatus::AmbiguousConflict => "ambiguous_conflict",
        }
    }

    pub fn is_verified(&self) -> bool {
        matches!(
            self,
            MappingStatus::VerifiedPath
                | MappingStatus::VerifiedExternalIds
                | MappingStatus::VerifiedTvStructure
        )
    }

    /// First-pass statuses that qualify for a metadata recheck
    pub fn is_recheck_eligible(&self) -> bool {
        matches!(self, MappingStatus::ProvisionalTitleYear | MappingStatus::Unresolved)
    }

    /// Statuses an unresolved row adopts from a recheck
    pub fn is_resolving(&self) -> bool {
        self.is_verified() || *self == MappingStatus::AmbiguousConflict
    }

    /// Rank used for rollups: higher is worse
    pub fn severity(&self) -> u8 {
        match self {
            MappingStatus::VerifiedPath => 0,
            MappingStatus::VerifiedExternalIds => 1,
            MappingStatus::VerifiedTvStructure => 2,
            MappingStatus::ProvisionalTitleYear => 3,
            MappingStatus::ExternalSourceNotManaged => 4,
            MappingStatus::Unresolved => 5,
            MappingStatus::AmbiguousConflict => 6,
        }
    }

    /// Strategy recorded alongside a status
    pub fn strategy(&self) -> MappingStrategy {
        match self {
            MappingStatus::VerifiedPath => MappingStrategy::PathMatch,
            MappingStatus::VerifiedExternalIds => MappingStrategy::ExternalIdsMatch,
            MappingStatus::VerifiedTvStructure => MappingStrategy::TvStructureMatch,
            MappingStatus::ProvisionalTitleYear => MappingStrategy::TitleYearMatch,
            MappingStatus::ExternalSourceNotManaged => MappingStrategy::ExternalPath,
            MappingStatus::Unresolved => MappingStrategy::NoMatch,
            MappingStatus::AmbiguousConflict => MappingStrategy::Conflict,
        }
    }
}

impl fmt::Display for MappingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MappingStrategy {
    PathMatch,
    ExternalIdsMatch,
    TvStructureMatch,
    TitleYearMatch,
    Conflict,
    NoMatch,
    ExternalPath,
}

impl MappingStrategy {
    pub fn code(&self) -> &'static str {
        match self {
            MappingStrategy::PathMatch => "path_match",
            MappingStrategy::ExternalIdsMatch => "external_ids_match",
            MappingStrategy::TvStructureMatch => "tv_structure_match",
            MappingStrategy::TitleYearMatch => "title_year_match",
            MappingStrategy::Conflict => "conflict",
            MappingStrategy::NoMatch => "no_match",
            MappingStrategy::ExternalPath => "external_path",
        }
    }
}

/// Why a row ended in `ambiguous_conflict`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    MultiplePathCandidates,
    TypeMismatch,
    MultipleExternalIdCandidates,
    MultipleEpisodeCandidates,
    StrongSignalDisagreement,
    IdConflictsWithProvisional,
    PlexRatingKeyConflict,
}

impl ConflictReason {
    pub fn code(&self) -> &'static str {
        match self {
            ConflictReason::MultiplePathCandidates => "multiple_path_candidates",
            ConflictReason::TypeMismatch => "type_mismatch",
            ConflictReason::MultipleExternalIdCandidates => "multiple_external_id_candidates",
            ConflictReason::MultipleEpisodeCandidates => "multiple_episode_candidates",
            ConflictReason::StrongSignalDisagreement => "strong_signal_disagreement",
            ConflictReason::IdConflictsWithProvisional => "id_conflicts_with_provisional",
            ConflictReason::PlexRatingKeyConflict => "plex_rating_key_conflict",
        }
    }
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Matching steps, in fixed attempt order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum MatchStep {
    Path,
    ExternalIds,
    TvStructure,
    TitleYear,
}

impl MatchStep {
    pub const ATTEMPT_ORDER: [MatchStep; 4] = [
        MatchStep::Path,
        MatchStep::ExternalIds,
        MatchStep::TvStructure,
        MatchStep::TitleYear,
    ];

    /// Status awarded when this step produces the winning candidate
    pub fn status(&self) -> MappingStatus {
        match self {
            MatchStep::Path => MappingStatus::VerifiedPath,
            MatchStep::ExternalIds => MappingStatus::VerifiedExternalIds,
            MatchStep::TvStructure => MappingStatus::VerifiedTvStructure,
            MatchStep::TitleYear => MappingStatus::ProvisionalTitleYear,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_serialize_as_snake_case() {
        let json = serde_json::to_string(&MappingStatus::ExternalSourceNotManaged).unwrap();
        assert_eq!(json, "\"external_source_not_managed\"");
        for status in MappingStatus::ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.code()));
        }
    }

    #[test]
    fn test_conflict_reason_codes_match_serde() {
        let json = serde_json::to_string(&ConflictReason::PlexRatingKeyConflict).unwrap();
        assert_eq!(json, "\"plex_rating_key_conflict\"");
    }

    #[test]
    fn test_recheck_eligibility() {
        let eligible: Vec<MappingStatus> = MappingStatus::ALL
            .into_iter()
            .filter(|s| s.is_recheck_eligible())
            .collect();
        assert_eq!(eligible, vec![MappingStatus::ProvisionalTitleYear, MappingStatus::Unresolved]);
    }

    #[test]
    fn test_step_status_and_strategy() {
        assert_eq!(MatchStep::ExternalIds.status(), MappingStatus::VerifiedExternalIds);
        assert_eq!(MappingStatus::VerifiedExternalIds.strategy().code(), "external_ids_match");
    }
}
