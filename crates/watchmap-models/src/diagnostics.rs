use serde::{Deserialize, Serialize};
use crate::{ConflictReason, MappingStatus, MappingStrategy, MatchStep};

pub const DIAGNOSTICS_SCHEMA_VERSION: u32 = 1;

/// Candidate counts reported by each signal resolver
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CandidateCounts {
    pub path: usize,
    pub path_expected_kind: usize,
    pub path_kind_mismatch: bool,
    pub external_ids: usize,
    pub tv_structure: usize,
    pub title_year: usize,
}

/// Outcome of one evaluation pass (first pass or recheck)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PassSummary {
    pub status: MappingStatus,
    pub selected_step: Option<MatchStep>,
    pub conflict_reason: Option<ConflictReason>,
    pub candidates: CandidateCounts,
    #[serde(default)]
    pub tv_structure_note: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecheckDisposition {
    NotEligible,
    Attempted,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecheckSummary {
    pub disposition: RecheckDisposition,
    #[serde(default)]
    pub skip_reason: Option<String>,
    pub failed: bool,
    pub show_enrichment_used: bool,
    pub episode_enrichment_fallback: bool,
    #[serde(default)]
    pub pass: Option<PassSummary>,
}

impl RecheckSummary {
    pub fn not_eligible() -> Self {
        Self {
            disposition: RecheckDisposition::NotEligible,
            skip_reason: None,
            failed: false,
            show_enrichment_used: false,
            episode_enrichment_fallback: false,
            pass: None,
        }
    }
}

/// Where each contributing piece of data came from
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiagnosticsProvenance {
    pub discovery: String,
    #[serde(default)]
    pub item_enrichment: Option<String>,
    #[serde(default)]
    pub show_enrichment: Option<String>,
}

/// Persisted explanation of how a mapping decision was reached.
///
/// Contains no timestamps so that re-running over unchanged input yields an
/// identical record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MappingDiagnostics {
    pub schema_version: u32,
    pub attempt_order: Vec<MatchStep>,
    pub status: MappingStatus,
    pub strategy: MappingStrategy,
    pub selected_step: Option<MatchStep>,
    pub conflict_reason: Option<ConflictReason>,
    #[serde(default)]
    pub implicated_watchables: Vec<String>,
    pub identity_overwrite_allowed: bool,
    #[serde(default)]
    pub canonical_path: Option<String>,
    #[serde(default)]
    pub ownership: Option<String>,
    #[serde(default)]
    pub matched_root: Option<String>,
    pub first_pass: PassSummary,
    pub recheck: RecheckSummary,
    pub provenance: DiagnosticsProvenance,
}
