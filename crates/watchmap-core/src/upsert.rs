use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use watchmap_models::{DiscoveryRow, MappingDiagnostics, MappingState, WatchableRef};

use crate::evaluator::MappingResolution;
use crate::repository::{IdentityUpdate, WatchableStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Written { status_changed: bool, identity_written: bool },
    Unchanged,
}

/// Apply a final resolution to one watchable.
///
/// Writes nothing when status, strategy, diagnostics and identity already
/// match. `mapping_status_changed_at` only moves when the status does.
pub fn upsert_mapping(
    store: &mut dyn WatchableStore,
    target: WatchableRef,
    resolution: &MappingResolution,
    diagnostics: &MappingDiagnostics,
    row: &DiscoveryRow,
    now: DateTime<Utc>,
) -> Result<UpsertOutcome> {
    let stored = store
        .mapping_state(target)
        .ok_or_else(|| anyhow!("watchable {} not found in catalog", target))?;
    let stored_identity = store.identity(target).unwrap_or_default();

    let status_changed = stored.mapping_status_code != Some(resolution.status);
    let next = MappingState {
        mapping_status_code: Some(resolution.status),
        mapping_strategy: Some(resolution.strategy),
        mapping_status_changed_at: if status_changed {
            Some(now)
        } else {
            stored.mapping_status_changed_at
        },
        mapping_diagnostics: Some(diagnostics.clone()),
    };

    let identity = identity_update(resolution, target, row).filter(|update| {
        stored_identity.plex_rating_key.as_deref() != Some(update.plex_rating_key.as_str())
            || (update.plex_guid.is_some() && stored_identity.plex_guid != update.plex_guid)
    });

    if next == stored && identity.is_none() {
        return Ok(UpsertOutcome::Unchanged);
    }

    store.commit_mapping(target, &next, identity.as_ref())?;
    Ok(UpsertOutcome::Written {
        status_changed,
        identity_written: identity.is_some(),
    })
}

/// Identity fields are only written onto the selected watchable of a
/// verified match that passed the overwrite rule.
fn identity_update(resolution: &MappingResolution, target: WatchableRef, row: &DiscoveryRow) -> Option<IdentityUpdate> {
    if !resolution.status.is_verified()
        || !resolution.allow_overwrite_rating_key
        || resolution.selected_watchable != Some(target)
    {
        return None;
    }
    Some(IdentityUpdate {
        plex_rating_key: row.rating_key()?.to_string(),
        plex_guid: row.guid().map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogStore;
    use crate::context::MatchContext;
    use crate::diagnostics::build_diagnostics;
    use crate::evaluator::Evaluation;
    use crate::finalize::finalize;
    use crate::paths::PathPolicy;
    use crate::recheck::RecheckOutcome;
    use crate::repository::WatchableRepository;
    use crate::resolvers::SignalResults;
    use chrono::Duration;
    use watchmap_models::{MappingStatus, MatchStep, Watchable};

    fn diagnostics_for(row: &DiscoveryRow, resolution: &MappingResolution) -> MappingDiagnostics {
        let first = Evaluation {
            context: MatchContext::build(row, None, None, &PathPolicy::default()),
            signals: SignalResults::default(),
            resolution: resolution.clone(),
        };
        let recheck = RecheckOutcome::not_eligible();
        build_diagnostics(row, &first, &recheck, &finalize(&first, &recheck))
    }

    #[test]
    fn test_upsert_writes_identity_and_is_idempotent() {
        let mut catalog = CatalogStore::new();
        catalog.insert_watchable(Watchable::movie(1, "Heat", Some(1995)));
        let mut row = DiscoveryRow::movie("Heat", Some(1995));
        row.plex_rating_key = Some("B".to_string());
        row.plex_guid = Some("plex://movie/abc".to_string());

        let mut resolution = MappingResolution::matched(MatchStep::Path, WatchableRef::movie(1));
        resolution.allow_overwrite_rating_key = true;
        let diagnostics = diagnostics_for(&row, &resolution);
        let t0 = Utc::now();

        let first = upsert_mapping(&mut catalog, WatchableRef::movie(1), &resolution, &diagnostics, &row, t0).unwrap();
        assert_eq!(first, UpsertOutcome::Written { status_changed: true, identity_written: true });

        let identity = catalog.identity(WatchableRef::movie(1)).unwrap();
        assert_eq!(identity.plex_rating_key.as_deref(), Some("B"));
        assert_eq!(identity.plex_guid.as_deref(), Some("plex://movie/abc"));

        let later = t0 + Duration::minutes(5);
        let second = upsert_mapping(&mut catalog, WatchableRef::movie(1), &resolution, &diagnostics, &row, later).unwrap();
        assert_eq!(second, UpsertOutcome::Unchanged);
        let state = catalog.mapping_state(WatchableRef::movie(1)).unwrap();
        assert_eq!(state.mapping_status_changed_at, Some(t0));
    }

    #[test]
    fn test_changed_at_only_moves_with_status() {
        let mut catalog = CatalogStore::new();
        catalog.insert_watchable(Watchable::movie(1, "Heat", Some(1995)));
        let row = DiscoveryRow::movie("Heat", Some(1995));
        let resolution = MappingResolution::matched(MatchStep::TitleYear, WatchableRef::movie(1));
        let t0 = Utc::now();

        upsert_mapping(&mut catalog, WatchableRef::movie(1), &resolution, &diagnostics_for(&row, &resolution), &row, t0)
            .unwrap();

        // Same status, different diagnostics: written, timestamp kept
        let mut other_row = row.clone();
        other_row.provenance = Some("elsewhere".to_string());
        let outcome = upsert_mapping(
            &mut catalog,
            WatchableRef::movie(1),
            &resolution,
            &diagnostics_for(&other_row, &resolution),
            &other_row,
            t0 + Duration::hours(1),
        )
        .unwrap();
        assert_eq!(outcome, UpsertOutcome::Written { status_changed: false, identity_written: false });
        let state = catalog.mapping_state(WatchableRef::movie(1)).unwrap();
        assert_eq!(state.mapping_status_changed_at, Some(t0));
        assert_eq!(state.mapping_status_code, Some(MappingStatus::ProvisionalTitleYear));
    }

    #[test]
    fn test_provisional_never_writes_identity() {
        let mut catalog = CatalogStore::new();
        catalog.insert_watchable(Watchable::movie(1, "Heat", Some(1995)));
        let mut row = DiscoveryRow::movie("Heat", Some(1995));
        row.plex_rating_key = Some("B".to_string());
        let mut resolution = MappingResolution::matched(MatchStep::TitleYear, WatchableRef::movie(1));
        resolution.allow_overwrite_rating_key = true;

        let outcome = upsert_mapping(
            &mut catalog,
            WatchableRef::movie(1),
            &resolution,
            &diagnostics_for(&row, &resolution),
            &row,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(outcome, UpsertOutcome::Written { status_changed: true, identity_written: false });
        assert_eq!(catalog.identity(WatchableRef::movie(1)).unwrap().plex_rating_key, None);
    }

    #[test]
    fn test_missing_watchable_is_an_error() {
        let mut catalog = CatalogStore::new();
        let row = DiscoveryRow::movie("Heat", Some(1995));
        let resolution = MappingResolution::unresolved();
        let result = upsert_mapping(
            &mut catalog,
            WatchableRef::movie(404),
            &resolution,
            &diagnostics_for(&row, &resolution),
            &row,
            Utc::now(),
        );
        assert!(result.is_err());
    }
}
