use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Resumable traversal cursor for one (integration, library) pair
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LibraryCursor {
    #[serde(default)]
    pub next_start: usize,
    #[serde(default)]
    pub completed_cycle_count: u32,
    #[serde(default)]
    pub last_completed_at: Option<DateTime<Utc>>,
}

impl LibraryCursor {
    /// Move past a page that was not the last one
    pub fn advance(&mut self, next_start: usize) {
        self.next_start = next_start;
    }

    /// Record a full pass over the library and rewind to the start
    pub fn complete_cycle(&mut self, at: DateTime<Utc>) {
        self.next_start = 0;
        self.completed_cycle_count += 1;
        self.last_completed_at = Some(at);
    }
}

/// Persisted per-integration mapping state.
///
/// Read and written as one document so cursors, `last_run_at` and the
/// bootstrap marker always change together.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntegrationMappingState {
    #[serde(default)]
    pub library_mapping_state: BTreeMap<String, LibraryCursor>,
    #[serde(default)]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub library_mapping_bootstrap_completed_at: Option<DateTime<Utc>>,
}

impl IntegrationMappingState {
    pub fn cursor(&self, library_id: &str) -> LibraryCursor {
        self.library_mapping_state
            .get(library_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_bootstrap_complete(&self) -> bool {
        self.library_mapping_bootstrap_completed_at.is_some()
    }

    /// True when every listed library finished at least one full cycle
    pub fn all_cycles_completed<'a>(&self, library_ids: impl IntoIterator<Item = &'a str>) -> bool {
        let mut any = false;
        for library_id in library_ids {
            any = true;
            if self.cursor(library_id).completed_cycle_count == 0 {
                return false;
            }
        }
        any
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_cycle() {
        let mut cursor = LibraryCursor::default();
        cursor.advance(50);
        assert_eq!(cursor.next_start, 50);

        let now = Utc::now();
        cursor.complete_cycle(now);
        assert_eq!(cursor.next_start, 0);
        assert_eq!(cursor.completed_cycle_count, 1);
        assert_eq!(cursor.last_completed_at, Some(now));
    }

    #[test]
    fn test_state_round_trips_through_json_field_names() {
        let mut state = IntegrationMappingState::default();
        state.library_mapping_state.insert("1".to_string(), LibraryCursor { next_start: 10, ..Default::default() });
        let json = serde_json::to_value(&state).unwrap();
        assert!(json.get("library_mapping_state").is_some());
        assert!(json.get("library_mapping_bootstrap_completed_at").is_some());
        let back: IntegrationMappingState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn test_all_cycles_completed() {
        let mut state = IntegrationMappingState::default();
        assert!(!state.all_cycles_completed(Vec::<&str>::new()));
        state.library_mapping_state.insert("1".to_string(), LibraryCursor { completed_cycle_count: 1, ..Default::default() });
        assert!(state.all_cycles_completed(["1"]));
        assert!(!state.all_cycles_completed(["1", "2"]));
    }
}
