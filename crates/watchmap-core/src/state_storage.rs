use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::{debug, warn};
use watchmap_config::validate_integration_name;
use watchmap_models::IntegrationMappingState;

use crate::repository::MappingStateStore;

/// One JSON document per integration under `state/`
#[derive(Clone)]
pub struct FileStateStore {
    state_dir: PathBuf,
}

impl FileStateStore {
    pub fn new(state_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_dir)?;
        Ok(Self {
            state_dir: state_dir.to_path_buf(),
        })
    }

    /// Names are used verbatim; anything that would need escaping is refused
    /// so two integrations can never share a file.
    fn state_path(&self, integration: &str) -> Result<PathBuf> {
        validate_integration_name(integration)?;
        Ok(self.state_dir.join(format!("{}.json", integration)))
    }

    /// Integrations that have persisted state, sorted
    pub fn integrations(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.state_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

impl MappingStateStore for FileStateStore {
    fn load(&self, integration: &str) -> Result<IntegrationMappingState> {
        let path = self.state_path(integration)?;
        if !path.exists() {
            debug!("No mapping state for {} yet", integration);
            return Ok(IntegrationMappingState::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read mapping state {:?}", path))?;
        match serde_json::from_str(&content) {
            Ok(state) => Ok(state),
            Err(e) => {
                // Unreadable state only costs a fresh bootstrap; keep the file for inspection
                let backup = path.with_extension("json.bak");
                warn!(
                    "Mapping state for {} is corrupt ({}). Moving it to {:?} and starting over.",
                    integration, e, backup
                );
                std::fs::rename(&path, &backup)?;
                Ok(IntegrationMappingState::default())
            }
        }
    }

    fn save(&self, integration: &str, state: &IntegrationMappingState) -> Result<()> {
        let path = self.state_path(integration)?;
        let json = serde_json::to_string_pretty(state)?;

        // Atomic write: temp file, then rename
        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, json)?;
        std::fs::rename(&temp_path, &path)?;
        debug!(
            "Saved mapping state for {} ({} libraries)",
            integration,
            state.library_mapping_state.len()
        );
        Ok(())
    }

    fn clear(&self, integration: &str) -> Result<()> {
        let path = self.state_path(integration)?;
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }
}

/// Process-local state store, mainly for tests and dry runs
#[derive(Default)]
pub struct MemoryStateStore {
    states: Mutex<HashMap<String, IntegrationMappingState>>,
    saves: AtomicUsize,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `save` calls so far
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl MappingStateStore for MemoryStateStore {
    fn load(&self, integration: &str) -> Result<IntegrationMappingState> {
        let states = self.states.lock().map_err(|_| anyhow!("state store lock poisoned"))?;
        Ok(states.get(integration).cloned().unwrap_or_default())
    }

    fn save(&self, integration: &str, state: &IntegrationMappingState) -> Result<()> {
        let mut states = self.states.lock().map_err(|_| anyhow!("state store lock poisoned"))?;
        states.insert(integration.to_string(), state.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn clear(&self, integration: &str) -> Result<()> {
        let mut states = self.states.lock().map_err(|_| anyhow!("state store lock poisoned"))?;
        states.remove(integration);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;
    use watchmap_models::LibraryCursor;

    fn sample_state() -> IntegrationMappingState {
        let mut state = IntegrationMappingState::default();
        state.library_mapping_state.insert(
            "1".to_string(),
            LibraryCursor {
                next_start: 200,
                completed_cycle_count: 1,
                last_completed_at: Some(Utc::now()),
            },
        );
        state.last_run_at = Some(Utc::now());
        state
    }

    #[test]
    fn test_file_store_save_load_clear() {
        let temp = TempDir::new().unwrap();
        let store = FileStateStore::new(temp.path()).unwrap();
        assert_eq!(store.load("plex-main").unwrap(), IntegrationMappingState::default());

        let state = sample_state();
        store.save("plex-main", &state).unwrap();
        assert_eq!(store.load("plex-main").unwrap(), state);
        assert_eq!(store.integrations().unwrap(), vec!["plex-main".to_string()]);
        assert!(!temp.path().join("plex-main.json.tmp").exists());

        store.clear("plex-main").unwrap();
        assert_eq!(store.load("plex-main").unwrap(), IntegrationMappingState::default());
    }

    #[test]
    fn test_corrupt_state_is_set_aside() {
        let temp = TempDir::new().unwrap();
        let store = FileStateStore::new(temp.path()).unwrap();
        std::fs::write(temp.path().join("plex-main.json"), "{not json").unwrap();

        assert_eq!(store.load("plex-main").unwrap(), IntegrationMappingState::default());
        assert!(temp.path().join("plex-main.json.bak").exists());
    }

    #[test]
    fn test_file_store_keeps_similar_names_apart() {
        let temp = TempDir::new().unwrap();
        let store = FileStateStore::new(temp.path()).unwrap();

        assert!(store.save("plex.main", &sample_state()).is_err());
        assert!(store.load("plex.main").is_err());
        assert_eq!(store.load("plex_main").unwrap(), IntegrationMappingState::default());
        assert!(store.integrations().unwrap().is_empty());
    }

    #[test]
    fn test_memory_store_counts_saves() {
        let store = MemoryStateStore::new();
        store.save("a", &sample_state()).unwrap();
        store.save("a", &sample_state()).unwrap();
        assert_eq!(store.save_count(), 2);
        assert!(store.load("a").unwrap().library_mapping_state.contains_key("1"));
        store.clear("a").unwrap();
        assert!(store.load("a").unwrap().library_mapping_state.is_empty());
    }
}
