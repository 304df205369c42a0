use crate::output::Output;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use watchmap_config::PathManager;
use watchmap_core::{FileStateStore, MappingStateStore};

pub async fn run_clear(state: bool, integrations: Vec<String>, output: &Output) -> Result<()> {
    if !state {
        output.warn("No clear option specified. Use --state");
        output.info("\nExample: watchmap clear --state --integration plex-main");
        return Ok(());
    }

    let path_manager = PathManager::default();
    let store = FileStateStore::new(&path_manager.state_dir())
        .map_err(|e| eyre!("Failed to open state directory: {}", e))?;
    clear_state(&store, integrations, output)
}

/// Reset cursors and the bootstrap marker; the next sync bootstraps again
fn clear_state(store: &FileStateStore, integrations: Vec<String>, output: &Output) -> Result<()> {
    let names = if integrations.is_empty() {
        store.integrations().map_err(|e| eyre!("Failed to list state files: {}", e))?
    } else {
        integrations
    };

    if names.is_empty() {
        output.info("No traversal state found to clear");
        return Ok(());
    }

    for name in &names {
        store
            .clear(name)
            .map_err(|e| eyre!("Failed to clear state for {}: {}", name, e))?;
        output.success(format!("Cleared traversal state for {}", name));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputFormat;
    use tempfile::TempDir;
    use watchmap_models::IntegrationMappingState;

    #[test]
    fn test_clear_only_named_integrations() {
        let temp = TempDir::new().unwrap();
        let store = FileStateStore::new(temp.path()).unwrap();
        let mut state = IntegrationMappingState::default();
        state.last_run_at = Some(chrono::Utc::now());
        store.save("plex-a", &state).unwrap();
        store.save("plex-b", &state).unwrap();

        let output = Output::new(OutputFormat::Human, true);
        clear_state(&store, vec!["plex-a".to_string()], &output).unwrap();
        assert_eq!(store.integrations().unwrap(), vec!["plex-b".to_string()]);

        clear_state(&store, Vec::new(), &output).unwrap();
        assert!(store.integrations().unwrap().is_empty());
    }
}
