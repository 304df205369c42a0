use super::styled_table;
use crate::output::{Output, OutputFormat};
use color_eyre::eyre::eyre;
use color_eyre::Result;
use comfy_table::Cell;
use owo_colors::OwoColorize;
use serde_json::{json, Map, Value};
use watchmap_config::PathManager;
use watchmap_core::{FileStateStore, MappingStateStore};

pub async fn run_state(integrations: Vec<String>, output: &Output) -> Result<()> {
    let path_manager = PathManager::default();
    let store = FileStateStore::new(&path_manager.state_dir())
        .map_err(|e| eyre!("Failed to open state directory: {}", e))?;

    let names = if integrations.is_empty() {
        store.integrations().map_err(|e| eyre!("Failed to list state files: {}", e))?
    } else {
        integrations
    };
    if names.is_empty() {
        output.info("No traversal state recorded yet");
        return Ok(());
    }

    let mut documents = Map::new();
    for name in &names {
        let state = store
            .load(name)
            .map_err(|e| eyre!("Failed to load state for {}: {}", name, e))?;

        match output.format() {
            OutputFormat::Human => {
                let bootstrap = match state.library_mapping_bootstrap_completed_at {
                    Some(at) => format!("bootstrap completed {}", at.to_rfc3339()).green().to_string(),
                    None => "bootstrapping".yellow().to_string(),
                };
                let last_run = state
                    .last_run_at
                    .map(|at| at.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string());
                output.info(format!("{} ({}, last run {})", name.bold(), bootstrap, last_run));

                let mut table = styled_table(vec!["Library", "Next start", "Cycles", "Last completed"]);
                for (library_id, cursor) in &state.library_mapping_state {
                    table.add_row(vec![
                        Cell::new(library_id),
                        Cell::new(cursor.next_start),
                        Cell::new(cursor.completed_cycle_count),
                        Cell::new(
                            cursor
                                .last_completed_at
                                .map(|at| at.to_rfc3339())
                                .unwrap_or_default(),
                        ),
                    ]);
                }
                output.table(&table);
            }
            OutputFormat::Json | OutputFormat::JsonPretty => {
                let value = serde_json::to_value(&state)
                    .map_err(|e| eyre!("Failed to serialize state for {}: {}", name, e))?;
                documents.insert(name.clone(), value);
            }
        }
    }

    if output.format() != OutputFormat::Human {
        output.json(&json!({ "integrations": Value::Object(documents) }));
    }
    Ok(())
}
