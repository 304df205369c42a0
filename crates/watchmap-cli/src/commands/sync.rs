use super::{load_config, open_catalog, styled_table};
use crate::output::{Output, OutputFormat};
use color_eyre::eyre::eyre;
use color_eyre::Result;
use comfy_table::Cell;
use std::path::{Path, PathBuf};
use watchmap_config::{CredentialStore, IntegrationKind, PathManager};
use watchmap_core::{run_mapping_sync, FileStateStore, MappingEngine, MappingRunSummary, PathPolicy, SyncOptions};
use watchmap_sources::{LibrarySource, PlexLibrarySource};

pub async fn run_sync(
    integrations: Vec<String>,
    catalog_dir: Option<PathBuf>,
    force_bootstrap: bool,
    config_path: Option<&Path>,
    output: &Output,
) -> Result<()> {
    tracing::debug!("Sync command started");

    let path_manager = PathManager::default();
    path_manager
        .ensure_directories()
        .map_err(|e| eyre!("Failed to create data directories: {}", e))?;
    let config = load_config(&path_manager, config_path)?;

    let selected = config.enabled_integrations(&integrations);
    for name in &integrations {
        if !selected.iter().any(|i| &i.name == name) {
            return Err(eyre!("Integration '{}' is not configured or not enabled", name));
        }
    }
    if selected.is_empty() {
        output.warn("No enabled integrations configured. Add one under [[integrations]] in config.toml");
        return Ok(());
    }

    let credentials_file = path_manager.credentials_file();
    let mut cred_store = CredentialStore::new(credentials_file.clone());
    cred_store
        .load()
        .map_err(|e| eyre!("Failed to load credentials from {}: {}", credentials_file.display(), e))?;

    let mut plex_sources = Vec::new();
    for integration in &selected {
        match integration.kind {
            IntegrationKind::Plex => {
                let token = cred_store
                    .get_plex_token(&integration.name)
                    .ok_or_else(|| eyre!("No Plex token stored for integration '{}'", integration.name))?;
                let source = PlexLibrarySource::new(&integration.name, token, &integration.server_url)
                    .map_err(|e| eyre!("Failed to create Plex client for '{}': {}", integration.name, e))?;
                plex_sources.push(source);
            }
        }
    }
    let sources: Vec<&dyn LibrarySource> = plex_sources.iter().map(|s| s as &dyn LibrarySource).collect();

    let mut catalog = open_catalog(&path_manager, catalog_dir)?;
    if catalog.is_empty() {
        output.warn("Catalog is empty; every row will end unresolved. Run `watchmap import` first");
    }
    let state_store = FileStateStore::new(&path_manager.state_dir())
        .map_err(|e| eyre!("Failed to open state directory: {}", e))?;

    let policy = PathPolicy::from_config(&config.mapping);
    let engine = MappingEngine::new(&policy, &config.budgets);
    let options = SyncOptions { force_bootstrap };

    let result = run_mapping_sync(&engine, &sources, &mut catalog, &state_store, &options).await;

    // Committed rows are already durable in the journal; folding them into
    // the snapshot is housekeeping
    if let Err(e) = catalog.compact() {
        output.warn(format!("Failed to compact catalog journal: {}", e));
    }

    let summary = result.map_err(|e| eyre!("Mapping sync stopped: {}", e))?;
    print_summary(&summary, output)?;

    if summary.is_success() {
        Ok(())
    } else {
        Err(eyre!("{} integration(s) failed", summary.errors.len()))
    }
}

fn print_summary(summary: &MappingRunSummary, output: &Output) -> Result<()> {
    match output.format() {
        OutputFormat::Human => {
            let mut table = styled_table(vec![
                "Integration",
                "Profile",
                "Rows",
                "Persisted",
                "Unchanged",
                "No target",
                "Recheck (att/skip/fail)",
                "Calls",
                "Bootstrap",
            ]);
            for report in &summary.integrations {
                let c = &report.counters;
                table.add_row(vec![
                    Cell::new(&report.integration),
                    Cell::new(report.profile.as_str()),
                    Cell::new(c.rows_processed),
                    Cell::new(c.rows_persisted),
                    Cell::new(c.rows_unchanged),
                    Cell::new(c.rows_without_target),
                    Cell::new(format!(
                        "{}/{}/{}",
                        c.metadata_recheck_attempted, c.metadata_recheck_skipped, c.metadata_recheck_failed
                    )),
                    Cell::new(c.metadata_calls + c.show_metadata_calls),
                    Cell::new(if report.bootstrap_completed { "completed" } else { "" }),
                ]);
            }
            output.table(&table);

            for report in &summary.integrations {
                let statuses: Vec<String> = report
                    .counters
                    .status_counts
                    .iter()
                    .map(|(status, count)| format!("{}={}", status.code(), count))
                    .collect();
                if !statuses.is_empty() {
                    output.info(format!("{}: {}", report.integration, statuses.join(", ")));
                }
                if report.row_budget_exhausted {
                    output.info(format!("{}: row budget reached, will resume next run", report.integration));
                }
            }
            for error in &summary.errors {
                output.error(error);
            }
            output.success(format!(
                "Mapping sync finished: {} integration(s) in {:?}",
                summary.integrations.len(),
                summary.duration
            ));
        }
        OutputFormat::Json | OutputFormat::JsonPretty => {
            let value = serde_json::to_value(summary)
                .map_err(|e| eyre!("Failed to serialize run summary: {}", e))?;
            output.json(&value);
        }
    }
    Ok(())
}
