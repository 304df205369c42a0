use super::open_catalog;
use crate::output::{Output, OutputFormat};
use color_eyre::eyre::eyre;
use color_eyre::Result;
use serde_json::json;
use std::path::{Path, PathBuf};
use watchmap_config::PathManager;
use watchmap_core::CatalogInventory;

pub async fn run_import(from: &Path, catalog_dir: Option<PathBuf>, output: &Output) -> Result<()> {
    let path_manager = PathManager::default();
    let inventory = CatalogInventory::from_json_file(from).map_err(|e| eyre!("{:#}", e))?;

    let mut catalog = open_catalog(&path_manager, catalog_dir)?;
    let stats = catalog.merge_inventory(inventory);
    catalog
        .compact()
        .map_err(|e| eyre!("Failed to write catalog snapshot: {}", e))?;
    tracing::info!(
        shows = stats.shows,
        added = stats.watchables_added,
        updated = stats.watchables_updated,
        "Inventory imported"
    );

    match output.format() {
        OutputFormat::Human => {
            output.success(format!(
                "Imported {}: {} show(s), {} new and {} updated watchable(s); catalog now holds {} watchable(s)",
                from.display(),
                stats.shows,
                stats.watchables_added,
                stats.watchables_updated,
                catalog.len()
            ));
        }
        OutputFormat::Json | OutputFormat::JsonPretty => {
            output.json(&json!({
                "success": true,
                "shows": stats.shows,
                "watchables_added": stats.watchables_added,
                "watchables_updated": stats.watchables_updated,
                "catalog_watchables": catalog.len(),
                "catalog_shows": catalog.show_count(),
            }));
        }
    }
    Ok(())
}
