use super::{open_catalog, styled_table};
use crate::output::{Output, OutputFormat};
use color_eyre::eyre::eyre;
use color_eyre::Result;
use comfy_table::Cell;
use serde_json::json;
use std::path::PathBuf;
use watchmap_config::PathManager;
use watchmap_core::{CatalogStore, RollupDiagnostics};
use watchmap_models::ShowId;

pub async fn run_rollup(show_id: i64, sample_limit: usize, catalog_dir: Option<PathBuf>, output: &Output) -> Result<()> {
    let path_manager = PathManager::default();
    let catalog = open_catalog(&path_manager, catalog_dir)?;
    let show = catalog
        .show(ShowId(show_id))
        .ok_or_else(|| eyre!("Show {} is not in the catalog", show_id))?;
    let rollup = show_rollup(&catalog, ShowId(show_id), sample_limit);

    match output.format() {
        OutputFormat::Human => {
            let worst = rollup.worst_status.map(|s| s.code()).unwrap_or("none");
            output.info(format!(
                "{}: {} episode(s), {} never mapped, worst status {}",
                show.title, rollup.child_count, rollup.unmapped_children, worst
            ));
            let mut table = styled_table(vec!["Status", "Episodes", "Sample"]);
            for (status, count) in &rollup.status_counts {
                let sample = rollup.samples.get(status).map(|ids| ids.join(", ")).unwrap_or_default();
                table.add_row(vec![Cell::new(status.code()), Cell::new(count), Cell::new(sample)]);
            }
            output.table(&table);
        }
        OutputFormat::Json | OutputFormat::JsonPretty => {
            output.json(&json!({
                "show_id": show_id,
                "title": show.title,
                "rollup": rollup,
            }));
        }
    }
    Ok(())
}

/// Rollup over a show's episodes, keyed by episode id
fn show_rollup(catalog: &CatalogStore, show: ShowId, sample_limit: usize) -> RollupDiagnostics {
    let children = catalog
        .episodes_of(show)
        .into_iter()
        .map(|episode| (episode.reference, episode.mapping.mapping_diagnostics.as_ref()));
    RollupDiagnostics::from_children(children, sample_limit)
}
