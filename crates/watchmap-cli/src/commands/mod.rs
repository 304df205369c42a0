pub mod clear;
pub mod import;
pub mod rollup;
pub mod state;
pub mod sync;

use color_eyre::eyre::eyre;
use color_eyre::Result;
use comfy_table::{Attribute, Cell, Table};
use std::path::{Path, PathBuf};
use watchmap_config::{Config, PathManager};
use watchmap_core::{CatalogStorage, CatalogStore};

/// Load `config.toml`, falling back to defaults when none exists yet
pub fn load_config(path_manager: &PathManager, override_path: Option<&Path>) -> Result<Config> {
    let config_file = override_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| path_manager.config_file());

    if !config_file.exists() {
        if override_path.is_some() {
            return Err(eyre!("Config file not found: {}", config_file.display()));
        }
        tracing::warn!("No config file at {}, using defaults", config_file.display());
        return Ok(Config::default());
    }

    let config = Config::load_from_file(&config_file)
        .map_err(|e| eyre!("Failed to load config from {}: {}", config_file.display(), e))?;
    config
        .validate()
        .map_err(|e| eyre!("Invalid configuration in {}: {}", config_file.display(), e))?;
    Ok(config)
}

pub fn open_catalog(path_manager: &PathManager, catalog_dir: Option<PathBuf>) -> Result<CatalogStore> {
    let catalog_dir = catalog_dir.unwrap_or_else(|| path_manager.catalog_dir());
    std::fs::create_dir_all(&catalog_dir)
        .map_err(|e| eyre!("Failed to create catalog directory {}: {}", catalog_dir.display(), e))?;
    CatalogStore::open(CatalogStorage::new(&catalog_dir))
        .map_err(|e| eyre!("Failed to open catalog at {}: {}", catalog_dir.display(), e))
}

pub fn styled_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table.set_header(
        header
            .into_iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
            .collect::<Vec<_>>(),
    );
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS);
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_default_config_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let paths = PathManager::with_base(temp.path());
        let config = load_config(&paths, None).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        let temp = TempDir::new().unwrap();
        let paths = PathManager::with_base(temp.path());
        assert!(load_config(&paths, Some(&temp.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let temp = TempDir::new().unwrap();
        let paths = PathManager::with_base(temp.path());
        std::fs::write(
            paths.config_file(),
            "[[integrations]]\nname = \"a\"\nserver_url = \"\"\n",
        )
        .unwrap();
        assert!(load_config(&paths, None).is_err());
    }
}
