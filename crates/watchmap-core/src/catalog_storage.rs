use anyhow::{Context, Result};
use bincode::{deserialize, serialize};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use watchmap_models::{MappingState, Show, Watchable, WatchableRef};

use crate::repository::IdentityUpdate;

/// Serializable form of the whole catalog
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogInventory {
    #[serde(default)]
    pub shows: Vec<Show>,
    #[serde(default)]
    pub watchables: Vec<Watchable>,
}

impl CatalogInventory {
    /// Read an inventory exported by upstream content sync (JSON)
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read inventory file {:?}", path))?;
        let inventory: CatalogInventory = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse inventory file {:?}", path))?;
        Ok(inventory)
    }
}

/// One committed row, as appended to the journal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub watchable: WatchableRef,
    pub mapping: MappingState,
    #[serde(default)]
    pub identity: Option<IdentityUpdate>,
}

/// Snapshot plus append-only journal on disk.
///
/// The snapshot is bincode with optional gzip, replaced atomically. Commits
/// between snapshots go to a JSON-lines journal so each row is durable on
/// its own.
pub struct CatalogStorage {
    snapshot_path: PathBuf,
    journal_path: PathBuf,
    use_compression: bool,
}

impl CatalogStorage {
    pub fn new(catalog_dir: &Path) -> Self {
        Self {
            snapshot_path: catalog_dir.join("catalog.bin"),
            journal_path: catalog_dir.join("catalog.journal"),
            use_compression: true,
        }
    }

    pub fn set_compression(&mut self, use_compression: bool) {
        self.use_compression = use_compression;
    }

    pub fn snapshot_exists(&self) -> bool {
        self.snapshot_path.exists()
    }

    pub fn snapshot_size(&self) -> Result<u64> {
        if self.snapshot_path.exists() {
            Ok(std::fs::metadata(&self.snapshot_path)?.len())
        } else {
            Ok(0)
        }
    }

    pub fn load_snapshot(&self) -> Result<CatalogInventory> {
        if !self.snapshot_path.exists() {
            debug!("Catalog snapshot does not exist, starting with an empty catalog");
            return Ok(CatalogInventory::default());
        }

        let start = std::time::Instant::now();
        let data = std::fs::read(&self.snapshot_path)?;
        let decoded = if self.use_compression {
            let mut decoder = GzDecoder::new(&data[..]);
            let mut decompressed = Vec::new();
            decoder.read_to_end(&mut decompressed)?;
            decompressed
        } else {
            data
        };

        let inventory: CatalogInventory = match deserialize(&decoded) {
            Ok(inventory) => inventory,
            Err(e) => {
                // Schema changed underneath us: keep the old file for a re-import
                let backup_path = self.snapshot_path.with_extension("bin.bak");
                if let Err(backup_err) = std::fs::copy(&self.snapshot_path, &backup_path) {
                    warn!(
                        "Failed to backup incompatible catalog snapshot: {}. Starting with an empty catalog.",
                        backup_err
                    );
                } else {
                    warn!(
                        "Catalog snapshot incompatible (error: {}). Backed up to {:?}; re-import the inventory.",
                        e, backup_path
                    );
                }
                return Ok(CatalogInventory::default());
            }
        };

        info!(
            "Loaded catalog snapshot: {} watchables, {} shows in {:?}",
            inventory.watchables.len(),
            inventory.shows.len(),
            start.elapsed()
        );
        Ok(inventory)
    }

    pub fn save_snapshot(&self, inventory: &CatalogInventory) -> Result<()> {
        let start = std::time::Instant::now();
        if let Some(parent) = self.snapshot_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let serialized = serialize(inventory)?;
        let encoded = if self.use_compression {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&serialized)?;
            encoder.finish()?
        } else {
            serialized
        };

        // Atomic write: temp file, then rename
        let temp_path = self.snapshot_path.with_extension("tmp");
        std::fs::write(&temp_path, encoded)?;
        std::fs::rename(&temp_path, &self.snapshot_path)?;

        info!(
            "Saved catalog snapshot: {} watchables, {} shows in {:?}",
            inventory.watchables.len(),
            inventory.shows.len(),
            start.elapsed()
        );
        Ok(())
    }

    /// Journal entries in commit order.
    ///
    /// A torn final line (crash mid-append) is dropped with a warning; any
    /// other malformed line is an error.
    pub fn read_journal(&self) -> Result<Vec<JournalEntry>> {
        if !self.journal_path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(&self.journal_path)?);
        let lines: Vec<String> = reader.lines().collect::<std::io::Result<_>>()?;
        let last = lines.len().saturating_sub(1);

        let mut entries = Vec::with_capacity(lines.len());
        for (index, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<JournalEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) if index == last => {
                    warn!("Dropping torn trailing journal entry: {}", e);
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Corrupt journal entry at line {} of {:?}", index + 1, self.journal_path)
                    });
                }
            }
        }
        Ok(entries)
    }

    pub fn open_journal(&self) -> Result<CatalogJournal> {
        if let Some(parent) = self.journal_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.journal_path)
            .with_context(|| format!("Failed to open catalog journal {:?}", self.journal_path))?;
        Ok(CatalogJournal { file })
    }

    pub fn truncate_journal(&self) -> Result<()> {
        if self.journal_path.exists() {
            File::create(&self.journal_path)?;
        }
        Ok(())
    }
}

/// Append handle for the catalog journal
pub struct CatalogJournal {
    file: File,
}

impl CatalogJournal {
    /// Append and sync one entry; returns once it is on disk
    pub fn append(&mut self, entry: &JournalEntry) -> Result<()> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        self.file.write_all(line.as_bytes())?;
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(())
    }
}
