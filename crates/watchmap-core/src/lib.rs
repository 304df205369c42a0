pub mod error;
pub mod paths;
pub mod repository;
pub mod caches;
pub mod context;
pub mod resolvers;
pub mod evaluator;
pub mod recheck;
pub mod finalize;
pub mod diagnostics;
pub mod upsert;
pub mod catalog;
pub mod catalog_storage;
pub mod state_storage;
pub mod traversal;

pub use error::MappingError;
pub use paths::{Ownership, PathClassification, PathPolicy};
pub use repository::{IdentityUpdate, MappingStateStore, MappingWriter, WatchableRepository, WatchableStore};
pub use catalog::{CatalogStore, MergeStats};
pub use catalog_storage::{CatalogInventory, CatalogStorage};
pub use state_storage::{FileStateStore, MemoryStateStore};
pub use diagnostics::{RollupDiagnostics, DEFAULT_ROLLUP_SAMPLE_LIMIT};
pub use traversal::{
    run_mapping_sync, IntegrationRunReport, MappingCounters, MappingEngine, MappingRunSummary, SyncOptions,
    TraversalProfile,
};
