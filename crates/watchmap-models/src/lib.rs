pub mod media;
pub mod media_ids;
pub mod discovery;
pub mod watchable;
pub mod mapping;
pub mod diagnostics;
pub mod traversal;

pub use media::{MediaType, ShowId, WatchableKind, WatchableRef};
pub use media_ids::{ExternalIdKind, ExternalIds};
pub use discovery::{DiscoveryRow, EnrichmentMetadata, LibraryInfo, LibraryPage, SectionType, ShowEnrichmentMetadata};
pub use watchable::{IdentityFields, MappingState, Show, Watchable};
pub use mapping::{ConflictReason, MappingStatus, MappingStrategy, MatchStep};
pub use diagnostics::{CandidateCounts, DiagnosticsProvenance, MappingDiagnostics, PassSummary, RecheckSummary, RecheckDisposition, DIAGNOSTICS_SCHEMA_VERSION};
pub use traversal::{IntegrationMappingState, LibraryCursor};
