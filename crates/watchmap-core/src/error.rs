use thiserror::Error;
use watchmap_sources::SourceError;

/// Errors that stop a mapping run.
///
/// Enrichment failures never show up here; they are folded into the
/// per-run cache as unusable results.
#[derive(Debug, Error)]
pub enum MappingError {
    /// Discovery fetch failed. Aborts the current integration only.
    #[error("discovery fetch failed for {integration}: {source}")]
    Source {
        integration: String,
        #[source]
        source: SourceError,
    },

    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),

    /// Recheck counters no longer add up. This is a bug in the engine, not
    /// bad data, and aborts the whole invocation.
    #[error(
        "recheck counting invariant violated for {integration}: \
         attempted={attempted} skipped={skipped} eligible={eligible} failed={failed}"
    )]
    CountingInvariant {
        integration: String,
        attempted: usize,
        skipped: usize,
        eligible: usize,
        failed: usize,
    },

    /// Rejected before any state is touched, e.g. an integration name that
    /// cannot be used as a state file name.
    #[error("configuration error: {0}")]
    Config(#[from] watchmap_config::ConfigError),
}

impl MappingError {
    /// Whether the error should stop every remaining integration, not just
    /// the one that raised it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, MappingError::CountingInvariant { .. } | MappingError::Config(_))
    }
}
