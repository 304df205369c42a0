use serde::{Deserialize, Serialize};

/// External identifier namespaces the matcher understands
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ExternalIdKind {
    Imdb,
    Tmdb,
    Tvdb,
}

impl ExternalIdKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExternalIdKind::Imdb => "imdb",
            ExternalIdKind::Tmdb => "tmdb",
            ExternalIdKind::Tvdb => "tvdb",
        }
    }
}

/// External identifiers carried by a discovery row, an enrichment record or a
/// catalog entity.
///
/// Values are kept normalized: IMDb ids are trimmed and lowercased, blank
/// strings and zero numeric ids are treated as absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ExternalIds {
    #[serde(default)]
    pub imdb_id: Option<String>,
    #[serde(default)]
    pub tmdb_id: Option<u32>,
    #[serde(default)]
    pub tvdb_id: Option<u32>,
}

impl ExternalIds {
    pub fn new(imdb_id: Option<&str>, tmdb_id: Option<u32>, tvdb_id: Option<u32>) -> Self {
        Self {
            imdb_id: imdb_id.and_then(normalize_imdb_id),
            tmdb_id: tmdb_id.filter(|id| *id > 0),
            tvdb_id: tvdb_id.filter(|id| *id > 0),
        }
    }

    /// Re-apply normalization, e.g. after deserializing untrusted input
    pub fn normalized(&self) -> Self {
        Self::new(self.imdb_id.as_deref(), self.tmdb_id, self.tvdb_id)
    }

    /// Check if all ID fields are empty
    pub fn is_empty(&self) -> bool {
        self.imdb_id.is_none() && self.tmdb_id.is_none() && self.tvdb_id.is_none()
    }

    /// Overlay `other` on top of `self`: every id present in `other` wins,
    /// ids only present in `self` are kept.
    pub fn overlaid_with(&self, other: &ExternalIds) -> ExternalIds {
        ExternalIds {
            imdb_id: other.imdb_id.clone().or_else(|| self.imdb_id.clone()),
            tmdb_id: other.tmdb_id.or(self.tmdb_id),
            tvdb_id: other.tvdb_id.or(self.tvdb_id),
        }
    }

    /// Lookup keys present on this record, in fixed `imdb, tmdb, tvdb` order.
    ///
    /// The value is rendered as a string so all namespaces share one index
    /// key type.
    pub fn keys(&self) -> Vec<(ExternalIdKind, String)> {
        let mut keys = Vec::new();
        if let Some(ref imdb) = self.imdb_id {
            keys.push((ExternalIdKind::Imdb, imdb.clone()));
        }
        if let Some(tmdb) = self.tmdb_id {
            keys.push((ExternalIdKind::Tmdb, tmdb.to_string()));
        }
        if let Some(tvdb) = self.tvdb_id {
            keys.push((ExternalIdKind::Tvdb, tvdb.to_string()));
        }
        keys
    }
}

fn normalize_imdb_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim().to_ascii_lowercase();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
