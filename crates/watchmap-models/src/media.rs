use serde::{Deserialize, Serialize};
use std::fmt;

/// Media type of a discovery row as reported by the library indexer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Movie,
    Episode,
}

impl MediaType {
    /// The watchable kind a row of this media type is expected to map onto
    pub fn expected_kind(&self) -> WatchableKind {
        match self {
            MediaType::Movie => WatchableKind::Movie,
            MediaType::Episode => WatchableKind::Episode,
        }
    }
}

/// Closed set of watchable entity kinds.
///
/// Adding a variant is deliberate: every resolver and the evaluator match on
/// this exhaustively.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum WatchableKind {
    Movie,
    Episode,
}

impl WatchableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatchableKind::Movie => "movie",
            WatchableKind::Episode => "episode",
        }
    }
}

/// Identity of a watchable inside the catalog: kind plus numeric id
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchableRef {
    pub kind: WatchableKind,
    pub id: i64,
}

impl WatchableRef {
    pub fn movie(id: i64) -> Self {
        Self { kind: WatchableKind::Movie, id }
    }

    pub fn episode(id: i64) -> Self {
        Self { kind: WatchableKind::Episode, id }
    }
}

impl fmt::Display for WatchableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.id)
    }
}

/// Catalog id of a TV show (the parent of episode watchables)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShowId(pub i64);

impl fmt::Display for ShowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "show:{}", self.0)
    }
}
