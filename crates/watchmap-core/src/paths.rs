use serde::{Deserialize, Serialize};
use watchmap_config::MappingConfig;

/// Whether a canonical path lives under one of the managed roots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ownership {
    Managed,
    External,
}

impl Ownership {
    pub fn as_str(&self) -> &'static str {
        match self {
            Ownership::Managed => "managed",
            Ownership::External => "external",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathClassification {
    pub ownership: Ownership,
    pub matched_root: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PrefixMapping {
    from: String,
    to: String,
}

/// Pure path canonicalization and managed-root classification.
///
/// Prefix mappings translate paths as the library server sees them into the
/// namespace the catalog stores (e.g. a container mount). Roots and mapping
/// targets are canonicalized once at construction.
#[derive(Debug, Clone, Default)]
pub struct PathPolicy {
    managed_roots: Vec<String>,
    mappings: Vec<PrefixMapping>,
}

impl PathPolicy {
    pub fn new(managed_roots: &[String], mappings: &[(String, String)]) -> Self {
        let managed_roots = managed_roots
            .iter()
            .filter_map(|root| normalize(root))
            .collect();
        let mappings = mappings
            .iter()
            .filter_map(|(from, to)| {
                Some(PrefixMapping {
                    from: normalize(from)?,
                    to: normalize(to)?,
                })
            })
            .collect();
        Self { managed_roots, mappings }
    }

    pub fn from_config(config: &MappingConfig) -> Self {
        let mappings: Vec<(String, String)> = config
            .path_mappings
            .iter()
            .map(|m| (m.from.clone(), m.to.clone()))
            .collect();
        Self::new(&config.managed_roots, &mappings)
    }

    /// Canonical form of a raw path, or `None` when the input is blank.
    pub fn canonicalize(&self, raw_path: &str) -> Option<String> {
        let normalized = normalize(raw_path)?;
        for mapping in &self.mappings {
            if let Some(rest) = strip_segment_prefix(&normalized, &mapping.from) {
                let joined = format!("{}/{}", mapping.to, rest);
                return normalize(&joined);
            }
        }
        Some(normalized)
    }

    pub fn classify(&self, canonical_path: &str) -> PathClassification {
        if self.managed_roots.is_empty() {
            return PathClassification {
                ownership: Ownership::Managed,
                matched_root: None,
            };
        }

        let matched_root = self
            .managed_roots
            .iter()
            .filter(|root| strip_segment_prefix(canonical_path, root).is_some())
            .max_by_key(|root| root.len())
            .cloned();

        match matched_root {
            Some(root) => PathClassification {
                ownership: Ownership::Managed,
                matched_root: Some(root),
            },
            None => PathClassification {
                ownership: Ownership::External,
                matched_root: None,
            },
        }
    }
}

/// Lexical normalization: slashes, repeated separators, `.` and `..`,
/// trailing separator. Never touches the filesystem.
fn normalize(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let unified = trimmed.replace('\\', "/");
    let absolute = unified.starts_with('/');

    let mut segments: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(last) if *last != ".." => {
                    segments.pop();
                }
                _ if absolute => {}
                _ => segments.push(".."),
            },
            other => segments.push(other),
        }
    }

    let joined = segments.join("/");
    if absolute {
        Some(format!("/{}", joined))
    } else if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

/// Remainder of `path` below `prefix` when `prefix` matches whole segments
fn strip_segment_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix == "/" {
        return path.strip_prefix('/');
    }
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some(rest)
    } else {
        rest.strip_prefix('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_normalizes_separators_and_dots() {
        let policy = PathPolicy::default();
        assert_eq!(
            policy.canonicalize("  /data//movies/./Heat (1995)/../Heat (1995)/heat.mkv/ "),
            Some("/data/movies/Heat (1995)/heat.mkv".to_string())
        );
        assert_eq!(
            policy.canonicalize("D:\\Media\\Movies\\film.mkv"),
            Some("D:/Media/Movies/film.mkv".to_string())
        );
        assert_eq!(policy.canonicalize("/"), Some("/".to_string()));
        assert_eq!(policy.canonicalize("/../etc"), Some("/etc".to_string()));
        assert_eq!(policy.canonicalize("   "), None);
    }

    #[test]
    fn test_canonicalize_applies_first_matching_mapping() {
        let policy = PathPolicy::new(
            &[],
            &[
                ("/plex/media".to_string(), "/data".to_string()),
                ("/plex".to_string(), "/other".to_string()),
            ],
        );
        assert_eq!(
            policy.canonicalize("/plex/media/movies/a.mkv"),
            Some("/data/movies/a.mkv".to_string())
        );
        assert_eq!(
            policy.canonicalize("/plex/tv/b.mkv"),
            Some("/other/tv/b.mkv".to_string())
        );
        // Segment-aware: /plexmedia is not below /plex
        assert_eq!(
            policy.canonicalize("/plexmedia/c.mkv"),
            Some("/plexmedia/c.mkv".to_string())
        );
    }

    #[test]
    fn test_classify_without_roots_is_managed() {
        let policy = PathPolicy::default();
        let classification = policy.classify("/anywhere/file.mkv");
        assert_eq!(classification.ownership, Ownership::Managed);
        assert_eq!(classification.matched_root, None);
    }

    #[test]
    fn test_classify_prefers_longest_root() {
        let policy = PathPolicy::new(&["/data".to_string(), "/data/tv/".to_string()], &[]);

        let tv = policy.classify("/data/tv/show/s01e01.mkv");
        assert_eq!(tv.ownership, Ownership::Managed);
        assert_eq!(tv.matched_root.as_deref(), Some("/data/tv"));

        let external = policy.classify("/database/file.mkv");
        assert_eq!(external.ownership, Ownership::External);
        assert_eq!(external.matched_root, None);

        let root_itself = policy.classify("/data");
        assert_eq!(root_itself.ownership, Ownership::Managed);
    }
}
