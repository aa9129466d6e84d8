//! File manifest entries
//!
//! The manifest lists, per entity, the files that make up its bundle. A
//! locator is either an HTTP(S) URL or a path on the source storage.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a manifest entry lives
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Locator {
    Url(String),
    Path(String),
}

impl Locator {
    /// Classify a raw locator string
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Locator::Url(trimmed.to_string())
        } else {
            Locator::Path(trimmed.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Locator::Url(s) | Locator::Path(s) => s,
        }
    }

    pub fn is_url(&self) -> bool {
        matches!(self, Locator::Url(_))
    }

    /// Final path segment, used as the name inside the bundle.
    ///
    /// Query strings and fragments are dropped from URLs. Returns `None`
    /// when nothing usable remains.
    pub fn final_segment(&self) -> Option<String> {
        let path = match self {
            Locator::Url(url) => {
                let bare = url.split(['?', '#']).next().unwrap_or(url);
                let without_scheme = bare.split_once("://").map_or(bare, |(_, rest)| rest);
                without_scheme.split_once('/').map_or("", |(_, path)| path)
            }
            Locator::Path(path) => path.as_str(),
        };
        path.trim_end_matches(['/', '\\'])
            .rsplit(['/', '\\'])
            .next()
            .filter(|s| !s.is_empty() && *s != "." && *s != ".." && !s.contains(':'))
            .map(str::to_string)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One file or directory that belongs to an entity's bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileManifestEntry {
    pub entity_id: String,
    pub locator: Locator,
    pub is_directory: bool,
}

impl FileManifestEntry {
    pub fn new(entity_id: impl Into<String>, locator: Locator, is_directory: bool) -> Self {
        Self {
            entity_id: entity_id.into(),
            locator,
            is_directory,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_classification() {
        assert!(Locator::parse("https://example.org/a.pdf").is_url());
        assert!(Locator::parse("HTTP://example.org/a.pdf").is_url());
        assert!(!Locator::parse("/mnt/docs/a.pdf").is_url());
    }

    #[test]
    fn test_final_segment() {
        assert_eq!(
            Locator::parse("https://example.org/docs/edital.pdf?x=1").final_segment(),
            Some("edital.pdf".to_string())
        );
        assert_eq!(
            Locator::parse("/data/anexos/").final_segment(),
            Some("anexos".to_string())
        );
        assert_eq!(
            Locator::parse(r"C:\docs\ata.doc").final_segment(),
            Some("ata.doc".to_string())
        );
        assert_eq!(Locator::parse("https://example.org/").final_segment(), None);
    }
}
