//! Record types produced by the page classifier
//!
//! A `Record` is created from one successful fetch and is never mutated after
//! creation, except to fill `asset_local_path` once the asset downloader resolves it.

mod id;

pub use id::{format_id, parse_id};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Publication status of an entry on the remote site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublicationStatus {
    /// Still being published
    Serializing,

    /// Finished
    Completed,

    /// Publication stopped before completion
    Discontinued,

    /// Removed by the site
    Deleted,

    /// The site refuses access to this entry
    AccessDenied,
}

impl PublicationStatus {
    /// Title marker used for minimal records of removed entries
    pub fn removed_marker(&self) -> Option<&'static str> {
        match self {
            Self::Deleted => Some("DELETED"),
            Self::AccessDenied => Some("ACCESS DENIED"),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Serializing => "serializing",
            Self::Completed => "completed",
            Self::Discontinued => "discontinued",
            Self::Deleted => "deleted",
            Self::AccessDenied => "access_denied",
        }
    }
}

impl fmt::Display for PublicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One classified entry, serialized as a single JSON line in metadata output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Zero-padded ID
    pub id: String,

    pub title: String,

    #[serde(default)]
    pub synopsis: Option<String>,

    #[serde(default)]
    pub author: Option<String>,

    #[serde(default)]
    pub tags: BTreeSet<String>,

    #[serde(default)]
    pub is_adult: bool,

    pub publication_status: PublicationStatus,

    /// Remote URL of the entry's asset (cover image)
    #[serde(default)]
    pub asset_ref: Option<String>,

    /// Declared content type of the asset
    #[serde(default)]
    pub asset_mime: Option<String>,

    /// Where the asset was stored locally, once downloaded
    #[serde(default)]
    pub asset_local_path: Option<String>,

    #[serde(default)]
    pub like_count: Option<u64>,

    #[serde(default)]
    pub chapter_count: Option<u64>,
}

impl Record {
    /// Creates an empty record for the given ID and title
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            synopsis: None,
            author: None,
            tags: BTreeSet::new(),
            is_adult: false,
            publication_status: PublicationStatus::Serializing,
            asset_ref: None,
            asset_mime: None,
            asset_local_path: None,
            like_count: None,
            chapter_count: None,
        }
    }

    /// Creates the minimal record for a deleted or access-denied entry
    ///
    /// Only the ID and status are meaningful; the title carries a marker so the
    /// titles-only output can tell these lines apart.
    pub fn removed(id: impl Into<String>, status: PublicationStatus) -> Self {
        let title = status.removed_marker().unwrap_or("REMOVED");
        let mut record = Self::new(id, title);
        record.publication_status = status;
        record
    }

    /// Numeric value of the record's ID, if it parses
    pub fn numeric_id(&self) -> Option<u64> {
        parse_id(&self.id)
    }

    /// Renders the record as one titles-only output line (without newline)
    pub fn title_line(&self) -> String {
        format!("{}, {}", self.title, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&PublicationStatus::AccessDenied).unwrap();
        assert_eq!(json, "\"access_denied\"");

        let parsed: PublicationStatus = serde_json::from_str("\"completed\"").unwrap();
        assert_eq!(parsed, PublicationStatus::Completed);
    }

    #[test]
    fn test_removed_record() {
        let record = Record::removed("000001", PublicationStatus::Deleted);
        assert_eq!(record.title, "DELETED");
        assert_eq!(record.publication_status, PublicationStatus::Deleted);
        assert!(record.tags.is_empty());
        assert_eq!(record.title_line(), "DELETED, 000001");
    }

    #[test]
    fn test_record_json_has_every_field() {
        let record = Record::new("000042", "A Title");
        let value: serde_json::Value = serde_json::to_value(&record).unwrap();
        let object = value.as_object().unwrap();

        for field in [
            "id",
            "title",
            "synopsis",
            "author",
            "tags",
            "is_adult",
            "publication_status",
            "asset_ref",
            "asset_mime",
            "asset_local_path",
            "like_count",
            "chapter_count",
        ] {
            assert!(object.contains_key(field), "missing field {}", field);
        }
        assert!(object["synopsis"].is_null());
    }

    #[test]
    fn test_record_parses_with_missing_optionals() {
        let line = r#"{"id":"000007","title":"T","publication_status":"serializing"}"#;
        let record: Record = serde_json::from_str(line).unwrap();
        assert_eq!(record.numeric_id(), Some(7));
        assert!(!record.is_adult);
        assert_eq!(record.chapter_count, None);
    }
}
