// Core domain types shared across all Inkstone crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type ProjectId = i64;
pub type ChapterId = i64;
pub type SnapshotId = i64;

/// A chapter as returned by the document store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chapter {
    pub id: ChapterId,
    pub project_id: ProjectId,
    pub volume_id: i64,
    pub title: String,
    pub order_no: i64,
    pub status: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub word_count: i64,
}

impl Chapter {
    /// Chapter content, treating a missing body as empty.
    pub fn body(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }
}

/// Category of a detected consistency issue.
///
/// Unknown categories from the detector decode as `Other`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Character,
    Plot,
    Setting,
    #[serde(other)]
    Other,
}

impl IssueKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Character => "character",
            Self::Plot => "plot",
            Self::Setting => "setting",
            Self::Other => "other",
        }
    }
}

/// An inconsistency between chapter content and the project's setting/outline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConsistencyIssue {
    #[serde(rename = "type")]
    pub kind: IssueKind,
    pub description: String,
    /// Exact substring of the chapter the issue refers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl ConsistencyIssue {
    /// Quote and suggestion, when both are present and non-empty.
    pub fn fix_inputs(&self) -> Option<(&str, &str)> {
        let quote = self.quote.as_deref().filter(|q| !q.is_empty())?;
        let suggestion = self.suggestion.as_deref().filter(|s| !s.is_empty())?;
        Some((quote, suggestion))
    }
}

/// A verbatim-match/replacement pair produced for one issue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FixProposal {
    #[serde(rename = "original_text")]
    pub original: String,
    #[serde(rename = "fixed_text")]
    pub fixed: String,
}

/// An immutable, timestamped copy of a chapter's content.
///
/// `content` is only populated when a single snapshot is fetched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Snapshot {
    pub id: SnapshotId,
    pub chapter_id: ChapterId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default)]
    pub word_count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// One pushed update for a long-running task.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskUpdate {
    #[serde(default)]
    pub progress: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Inputs for world-bible generation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BibleInputs {
    pub protagonist: String,
    pub cheat: String,
    pub power_system: String,
}

/// Timestamps from the document store are RFC 3339, or naive ISO 8601
/// meaning UTC.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp `{raw}`")))
    }

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok().map(|naive| naive.and_utc())
    }
}
