//! Core domain types for segmented culture documents.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Title given to the synthetic segment holding text that precedes the first
/// detected title (or the whole document when no title is found).
pub const OVERVIEW_TITLE: &str = "Overview";

/// Language code used when title language detection is unavailable or fails.
pub const UNDETERMINED_LANG: &str = "und";

// ---------------------------------------------------------------------------
// SegmentId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for segment identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentId(pub Uuid);

impl SegmentId {
    /// Generate a new time-sortable segment identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for SegmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SegmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SegmentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// Identifier shared by every segment produced in one invocation.
///
/// Derived from wall-clock time at second resolution (`YYYYMMDD_HHMMSS`), so
/// two runs started within the same second share an id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    /// Timestamp format used for run ids.
    pub const FORMAT: &'static str = "%Y%m%d_%H%M%S";

    /// Run id for the current local time.
    pub fn now() -> Self {
        Self::at(Local::now())
    }

    /// Run id for a given instant.
    pub fn at(time: DateTime<Local>) -> Self {
        Self(time.format(Self::FORMAT).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RunId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Confidence
// ---------------------------------------------------------------------------

/// Coarse trust tier for a segment's enrichment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Confidence {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown confidence tier '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Segment
// ---------------------------------------------------------------------------

/// A contiguous block of source text attributed to one subject title.
///
/// Everything beyond `title` and `content` is optional: identity fields are
/// filled by the stamper, enrichment fields by an optional collaborator, and
/// the quality fields by post-processing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Segment {
    /// One or more joined title lines. Never empty.
    pub title: String,
    /// Raw text following the title, newline-preserving. May be empty.
    pub content: String,
    /// Assigned once by the stamper, never replaced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment_id: Option<SegmentId>,
    /// Shared by every segment of one invocation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
    /// File name of the originating document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Externally supplied quality tier; wins over every heuristic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_quality_score: Option<Confidence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<Confidence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub needs_attention: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_lang: Option<String>,
}

impl Segment {
    /// A bare segment straight out of the segmentation engine.
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            segment_id: None,
            run_id: None,
            source_file: None,
            tags: None,
            summary: None,
            summary_quality_score: None,
            confidence_score: None,
            needs_attention: None,
            title_lang: None,
        }
    }

    /// Whether this is the synthetic leading segment.
    pub fn is_overview(&self) -> bool {
        self.title == OVERVIEW_TITLE
    }

    /// Content length in characters (not bytes).
    pub fn content_chars(&self) -> usize {
        self.content.chars().count()
    }

    /// True when `tags` is present and holds at least one entry.
    pub fn has_tags(&self) -> bool {
        self.tags.as_ref().is_some_and(|t| !t.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn segment_id_roundtrip() {
        let id = SegmentId::new();
        let parsed: SegmentId = id.to_string().parse().expect("parse SegmentId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn run_id_format() {
        let t = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(RunId::at(t).as_str(), "20240309_070501");
    }

    #[test]
    fn confidence_parse_and_display() {
        assert_eq!("HIGH".parse::<Confidence>().unwrap(), Confidence::High);
        assert_eq!(" low ".parse::<Confidence>().unwrap(), Confidence::Low);
        assert!("maybe".parse::<Confidence>().is_err());
        assert_eq!(Confidence::Medium.to_string(), "medium");
    }

    #[test]
    fn segment_serialization_skips_absent_fields() {
        let seg = Segment::new("JAPANESE", "Japan is an island nation.");
        let json = serde_json::to_string(&seg).expect("serialize");
        assert!(!json.contains("segment_id"));
        assert!(!json.contains("tags"));

        let parsed: Segment = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, seg);
    }

    #[test]
    fn confidence_serializes_lowercase() {
        let mut seg = Segment::new("FRENCH", "");
        seg.confidence_score = Some(Confidence::High);
        let json = serde_json::to_string(&seg).expect("serialize");
        assert!(json.contains(r#""confidence_score":"high""#));
    }

    #[test]
    fn has_tags_requires_entries() {
        let mut seg = Segment::new("FRENCH", "");
        assert!(!seg.has_tags());
        seg.tags = Some(vec![]);
        assert!(!seg.has_tags());
        seg.tags = Some(vec!["kinship".into()]);
        assert!(seg.has_tags());
    }
}
