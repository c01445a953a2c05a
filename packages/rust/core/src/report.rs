//! Run diagnostics: batch quality summary and the JSON session log.

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use cultureseg_shared::{Result, RunId, Segment, SegmenterError};

use crate::dedup::find_duplicate_titles;
use crate::pipeline::BatchOutcome;

/// Content shorter than this is counted as low quality in the summary.
pub const LOW_QUALITY_CHARS: usize = 100;

// ---------------------------------------------------------------------------
// Quality report
// ---------------------------------------------------------------------------

/// Aggregate statistics over one batch of segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub count: usize,
    pub mean_content_chars: f64,
    pub min_content_chars: usize,
    pub max_content_chars: usize,
    pub low_quality_count: usize,
    pub unique_titles: usize,
    pub flagged_count: usize,
    pub duplicate_titles: Vec<String>,
}

/// Summarize a batch. An empty batch yields all-zero statistics.
pub fn quality_report(segments: &[Segment]) -> QualityReport {
    let lengths: Vec<usize> = segments.iter().map(Segment::content_chars).collect();
    let total: usize = lengths.iter().sum();

    let mean_content_chars = if lengths.is_empty() {
        0.0
    } else {
        total as f64 / lengths.len() as f64
    };

    let unique_titles = segments
        .iter()
        .map(|s| s.title.as_str())
        .collect::<HashSet<_>>()
        .len();

    QualityReport {
        count: segments.len(),
        mean_content_chars,
        min_content_chars: lengths.iter().copied().min().unwrap_or(0),
        max_content_chars: lengths.iter().copied().max().unwrap_or(0),
        low_quality_count: lengths.iter().filter(|&&n| n < LOW_QUALITY_CHARS).count(),
        unique_titles,
        flagged_count: segments
            .iter()
            .filter(|s| s.needs_attention == Some(true))
            .count(),
        duplicate_titles: find_duplicate_titles(segments).into_iter().collect(),
    }
}

impl std::fmt::Display for QualityReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "segments:        {}", self.count)?;
        writeln!(
            f,
            "content length:  mean {:.1}, min {}, max {}",
            self.mean_content_chars, self.min_content_chars, self.max_content_chars
        )?;
        writeln!(
            f,
            "low quality:     {} (< {LOW_QUALITY_CHARS} chars)",
            self.low_quality_count
        )?;
        writeln!(f, "unique titles:   {}", self.unique_titles)?;
        writeln!(f, "needs attention: {}", self.flagged_count)?;
        if self.duplicate_titles.is_empty() {
            write!(f, "duplicates:      none")
        } else {
            write!(f, "duplicates:      {}", self.duplicate_titles.join(", "))
        }
    }
}

// ---------------------------------------------------------------------------
// Session log
// ---------------------------------------------------------------------------

/// Segment count produced from one input file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOutput {
    pub file: String,
    pub segments: usize,
}

/// An input file that failed, with its rendered error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    pub file: String,
    pub error: String,
}

/// Machine-readable record of one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionLog {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub files: Vec<String>,
    /// Name of the enricher used, if any.
    pub enrichment: Option<String>,
    pub outputs: Vec<FileOutput>,
    pub failures: Vec<FileFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<QualityReport>,
}

impl SessionLog {
    pub fn new(run_id: RunId, files: &[impl AsRef<Path>], enrichment: Option<&str>) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            files: files
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect(),
            enrichment: enrichment.map(str::to_string),
            outputs: Vec::new(),
            failures: Vec::new(),
            diagnostics: None,
        }
    }

    /// Record per-file outcomes of a batch.
    pub fn record(&mut self, outcome: &BatchOutcome) {
        self.outputs
            .extend(outcome.documents.iter().map(|d| FileOutput {
                file: d.path.display().to_string(),
                segments: d.segments.len(),
            }));
        self.failures
            .extend(outcome.failures.iter().map(|f| FileFailure {
                file: f.path.display().to_string(),
                error: f.error.to_string(),
            }));
    }

    pub fn set_diagnostics(&mut self, report: QualityReport) {
        self.diagnostics = Some(report);
    }

    /// Write the log as pretty-printed JSON, creating parent directories.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| SegmenterError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| SegmenterError::Export(format!("session log: {e}")))?;
        std::fs::write(path, json).map_err(|e| SegmenterError::io(path, e))?;
        info!(
            path = %path.display(),
            outputs = self.outputs.len(),
            failures = self.failures.len(),
            "session log written"
        );
        Ok(())
    }
}
