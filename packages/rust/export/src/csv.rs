//! CSV export, one row per segment.
//!
//! Fields are quoted only when they contain a comma, quote, or line break;
//! embedded quotes are doubled. Missing optional fields are empty cells.

use std::path::Path;

use tracing::debug;

use cultureseg_shared::{Confidence, Result, Segment, SegmenterError};

use crate::ensure_parent;

/// Header row, in output order.
pub const CSV_COLUMNS: [&str; 11] = [
    "segment_id",
    "run_id",
    "source_file",
    "title",
    "content",
    "tags",
    "summary",
    "summary_quality_score",
    "confidence_score",
    "needs_attention",
    "title_lang",
];

/// Separator between tags inside the `tags` cell.
const TAG_SEPARATOR: &str = "; ";

fn escape_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn confidence_cell(value: Option<Confidence>) -> String {
    value.map(|c| c.as_str().to_string()).unwrap_or_default()
}

fn row(seg: &Segment) -> [String; 11] {
    [
        seg.segment_id.as_ref().map(ToString::to_string).unwrap_or_default(),
        seg.run_id.as_ref().map(ToString::to_string).unwrap_or_default(),
        seg.source_file.clone().unwrap_or_default(),
        seg.title.clone(),
        seg.content.clone(),
        seg.tags.as_ref().map(|t| t.join(TAG_SEPARATOR)).unwrap_or_default(),
        seg.summary.clone().unwrap_or_default(),
        confidence_cell(seg.summary_quality_score),
        confidence_cell(seg.confidence_score),
        seg.needs_attention.map(|b| b.to_string()).unwrap_or_default(),
        seg.title_lang.clone().unwrap_or_default(),
    ]
}

fn push_line<S: AsRef<str>>(out: &mut String, cells: &[S]) {
    let line: Vec<String> = cells.iter().map(|c| escape_field(c.as_ref())).collect();
    out.push_str(&line.join(","));
    out.push_str("\r\n");
}

/// Render segments as CSV text, header included.
pub fn segments_to_csv<'a>(segments: impl IntoIterator<Item = &'a Segment>) -> String {
    let mut out = String::new();
    push_line(&mut out, &CSV_COLUMNS);
    for seg in segments {
        push_line(&mut out, &row(seg));
    }
    out
}

/// Write segments to a CSV file, creating parent directories.
pub fn write_csv<'a>(path: &Path, segments: impl IntoIterator<Item = &'a Segment>) -> Result<()> {
    let rows: Vec<&Segment> = segments.into_iter().collect();
    let csv = segments_to_csv(rows.iter().copied());

    ensure_parent(path)?;
    std::fs::write(path, csv).map_err(|e| SegmenterError::io(path, e))?;
    debug!(path = %path.display(), rows = rows.len(), "wrote CSV export");
    Ok(())
}
