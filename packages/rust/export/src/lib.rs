//! Segment export writers for cultureseg.
//!
//! Three formats are produced from the same segment list:
//! - CSV with one row per segment ([`csv`])
//! - Markdown with YAML frontmatter, combined or one file per segment ([`markdown`])
//! - a pretty-printed JSON array ([`write_json`])

pub mod csv;
pub mod markdown;

use std::path::Path;

use tracing::debug;

use cultureseg_shared::{Result, Segment, SegmenterError};

pub use csv::{CSV_COLUMNS, segments_to_csv, write_csv};
pub use markdown::{
    markdown_with_frontmatter, safe_filename, write_markdown, write_markdown_per_segment,
};

/// Create the parent directory of `path` if it has one.
pub(crate) fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| SegmenterError::io(parent, e))?;
    }
    Ok(())
}

/// Write segments as a pretty-printed JSON array.
pub fn write_json<'a>(path: &Path, segments: impl IntoIterator<Item = &'a Segment>) -> Result<()> {
    let rows: Vec<&Segment> = segments.into_iter().collect();
    let json = serde_json::to_string_pretty(&rows)
        .map_err(|e| SegmenterError::Export(format!("JSON serialization failed: {e}")))?;

    ensure_parent(path)?;
    std::fs::write(path, json).map_err(|e| SegmenterError::io(path, e))?;
    debug!(path = %path.display(), rows = rows.len(), "wrote JSON export");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_export_reads_back() {
        let dir = std::env::temp_dir().join(format!("cs_export_{}", uuid::Uuid::now_v7()));
        let path = dir.join("out").join("segments.json");

        let mut seg = Segment::new("AINU", "Hokkaido");
        seg.tags = Some(vec!["kinship".into()]);
        write_json(&path, &[seg.clone()]).expect("write");

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.starts_with("[\n"));
        let parsed: Vec<Segment> = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, vec![seg]);
    }
}
