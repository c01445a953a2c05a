//! Markdown export with YAML frontmatter.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use cultureseg_shared::{Result, Segment, SegmenterError, UNDETERMINED_LANG};

use crate::ensure_parent;

/// Characters that are unsafe in file names on common platforms.
const UNSAFE_FILENAME_CHARS: [char; 9] = ['\\', '/', '*', '?', ':', '"', '<', '>', '|'];

/// Number of segment-id characters appended to per-segment file names.
const ID_SUFFIX_LEN: usize = 6;

/// File name for a segment: unsafe characters become `_`, and six characters
/// of the id (when present) keep same-titled segments apart.
///
/// The suffix comes from the end of the id. UUID v7 ids lead with a
/// millisecond timestamp, so their head is shared by every segment of a run;
/// the tail is random.
pub fn safe_filename(title: &str, segment_id: Option<&str>) -> String {
    let safe: String = title
        .chars()
        .map(|c| if UNSAFE_FILENAME_CHARS.contains(&c) { '_' } else { c })
        .collect();

    match segment_id.filter(|id| !id.is_empty()) {
        Some(id) => {
            let chars: Vec<char> = id.chars().collect();
            let suffix: String = chars[chars.len().saturating_sub(ID_SUFFIX_LEN)..]
                .iter()
                .collect();
            format!("{safe}_{suffix}.md")
        }
        None => format!("{safe}.md"),
    }
}

/// `name.md` → `name_<n>.md`.
fn numbered(name: &str, n: usize) -> String {
    let stem = name.strip_suffix(".md").unwrap_or(name);
    format!("{stem}_{n}.md")
}

/// Escape special characters in a YAML string value.
fn escape_yaml_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn build_frontmatter(seg: &Segment) -> String {
    let tags = seg
        .tags
        .as_deref()
        .unwrap_or_default()
        .iter()
        .map(|t| format!("\"{}\"", escape_yaml_string(t)))
        .collect::<Vec<_>>()
        .join(", ");

    let mut fm = String::from("---\n");
    fm.push_str(&format!("title: \"{}\"\n", escape_yaml_string(&seg.title)));
    fm.push_str(&format!("tags: [{tags}]\n"));
    fm.push_str(&format!(
        "lang: {}\n",
        seg.title_lang.as_deref().unwrap_or(UNDETERMINED_LANG)
    ));
    fm.push_str(&format!(
        "confidence: {}\n",
        seg.confidence_score.map(|c| c.as_str()).unwrap_or_default()
    ));
    fm.push_str(&format!(
        "run_id: {}\n",
        seg.run_id.as_ref().map(|r| r.as_str()).unwrap_or_default()
    ));
    fm.push_str("---\n");
    fm
}

/// A segment rendered as a standalone Markdown document.
pub fn markdown_with_frontmatter(seg: &Segment) -> String {
    format!("{}\n{}\n", build_frontmatter(seg), seg.content)
}

/// Write all segments into one Markdown file, separated by blank lines.
pub fn write_markdown<'a>(
    path: &Path,
    segments: impl IntoIterator<Item = &'a Segment>,
) -> Result<()> {
    let mut out = String::new();
    let mut count = 0;
    for seg in segments {
        out.push_str(&markdown_with_frontmatter(seg));
        out.push('\n');
        count += 1;
    }

    ensure_parent(path)?;
    std::fs::write(path, out).map_err(|e| SegmenterError::io(path, e))?;
    debug!(path = %path.display(), segments = count, "wrote Markdown export");
    Ok(())
}

/// Write one Markdown file per segment into `dir`. Returns the written paths.
pub fn write_markdown_per_segment<'a>(
    dir: &Path,
    segments: impl IntoIterator<Item = &'a Segment>,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir).map_err(|e| SegmenterError::io(dir, e))?;

    let mut written = Vec::new();
    let mut taken: HashSet<String> = HashSet::new();
    for seg in segments {
        let id = seg.segment_id.as_ref().map(ToString::to_string);
        let base = safe_filename(&seg.title, id.as_deref());
        let mut name = base.clone();
        let mut n = 1;
        while !taken.insert(name.clone()) {
            n += 1;
            name = numbered(&base, n);
        }
        if name != base {
            warn!(title = %seg.title, file = %name, "file name already used in this export, renamed");
        }

        let path = dir.join(name);
        std::fs::write(&path, markdown_with_frontmatter(seg))
            .map_err(|e| SegmenterError::io(&path, e))?;
        written.push(path);
    }

    info!(dir = %dir.display(), files = written.len(), "wrote per-segment Markdown");
    Ok(written)
}
