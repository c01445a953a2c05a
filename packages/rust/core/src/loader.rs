//! Input loading: documents, known-title lists, and batch directories.
//!
//! Plain text is read as UTF-8. Word documents contribute one line per
//! paragraph; spreadsheets contribute one line per non-empty cell of the
//! first sheet's `Content` column.

use std::io::Read;
use std::path::{Path, PathBuf};

use calamine::{Data, Reader, open_workbook_auto};
use quick_xml::events::Event;
use tracing::{debug, info};

use cultureseg_shared::{Result, SegmenterError};

use crate::title::KnownTitles;

/// Extensions read directly as UTF-8 text.
const TEXT_EXTENSIONS: &[&str] = &["txt", "text", "md"];

/// Spreadsheet extensions.
const SHEET_EXTENSIONS: &[&str] = &["xlsx", "xls"];

/// Word-processor extension.
const DOCX_EXTENSION: &str = "docx";

/// Spreadsheet column holding document text.
const CONTENT_COLUMN: &str = "Content";

/// Body part of a `.docx` package.
const DOCX_BODY: &str = "word/document.xml";

/// Load a flat list of subject names, one per line.
pub fn load_known_titles(path: &Path) -> Result<KnownTitles> {
    let raw = std::fs::read_to_string(path).map_err(|e| SegmenterError::io(path, e))?;
    let titles: KnownTitles = raw.lines().collect();
    info!(path = %path.display(), count = titles.len(), "loaded known titles");
    Ok(titles)
}

/// Lower-cased extension of `path`, or an empty string.
fn extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Whether the loader can decode `path`.
pub fn is_supported(path: &Path) -> bool {
    let ext = extension(path);
    TEXT_EXTENSIONS.contains(&ext.as_str())
        || SHEET_EXTENSIONS.contains(&ext.as_str())
        || ext == DOCX_EXTENSION
}

/// Read a document as raw text.
pub fn load_content(path: &Path) -> Result<String> {
    let ext = extension(path);
    let text = if TEXT_EXTENSIONS.contains(&ext.as_str()) {
        std::fs::read_to_string(path).map_err(|e| SegmenterError::io(path, e))?
    } else if SHEET_EXTENSIONS.contains(&ext.as_str()) {
        load_sheet(path)?
    } else if ext == DOCX_EXTENSION {
        load_docx(path)?
    } else {
        return Err(SegmenterError::unsupported(path, ext));
    };
    debug!(path = %path.display(), format = %ext, bytes = text.len(), "loaded document");
    Ok(text)
}

/// First sheet's `Content` column, trimmed, empty cells skipped.
fn load_sheet(path: &Path) -> Result<String> {
    let parse_err = |e: calamine::Error| {
        SegmenterError::parse(format!("spreadsheet {}: {e}", path.display()))
    };

    let mut workbook = open_workbook_auto(path).map_err(parse_err)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| SegmenterError::parse(format!("spreadsheet {} has no sheets", path.display())))?
        .map_err(parse_err)?;

    let mut rows = range.rows();
    let header = rows.next().unwrap_or_default();
    let column = header
        .iter()
        .position(|cell| matches!(cell, Data::String(s) if s.trim() == CONTENT_COLUMN))
        .ok_or_else(|| {
            SegmenterError::parse(format!(
                "spreadsheet {} has no '{CONTENT_COLUMN}' column",
                path.display()
            ))
        })?;

    let lines: Vec<String> = rows
        .filter_map(|row| row.get(column))
        .filter(|cell| !matches!(cell, Data::Empty))
        .map(|cell| cell.to_string().trim().to_string())
        .collect();
    Ok(lines.join("\n"))
}

/// Paragraph text of a `.docx` body, one paragraph per line.
fn load_docx(path: &Path) -> Result<String> {
    let file = std::fs::File::open(path).map_err(|e| SegmenterError::io(path, e))?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| SegmenterError::parse(format!("docx {}: {e}", path.display())))?;
    let mut xml = String::new();
    archive
        .by_name(DOCX_BODY)
        .map_err(|e| SegmenterError::parse(format!("docx {}: {e}", path.display())))?
        .read_to_string(&mut xml)
        .map_err(|e| SegmenterError::io(path, e))?;

    docx_paragraphs(&xml)
        .map(|paragraphs| paragraphs.join("\n"))
        .map_err(|e| SegmenterError::parse(format!("docx {}: {e}", path.display())))
}

/// Collect `w:p` paragraph texts from WordprocessingML.
fn docx_paragraphs(xml: &str) -> std::result::Result<Vec<String>, quick_xml::Error> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut paragraphs = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"w:p" => current = Some(String::new()),
                b"w:t" => in_text = true,
                _ => {}
            },
            Event::Empty(e) => match (e.name().as_ref(), current.as_mut()) {
                (b"w:p", _) => paragraphs.push(String::new()),
                (b"w:tab", Some(p)) => p.push('\t'),
                (b"w:br" | b"w:cr", Some(p)) => p.push('\n'),
                _ => {}
            },
            Event::Text(e) if in_text => {
                if let Some(p) = current.as_mut() {
                    p.push_str(&e.unescape()?);
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" => paragraphs.extend(current.take()),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(paragraphs)
}

/// Resolve the list of documents for a run.
///
/// With a batch directory, every supported file directly inside it is used
/// (sorted by name) and `paths` is ignored. Otherwise `paths` is returned
/// unchanged, so unsupported files still surface as per-document failures.
pub fn collect_inputs(paths: &[PathBuf], batch_dir: Option<&Path>) -> Result<Vec<PathBuf>> {
    let Some(dir) = batch_dir else {
        return Ok(paths.to_vec());
    };

    let entries = std::fs::read_dir(dir).map_err(|e| SegmenterError::io(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| SegmenterError::io(dir, e))?;
        let path = entry.path();
        if path.is_file() && is_supported(&path) {
            files.push(path);
        }
    }
    files.sort();

    info!(dir = %dir.display(), files = files.len(), "batch mode");
    Ok(files)
}
