//! Line-oriented segmentation of raw documents into per-subject segments.
//!
//! The engine walks the document once. Text before the first title collects
//! into an overview buffer; each title (consecutive title lines joined into
//! one) closes the segment that was open and starts a new one. Nothing is
//! ever discarded: trailing text belongs to the last open segment.

use tracing::{debug, instrument, warn};

use cultureseg_shared::{OVERVIEW_TITLE, Segment};

use crate::title::{KnownTitles, is_title};

/// Segmentation state.
enum State {
    /// No title seen yet; the buffer is the provisional overview.
    BeforeFirstTitle,
    /// A title is open; the buffer is its content.
    InSegment { title: String },
    /// Input exhausted, segments flushed.
    Done,
}

struct Segmenter<'a> {
    state: State,
    buffer: Vec<&'a str>,
    segments: Vec<Segment>,
}

impl<'a> Segmenter<'a> {
    fn new() -> Self {
        Self {
            state: State::BeforeFirstTitle,
            buffer: Vec::new(),
            segments: Vec::new(),
        }
    }

    fn push_line(&mut self, line: &'a str) {
        self.buffer.push(line);
    }

    fn open_title(&mut self, title: String) {
        let had_lines = !self.buffer.is_empty();
        let content = self.take_buffer();
        match std::mem::replace(&mut self.state, State::InSegment { title }) {
            State::BeforeFirstTitle => {
                // Any leading line, blank ones included, yields an overview.
                if had_lines {
                    self.segments.push(Segment::new(OVERVIEW_TITLE, content));
                }
            }
            State::InSegment { title: open } => {
                self.segments.push(Segment::new(open, content));
            }
            State::Done => unreachable!("segmenter fed after finish"),
        }
    }

    fn finish(mut self) -> Vec<Segment> {
        let content = self.take_buffer();
        match std::mem::replace(&mut self.state, State::Done) {
            State::BeforeFirstTitle => {
                if content.trim().is_empty() {
                    warn!("document is blank, no segments produced");
                } else {
                    warn!("no title lines detected, keeping whole document as overview");
                    self.segments.push(Segment::new(OVERVIEW_TITLE, content));
                }
            }
            State::InSegment { title } => {
                self.segments.push(Segment::new(title, content));
            }
            State::Done => {}
        }
        self.segments
    }

    fn take_buffer(&mut self) -> String {
        let content = self.buffer.join("\n");
        self.buffer.clear();
        content
    }
}

/// Split `text` into ordered segments.
///
/// Output order matches the order titles appear in the source, with the
/// `"Overview"` segment first when present. Segments with empty content are
/// kept and reported as warnings.
#[instrument(skip_all, fields(bytes = text.len(), known = known_titles.len()))]
pub fn segment(text: &str, known_titles: &KnownTitles) -> Vec<Segment> {
    let mut segmenter = Segmenter::new();
    let mut lines = text.lines().peekable();

    while let Some(line) = lines.next() {
        if !is_title(line, known_titles) {
            segmenter.push_line(line);
            continue;
        }

        // Titles may wrap across physical lines.
        let mut parts = vec![line.trim()];
        while let Some(next) = lines.next_if(|l| is_title(l, known_titles)) {
            parts.push(next.trim());
        }
        let title = parts.join(" ");
        debug!(%title, lines = parts.len(), "title detected");
        segmenter.open_title(title);
    }

    let segments = segmenter.finish();

    for seg in &segments {
        if seg.content.trim().is_empty() {
            warn!(title = %seg.title, "segment has empty content");
        }
    }
    debug!(count = segments.len(), "segmentation complete");

    segments
}
