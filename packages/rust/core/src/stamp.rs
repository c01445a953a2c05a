//! Run-scoped identity for segments.

use std::path::Path;

use cultureseg_shared::{RunId, Segment, SegmentId};

/// Attach run identity to a segment.
///
/// `source_file` and `run_id` are refreshed on every call; `segment_id` is
/// only assigned when absent, so stamping twice keeps the original id.
pub fn stamp<'s>(segment: &'s mut Segment, source_file: &str, run_id: &RunId) -> &'s mut Segment {
    segment.source_file = Some(source_file.to_string());
    segment.run_id = Some(run_id.clone());
    segment.segment_id.get_or_insert_with(SegmentId::new);
    segment
}

/// Stamp every segment of one document.
pub fn stamp_all(segments: &mut [Segment], source_file: &str, run_id: &RunId) {
    for seg in segments {
        stamp(seg, source_file, run_id);
    }
}

/// The file-name component of `path`, falling back to the full path.
pub fn source_file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamp_sets_identity() {
        let run = RunId::from("20240101_120000");
        let mut seg = Segment::new("AINU", "Hokkaido");
        stamp(&mut seg, "batch1.txt", &run);
        assert_eq!(seg.source_file.as_deref(), Some("batch1.txt"));
        assert_eq!(seg.run_id, Some(run));
        assert!(seg.segment_id.is_some());
    }

    #[test]
    fn restamp_keeps_segment_id() {
        let mut seg = Segment::new("AINU", "Hokkaido");
        stamp(&mut seg, "a.txt", &RunId::from("20240101_120000"));
        let first = seg.segment_id.clone();

        let second_run = RunId::from("20240102_090000");
        stamp(&mut seg, "b.txt", &second_run);
        assert_eq!(seg.segment_id, first);
        assert_eq!(seg.source_file.as_deref(), Some("b.txt"));
        assert_eq!(seg.run_id, Some(second_run));
    }

    #[test]
    fn stamp_all_gives_distinct_ids() {
        let run = RunId::now();
        let mut segments = vec![Segment::new("AINU", ""), Segment::new("BASQUE", "")];
        stamp_all(&mut segments, "x.txt", &run);
        assert_ne!(segments[0].segment_id, segments[1].segment_id);
        assert!(segments.iter().all(|s| s.run_id.as_ref() == Some(&run)));
    }

    #[test]
    fn source_file_name_strips_directories() {
        assert_eq!(
            source_file_name(Path::new("/data/in/profiles_1.txt")),
            "profiles_1.txt"
        );
    }
}
