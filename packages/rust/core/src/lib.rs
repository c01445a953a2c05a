//! Segmentation and classification logic for cultureseg.
//!
//! This crate turns raw culture-profile text into titled, stamped and
//! classified [`Segment`](cultureseg_shared::Segment)s, and provides the
//! batch pipeline, duplicate handling, and run diagnostics built on top.

pub mod dedup;
pub mod enrichment;
pub mod loader;
pub mod pipeline;
pub mod quality;
pub mod report;
pub mod segmenter;
pub mod stamp;
pub mod title;

pub use dedup::{filter_segments, find_duplicate_titles, flagged_segments, merge_into_repo};
pub use pipeline::{
    BatchOutcome, ProgressReporter, RunContext, SilentProgress, process_document, process_text,
    run_batch,
};
pub use quality::{QualityThresholds, classify, needs_attention, postprocess};
pub use segmenter::segment;
pub use title::{KnownTitles, is_title};
