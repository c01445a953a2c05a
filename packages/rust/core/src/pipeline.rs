//! End-to-end document pipeline: text → segment → stamp → enrich → classify.
//!
//! A single document is processed synchronously. [`run_batch`] fans
//! documents out over blocking workers; each document's failure is isolated
//! and reported without stopping the rest of the batch.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tracing::{info, instrument, warn};

use cultureseg_shared::{Result, RunId, Segment, SegmenterError};

use crate::enrichment::{Enricher, LanguageDetector, apply_enrichment, apply_language};
use crate::loader;
use crate::quality::QualityThresholds;
use crate::segmenter;
use crate::stamp::{source_file_name, stamp_all};
use crate::title::KnownTitles;

/// Everything one invocation shares across its documents.
#[derive(Clone)]
pub struct RunContext {
    /// Stamped on every segment of the run.
    pub run_id: RunId,
    /// Allow-list consulted by the title classifier.
    pub known_titles: KnownTitles,
    /// Optional enrichment collaborator.
    pub enricher: Option<Arc<dyn Enricher>>,
    /// Optional title-language detector.
    pub language: Option<Arc<dyn LanguageDetector>>,
    /// Confidence and attention thresholds.
    pub thresholds: QualityThresholds,
}

impl RunContext {
    pub fn new(run_id: RunId, known_titles: KnownTitles) -> Self {
        Self {
            run_id,
            known_titles,
            enricher: None,
            language: None,
            thresholds: QualityThresholds::default(),
        }
    }

    pub fn with_enricher(mut self, enricher: Arc<dyn Enricher>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    pub fn with_language(mut self, detector: Arc<dyn LanguageDetector>) -> Self {
        self.language = Some(detector);
        self
    }

    pub fn with_thresholds(mut self, thresholds: QualityThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Name of the configured enricher, if any.
    pub fn enricher_name(&self) -> Option<&str> {
        self.enricher.as_deref().map(|e| e.name())
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("run_id", &self.run_id)
            .field("known_titles", &self.known_titles.len())
            .field("enricher", &self.enricher_name())
            .field("language", &self.language.is_some())
            .field("thresholds", &self.thresholds)
            .finish()
    }
}

/// Segment and finalize one already-decoded document.
///
/// Always returns a well-formed segment list, with or without enrichment.
#[instrument(skip_all, fields(source = source_file, run_id = %ctx.run_id))]
pub fn process_text(text: &str, source_file: &str, ctx: &RunContext) -> Vec<Segment> {
    let mut segments = segmenter::segment(text, &ctx.known_titles);
    stamp_all(&mut segments, source_file, &ctx.run_id);

    let mut enriched = 0;
    for seg in &mut segments {
        if apply_enrichment(seg, ctx.enricher.as_deref()) {
            enriched += 1;
        }
        apply_language(seg, ctx.language.as_deref());
    }

    ctx.thresholds.postprocess(&mut segments);

    info!(
        segments = segments.len(),
        enriched,
        flagged = segments.iter().filter(|s| s.needs_attention == Some(true)).count(),
        "document segmented"
    );

    segments
}

/// Load and process a single document. I/O failures are returned.
pub fn process_document(path: &Path, ctx: &RunContext) -> Result<Vec<Segment>> {
    let text = loader::load_content(path)?;
    Ok(process_text(&text, &source_file_name(path), ctx))
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

/// Segments produced from one document.
#[derive(Debug)]
pub struct DocumentResult {
    pub path: PathBuf,
    pub segments: Vec<Segment>,
}

/// A document that could not be processed.
#[derive(Debug)]
pub struct DocumentFailure {
    pub path: PathBuf,
    pub error: SegmenterError,
}

/// Result of a batch run, in input order.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub documents: Vec<DocumentResult>,
    pub failures: Vec<DocumentFailure>,
    pub elapsed: std::time::Duration,
}

impl BatchOutcome {
    /// Total segments across all successful documents.
    pub fn segment_count(&self) -> usize {
        self.documents.iter().map(|d| d.segments.len()).sum()
    }

    /// All segments, document order then source order.
    pub fn into_segments(self) -> Vec<Segment> {
        self.documents
            .into_iter()
            .flat_map(|d| d.segments)
            .collect()
    }
}

/// Progress callback for batch runs.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when a document finished successfully.
    fn document_done(&self, path: &Path, segments: usize, current: usize, total: usize);
    /// Called when a document failed.
    fn document_failed(&self, path: &Path, error: &SegmenterError);
    /// Called once the batch completes.
    fn done(&self, outcome: &BatchOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn document_done(&self, _path: &Path, _segments: usize, _current: usize, _total: usize) {}
    fn document_failed(&self, _path: &Path, _error: &SegmenterError) {}
    fn done(&self, _outcome: &BatchOutcome) {}
}

/// Process many documents, at most `concurrency` at a time.
///
/// Documents share nothing but the read-only [`RunContext`]. Output keeps
/// input order regardless of completion order.
#[instrument(skip_all, fields(documents = paths.len(), run_id = %ctx.run_id, concurrency = concurrency))]
pub async fn run_batch(
    paths: &[PathBuf],
    ctx: Arc<RunContext>,
    concurrency: usize,
    progress: &dyn ProgressReporter,
) -> BatchOutcome {
    let start = Instant::now();
    let total = paths.len();
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));

    progress.phase("Segmenting documents");

    let mut handles = Vec::with_capacity(total);
    for path in paths {
        let ctx = Arc::clone(&ctx);
        let sem = Arc::clone(&semaphore);
        let worker_path = path.clone();

        let handle = tokio::spawn(async move {
            let _permit = sem
                .acquire_owned()
                .await
                .map_err(|e| SegmenterError::Worker(format!("semaphore closed: {e}")))?;
            tokio::task::spawn_blocking(move || process_document(&worker_path, &ctx))
                .await
                .map_err(|e| SegmenterError::Worker(e.to_string()))?
        });
        handles.push((path.clone(), handle));
    }

    // Awaiting in spawn order keeps input order.
    let mut outcome = BatchOutcome::default();
    for (current, (path, handle)) in handles.into_iter().enumerate() {
        let result = handle
            .await
            .unwrap_or_else(|e| Err(SegmenterError::Worker(e.to_string())));

        match result {
            Ok(segments) => {
                progress.document_done(&path, segments.len(), current + 1, total);
                outcome.documents.push(DocumentResult { path, segments });
            }
            Err(error) => {
                warn!(path = %path.display(), error = %error, "document failed, continuing batch");
                progress.document_failed(&path, &error);
                outcome.failures.push(DocumentFailure { path, error });
            }
        }
    }
    outcome.elapsed = start.elapsed();

    progress.done(&outcome);

    info!(
        documents = outcome.documents.len(),
        failures = outcome.failures.len(),
        segments = outcome.segment_count(),
        elapsed_ms = outcome.elapsed.as_millis(),
        "batch complete"
    );

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::{Enrichment, UndeterminedLanguage};
    use cultureseg_shared::Confidence;
    use std::sync::Mutex;
    use uuid::Uuid;

    fn ctx(known: &[&str]) -> RunContext {
        RunContext::new(RunId::from("20240101_000000"), known.iter().copied().collect())
    }

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("cs_pipeline_{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    struct Broken;

    impl Enricher for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn enrich(&self, _title: &str, _content: &str) -> Result<Enrichment> {
            Err(SegmenterError::Enrichment("timeout".into()))
        }
    }

    struct Generous;

    impl Enricher for Generous {
        fn name(&self) -> &str {
            "generous"
        }

        fn enrich(&self, title: &str, _content: &str) -> Result<Enrichment> {
            Ok(Enrichment {
                summary: Some(format!("{title}: {}", "a detailed summary ".repeat(10))),
                tags: Some(vec!["culture".into()]),
                summary_quality_score: None,
            })
        }
    }

    #[derive(Default)]
    struct Recording {
        done: Mutex<Vec<PathBuf>>,
        failed: Mutex<Vec<PathBuf>>,
    }

    impl ProgressReporter for Recording {
        fn phase(&self, _name: &str) {}
        fn document_done(&self, path: &Path, _segments: usize, _current: usize, _total: usize) {
            self.done.lock().unwrap().push(path.to_path_buf());
        }
        fn document_failed(&self, path: &Path, _error: &SegmenterError) {
            self.failed.lock().unwrap().push(path.to_path_buf());
        }
        fn done(&self, _outcome: &BatchOutcome) {}
    }

    #[test]
    fn process_text_without_enrichment() {
        let text = "JAPANESE\nIntro\nDetails...\nFRENCH\nBonjour\nOui oui";
        let segments = process_text(text, "batch.txt", &ctx(&["JAPANESE", "FRENCH"]));

        assert_eq!(segments.len(), 2);
        for seg in &segments {
            assert_eq!(seg.source_file.as_deref(), Some("batch.txt"));
            assert_eq!(seg.run_id.as_ref().map(|r| r.as_str()), Some("20240101_000000"));
            assert!(seg.segment_id.is_some());
            assert_eq!(seg.title_lang.as_deref(), Some("und"));
            assert_eq!(seg.confidence_score, Some(Confidence::Medium));
            assert_eq!(seg.needs_attention, Some(true));
            assert!(seg.tags.is_none());
        }
    }

    #[test]
    fn failing_enricher_does_not_break_processing() {
        let ctx = ctx(&[]).with_enricher(Arc::new(Broken));
        let segments = process_text("AINU\nHokkaido", "a.txt", &ctx);
        assert_eq!(segments.len(), 1);
        assert!(segments[0].summary.is_none());
        assert_eq!(segments[0].confidence_score, Some(Confidence::Medium));
    }

    #[test]
    fn enrichment_can_clear_attention() {
        let ctx = ctx(&[])
            .with_enricher(Arc::new(Generous))
            .with_language(Arc::new(UndeterminedLanguage));
        let text = format!("AINU\n{}", "Hokkaido and Sakhalin. ".repeat(12));
        let segments = process_text(&text, "a.txt", &ctx);
        assert_eq!(segments[0].confidence_score, Some(Confidence::High));
        assert_eq!(segments[0].needs_attention, Some(false));
    }

    #[test]
    fn process_document_missing_file() {
        let err = process_document(Path::new("/nonexistent/profiles.txt"), &ctx(&[])).unwrap_err();
        assert!(matches!(err, SegmenterError::Io { .. }));
    }

    #[tokio::test]
    async fn batch_isolates_failures_and_keeps_order() {
        let dir = temp_dir();
        let first = dir.join("first.txt");
        let second = dir.join("second.txt");
        std::fs::write(&first, "AINU\nHokkaido").unwrap();
        std::fs::write(&second, "BASQUE\nPyrenees\nCHEROKEE\nAppalachia").unwrap();
        let missing = dir.join("missing.txt");
        let pdf = dir.join("profiles.pdf");

        let paths = vec![missing.clone(), first.clone(), pdf.clone(), second.clone()];
        let progress = Recording::default();
        let outcome = run_batch(&paths, Arc::new(ctx(&[])), 2, &progress).await;

        let ok: Vec<_> = outcome.documents.iter().map(|d| d.path.clone()).collect();
        assert_eq!(ok, [first, second]);
        let failed: Vec<_> = outcome.failures.iter().map(|f| f.path.clone()).collect();
        assert_eq!(failed, [missing, pdf]);
        assert!(matches!(
            outcome.failures[1].error,
            SegmenterError::UnsupportedFormat { .. }
        ));

        assert_eq!(progress.done.lock().unwrap().len(), 2);
        assert_eq!(progress.failed.lock().unwrap().len(), 2);

        let titles: Vec<_> = outcome
            .into_segments()
            .into_iter()
            .map(|s| s.title)
            .collect();
        assert_eq!(titles, ["AINU", "BASQUE", "CHEROKEE"]);
    }

    #[tokio::test]
    async fn empty_batch() {
        let outcome = run_batch(&[], Arc::new(ctx(&[])), 4, &SilentProgress).await;
        assert!(outcome.documents.is_empty());
        assert!(outcome.failures.is_empty());
    }
}
