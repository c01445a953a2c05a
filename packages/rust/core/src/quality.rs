//! Confidence tiers and review flags.
//!
//! Both are deterministic functions of a segment's fields. The confidence
//! tier must be computed first because the attention flag consumes it.

use cultureseg_shared::{Confidence, QualityConfig, Segment, SegmentId};

/// Truncation marker left by enrichment collaborators.
const ELLIPSIS: &str = "...";

/// Length thresholds used by the classifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityThresholds {
    /// Summaries shorter than this (in characters) are only `medium`.
    pub min_summary_chars: usize,
    /// Content shorter than this (in characters) needs review.
    pub min_content_chars: usize,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            min_summary_chars: 100,
            min_content_chars: 200,
        }
    }
}

impl From<&QualityConfig> for QualityThresholds {
    fn from(config: &QualityConfig) -> Self {
        Self {
            min_summary_chars: config.min_summary_chars,
            min_content_chars: config.min_content_chars,
        }
    }
}

impl QualityThresholds {
    /// Derive the confidence tier.
    ///
    /// An external `summary_quality_score` is passed through unchanged.
    /// Otherwise a missing, short, or truncated summary is `medium` and
    /// anything else is `high`; `low` is never derived here.
    pub fn classify(&self, segment: &Segment) -> Confidence {
        if let Some(score) = segment.summary_quality_score {
            return score;
        }

        match segment.summary.as_deref() {
            Some(summary)
                if summary.chars().count() >= self.min_summary_chars
                    && !summary.ends_with(ELLIPSIS) =>
            {
                Confidence::High
            }
            _ => Confidence::Medium,
        }
    }

    /// Whether a human should review this segment.
    pub fn needs_attention(&self, segment: &Segment) -> bool {
        let confidence = segment
            .confidence_score
            .unwrap_or_else(|| self.classify(segment));

        matches!(confidence, Confidence::Low | Confidence::Medium)
            || segment.content_chars() < self.min_content_chars
            || !segment.has_tags()
    }

    /// Finalize segments: ensure an id, then confidence, then attention.
    /// Safe to run more than once.
    pub fn postprocess(&self, segments: &mut [Segment]) {
        for seg in segments {
            seg.segment_id.get_or_insert_with(SegmentId::new);
            let confidence = self.classify(seg);
            seg.confidence_score = Some(confidence);
            seg.needs_attention = Some(self.needs_attention(seg));
        }
    }
}

/// [`QualityThresholds::classify`] with default thresholds.
pub fn classify(segment: &Segment) -> Confidence {
    QualityThresholds::default().classify(segment)
}

/// [`QualityThresholds::needs_attention`] with default thresholds.
pub fn needs_attention(segment: &Segment) -> bool {
    QualityThresholds::default().needs_attention(segment)
}

/// [`QualityThresholds::postprocess`] with default thresholds.
pub fn postprocess(segments: &mut [Segment]) {
    QualityThresholds::default().postprocess(segments)
}
