use crate::correlation::{self, CorrelationSummary, RawFacialInstance};
use crate::emotion::{EmotionSegment, SegmentError};

/// Append-only, per-session collection of emotion observations.
///
/// Text segments must arrive in non-decreasing timestamp order; facial
/// segments come in one batch after the session and may be unordered. Only
/// the correlation fields of a stored segment are ever updated.
#[derive(Clone, Debug, Default)]
pub struct EmotionSegmentStore {
    segments: Vec<EmotionSegment>,
    last_text_timestamp: Option<f64>,
}

impl EmotionSegmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_text(&mut self, segment: EmotionSegment) -> Result<(), SegmentError> {
        if let Some(previous) = self.last_text_timestamp {
            if segment.timestamp() < previous {
                return Err(SegmentError::OutOfOrder {
                    timestamp: segment.timestamp(),
                    previous,
                });
            }
        }
        self.last_text_timestamp = Some(segment.timestamp());
        self.segments.push(segment);
        Ok(())
    }

    pub fn extend_facial<I>(&mut self, segments: I)
    where
        I: IntoIterator<Item = EmotionSegment>,
    {
        self.segments.extend(segments);
    }

    pub fn segments(&self) -> &[EmotionSegment] {
        &self.segments
    }

    pub fn text_segments(&self) -> impl Iterator<Item = &EmotionSegment> {
        self.segments.iter().filter(|s| s.is_text())
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Attaches facial emotion and congruence to every text segment that has a match.
    pub fn correlate(&mut self, instances: &[RawFacialInstance]) -> CorrelationSummary {
        correlation::correlate(&mut self.segments, instances)
    }

    pub fn into_segments(self) -> Vec<EmotionSegment> {
        self.segments
    }

    pub fn clear(&mut self) {
        self.segments.clear();
        self.last_text_timestamp = None;
    }
}
