//! Aligns text-sentiment segments with the facial expression active at the
//! same moment and decides whether the two agree.

use crate::emotion::{EmotionLabel, EmotionSegment, FacialEmotion, Sentiment};
use crate::util::{Interval, TimecodeError};
use serde::{Deserialize, Serialize};

const LOG_TARGET: &str = "correlation";

/// Interval as delivered by the facial provider, timecodes still unparsed.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RawInterval {
    pub start: String,
    pub end: String,
    pub confidence: f32,
}

impl RawInterval {
    pub fn new(start: impl Into<String>, end: impl Into<String>, confidence: f32) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
            confidence,
        }
    }
}

/// One facial emotion type and every span in which it was observed.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RawFacialInstance {
    pub emotion: FacialEmotion,
    pub intervals: Vec<RawInterval>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FacialMatch {
    pub emotion: FacialEmotion,
    pub confidence: f32,
    pub interval: Interval,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CorrelationSummary {
    pub matched: usize,
    pub unmatched: usize,
    pub parse_failures: usize,
}

/// First interval, scanning instances then their intervals in input order,
/// whose inclusive span contains `timestamp`.
///
/// A malformed timecode met before a match aborts the lookup.
pub fn find_active(
    timestamp: f64,
    instances: &[RawFacialInstance],
) -> Result<Option<FacialMatch>, TimecodeError> {
    for instance in instances {
        for raw in &instance.intervals {
            let interval = Interval::parse(&raw.start, &raw.end)?;
            if interval.contains(timestamp) {
                return Ok(Some(FacialMatch {
                    emotion: instance.emotion,
                    confidence: raw.confidence.clamp(0.0, 1.0),
                    interval,
                }));
            }
        }
    }
    Ok(None)
}

/// Fixed compatibility table between word sentiment and facial expression.
pub fn congruent(label: EmotionLabel, facial: FacialEmotion) -> bool {
    match label {
        EmotionLabel::Text(sentiment) => sentiment_matches_face(sentiment, facial),
        EmotionLabel::Facial(_) => false,
    }
}

fn sentiment_matches_face(sentiment: Sentiment, facial: FacialEmotion) -> bool {
    use FacialEmotion as F;
    use Sentiment as S;

    match (sentiment, facial) {
        (S::Positive, F::Happiness) => true,
        (S::Negative, F::Anger | F::Sadness | F::Fear) => true,
        (S::Neutral, F::Neutral) => true,
        (
            S::Positive | S::Negative | S::Neutral | S::Mixed,
            F::Happiness
            | F::Fear
            | F::Anger
            | F::Sadness
            | F::Surprise
            | F::Contempt
            | F::Disgust
            | F::Neutral,
        ) => false,
    }
}

/// Correlates every text segment in place. Segments without facial coverage
/// (or whose lookup hit a malformed timecode) stay uncorrelated.
pub fn correlate(
    segments: &mut [EmotionSegment],
    instances: &[RawFacialInstance],
) -> CorrelationSummary {
    let mut summary = CorrelationSummary::default();

    for segment in segments.iter_mut().filter(|s| s.is_text()) {
        match find_active(segment.timestamp(), instances) {
            Ok(Some(found)) => {
                let fits = congruent(segment.emotion(), found.emotion);
                segment.attach_facial(found.emotion, found.confidence, fits);
                summary.matched += 1;
            }
            Ok(None) => summary.unmatched += 1,
            Err(e) => {
                tracing::warn!(
                    target: LOG_TARGET,
                    timestamp = segment.timestamp(),
                    error = %e,
                    "skipping facial lookup for segment"
                );
                summary.parse_failures += 1;
            }
        }
    }

    tracing::debug!(
        target: LOG_TARGET,
        matched = summary.matched,
        unmatched = summary.unmatched,
        parse_failures = summary.parse_failures,
        "correlation finished"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::{SegmentSource, SpeakingContext};

    fn text_segment(t: f64, sentiment: Sentiment) -> EmotionSegment {
        EmotionSegment::builder(t, SegmentSource::Text)
            .sentiment(sentiment)
            .intensity(0.5)
            .context(SpeakingContext::Presenting)
            .build()
            .unwrap()
    }

    fn instance(emotion: FacialEmotion, spans: &[(&str, &str, f32)]) -> RawFacialInstance {
        RawFacialInstance {
            emotion,
            intervals: spans
                .iter()
                .map(|(s, e, c)| RawInterval::new(*s, *e, *c))
                .collect(),
        }
    }

    #[test]
    fn compatibility_table() {
        let t = |s| EmotionLabel::Text(s);
        assert!(congruent(t(Sentiment::Positive), FacialEmotion::Happiness));
        assert!(!congruent(t(Sentiment::Positive), FacialEmotion::Fear));
        assert!(congruent(t(Sentiment::Negative), FacialEmotion::Anger));
        assert!(congruent(t(Sentiment::Negative), FacialEmotion::Sadness));
        assert!(congruent(t(Sentiment::Negative), FacialEmotion::Fear));
        assert!(congruent(t(Sentiment::Neutral), FacialEmotion::Neutral));
        assert!(!congruent(t(Sentiment::Neutral), FacialEmotion::Surprise));
        assert!(!congruent(t(Sentiment::Mixed), FacialEmotion::Happiness));
        assert!(!congruent(t(Sentiment::Negative), FacialEmotion::Disgust));
        assert!(!congruent(
            EmotionLabel::Facial(FacialEmotion::Happiness),
            FacialEmotion::Happiness
        ));
    }

    #[test]
    fn first_instance_in_input_order_wins_on_overlap() {
        let happy = instance(FacialEmotion::Happiness, &[("0:00:15", "0:00:45", 0.9)]);
        let fear = instance(FacialEmotion::Fear, &[("0:00:18", "0:00:22", 0.6)]);

        let found = find_active(20.0, &[fear.clone(), happy.clone()])
            .unwrap()
            .unwrap();
        assert_eq!(found.emotion, FacialEmotion::Fear);
        assert_eq!(found.confidence, 0.6);

        let found = find_active(20.0, &[happy, fear]).unwrap().unwrap();
        assert_eq!(found.emotion, FacialEmotion::Happiness);
        assert_eq!(found.interval, Interval::new(15.0, 45.0));
    }

    #[test]
    fn boundaries_match_and_gaps_do_not() {
        let happy = instance(
            FacialEmotion::Happiness,
            &[("0:00:00", "0:00:10", 0.9), ("0:00:55", "0:01:05", 0.88)],
        );
        let all = [happy];
        assert!(find_active(10.0, &all).unwrap().is_some());
        assert!(find_active(55.0, &all).unwrap().is_some());
        assert!(find_active(30.0, &all).unwrap().is_none());
    }

    #[test]
    fn malformed_timecode_leaves_segment_uncorrelated() {
        let broken = instance(FacialEmotion::Anger, &[("0:10", "0:00:40", 0.7)]);
        let happy = instance(FacialEmotion::Happiness, &[("0:00:00", "0:01:00", 0.9)]);
        let mut segments = vec![text_segment(20.0, Sentiment::Positive)];

        let summary = correlate(&mut segments, &[broken, happy]);

        assert_eq!(summary.parse_failures, 1);
        assert_eq!(summary.matched, 0);
        assert_eq!(segments[0].facial_emotion(), None);
        assert_eq!(segments[0].congruent(), None);
    }

    #[test]
    fn only_text_segments_are_correlated() {
        let happy = instance(FacialEmotion::Happiness, &[("0:00:00", "0:01:00", 0.9)]);
        let mut segments = vec![
            text_segment(5.0, Sentiment::Positive),
            EmotionSegment::builder(6.0, SegmentSource::Facial)
                .facial(FacialEmotion::Happiness)
                .build()
                .unwrap(),
            text_segment(90.0, Sentiment::Negative),
        ];

        let summary = correlate(&mut segments, &[happy]);

        assert_eq!(
            summary,
            CorrelationSummary {
                matched: 1,
                unmatched: 1,
                parse_failures: 0
            }
        );
        assert_eq!(segments[0].facial_emotion(), Some(FacialEmotion::Happiness));
        assert_eq!(segments[0].facial_confidence(), Some(0.9));
        assert_eq!(segments[0].congruent(), Some(true));
        assert_eq!(segments[1].facial_emotion(), None);
        assert_eq!(segments[2].congruent(), None);
    }
}
