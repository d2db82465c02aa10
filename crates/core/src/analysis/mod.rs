//! Reduces a session's emotion segments into presentation-level delivery
//! metrics. Every ratio has a defined default for empty input, so a valid
//! session always yields a complete analysis.

use crate::correlation::RawFacialInstance;
use crate::emotion::{EmotionLabel, EmotionSegment, FacialEmotion, Sentiment, SpeakingContext};
use serde::{Deserialize, Serialize};

/// Negative text above this intensity counts as a frustration moment.
pub const FRUSTRATION_INTENSITY: f32 = 0.6;

/// Finalized, read-only emotional-delivery report for one session.
///
/// Moments are indices into the owned segment list; use the accessor methods
/// to resolve them. Deserialization rejects indices outside that list.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "AnalysisRecord")]
pub struct EmotionAnalysis {
    pub avg_text_sentiment: f32,
    pub text_consistency_score: f32,
    pub avg_facial_positivity: f32,
    pub nervousness_score: f32,
    pub dominant_facial_emotion: FacialEmotion,
    pub authenticity_score: f32,
    pub appropriateness_score: f32,
    pub frustration_incidents: usize,
    pub confidence_trend: Vec<f32>,
    segments: Vec<EmotionSegment>,
    highest_enthusiasm: Option<usize>,
    lowest_confidence: Option<usize>,
    frustration: Vec<usize>,
    incongruent: Vec<usize>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("{moment} moment points at segment {index}, but only {len} segments exist")]
    MomentOutOfRange {
        moment: &'static str,
        index: usize,
        len: usize,
    },
}

impl EmotionAnalysis {
    pub fn segments(&self) -> &[EmotionSegment] {
        &self.segments
    }

    pub fn highest_enthusiasm_moment(&self) -> Option<&EmotionSegment> {
        self.highest_enthusiasm.and_then(|i| self.segments.get(i))
    }

    pub fn lowest_confidence_moment(&self) -> Option<&EmotionSegment> {
        self.lowest_confidence.and_then(|i| self.segments.get(i))
    }

    pub fn frustration_moments(&self) -> impl Iterator<Item = &EmotionSegment> {
        self.frustration.iter().filter_map(|&i| self.segments.get(i))
    }

    pub fn incongruent_moments(&self) -> impl Iterator<Item = &EmotionSegment> {
        self.incongruent.iter().filter_map(|&i| self.segments.get(i))
    }

    pub fn has_facial_data(&self) -> bool {
        self.segments.iter().any(EmotionSegment::is_correlated)
    }
}

#[derive(Deserialize)]
struct AnalysisRecord {
    avg_text_sentiment: f32,
    text_consistency_score: f32,
    avg_facial_positivity: f32,
    nervousness_score: f32,
    dominant_facial_emotion: FacialEmotion,
    authenticity_score: f32,
    appropriateness_score: f32,
    frustration_incidents: usize,
    confidence_trend: Vec<f32>,
    segments: Vec<EmotionSegment>,
    highest_enthusiasm: Option<usize>,
    lowest_confidence: Option<usize>,
    #[serde(default)]
    frustration: Vec<usize>,
    #[serde(default)]
    incongruent: Vec<usize>,
}

impl TryFrom<AnalysisRecord> for EmotionAnalysis {
    type Error = AnalysisError;

    fn try_from(record: AnalysisRecord) -> Result<Self, Self::Error> {
        let len = record.segments.len();
        let check = |moment: &'static str, index: usize| {
            if index < len {
                Ok(())
            } else {
                Err(AnalysisError::MomentOutOfRange { moment, index, len })
            }
        };
        if let Some(i) = record.highest_enthusiasm {
            check("highest_enthusiasm", i)?;
        }
        if let Some(i) = record.lowest_confidence {
            check("lowest_confidence", i)?;
        }
        for &i in &record.frustration {
            check("frustration", i)?;
        }
        for &i in &record.incongruent {
            check("incongruent", i)?;
        }

        Ok(Self {
            avg_text_sentiment: record.avg_text_sentiment,
            text_consistency_score: record.text_consistency_score,
            avg_facial_positivity: record.avg_facial_positivity,
            nervousness_score: record.nervousness_score,
            dominant_facial_emotion: record.dominant_facial_emotion,
            authenticity_score: record.authenticity_score,
            appropriateness_score: record.appropriateness_score,
            frustration_incidents: record.frustration_incidents,
            confidence_trend: record.confidence_trend,
            segments: record.segments,
            highest_enthusiasm: record.highest_enthusiasm,
            lowest_confidence: record.lowest_confidence,
            frustration: record.frustration,
            incongruent: record.incongruent,
        })
    }
}

/// Builds the analysis from the full segment list and the raw facial data
/// (empty when the facial pipeline did not run or failed).
pub fn analyze(segments: Vec<EmotionSegment>, facial: &[RawFacialInstance]) -> EmotionAnalysis {
    let text: Vec<(usize, &EmotionSegment)> = segments
        .iter()
        .enumerate()
        .filter(|(_, s)| s.is_text())
        .collect();

    let positive_intensities: Vec<f32> = text
        .iter()
        .filter(|(_, s)| s.sentiment() == Some(Sentiment::Positive))
        .map(|(_, s)| s.intensity())
        .collect();
    let avg_text_sentiment = mean(&positive_intensities).unwrap_or(0.0);

    let text_intensities: Vec<f32> = text.iter().map(|(_, s)| s.intensity()).collect();
    let text_consistency_score = match sample_stdev(&text_intensities) {
        Some(sd) => (1.0 - sd).max(0.0),
        None => 1.0,
    };

    let faces: Vec<FacialEmotion> = segments.iter().filter_map(|s| s.facial_emotion()).collect();
    let share_of = |emotion: FacialEmotion| {
        let hits = faces.iter().filter(|f| **f == emotion).count();
        fraction(hits, faces.len(), 0.0)
    };
    let avg_facial_positivity = share_of(FacialEmotion::Happiness);
    let nervousness_score = share_of(FacialEmotion::Fear);

    let judged: Vec<bool> = segments.iter().filter_map(|s| s.congruent()).collect();
    let authenticity_score = fraction(judged.iter().filter(|c| **c).count(), judged.len(), 1.0);

    let appropriate = segments
        .iter()
        .filter(|s| is_appropriate(s.context(), s.emotion()))
        .count();
    let appropriateness_score = fraction(appropriate, segments.len(), 1.0);

    let frustration: Vec<usize> = segments
        .iter()
        .enumerate()
        .filter(|(_, s)| is_frustrated(s))
        .map(|(i, _)| i)
        .collect();

    let incongruent: Vec<usize> = segments
        .iter()
        .enumerate()
        .filter(|(_, s)| s.congruent() == Some(false))
        .map(|(i, _)| i)
        .collect();

    let confidence_trend: Vec<f32> = text.iter().map(|(_, s)| s.confidence()).collect();

    let highest_enthusiasm = first_extreme(
        segments
            .iter()
            .enumerate()
            .filter(|(_, s)| s.sentiment() == Some(Sentiment::Positive))
            .map(|(i, s)| (i, s.intensity())),
        |candidate, best| candidate > best,
    );
    let lowest_confidence = first_extreme(
        text.iter().map(|(i, s)| (*i, s.confidence())),
        |candidate, best| candidate < best,
    );

    let analysis = EmotionAnalysis {
        avg_text_sentiment,
        text_consistency_score,
        avg_facial_positivity,
        nervousness_score,
        dominant_facial_emotion: dominant_facial_emotion(facial),
        authenticity_score,
        appropriateness_score,
        frustration_incidents: frustration.len(),
        confidence_trend,
        highest_enthusiasm,
        lowest_confidence,
        frustration,
        incongruent,
        segments,
    };

    tracing::info!(
        segments = analysis.segments().len(),
        authenticity = analysis.authenticity_score,
        frustration_incidents = analysis.frustration_incidents,
        dominant = ?analysis.dominant_facial_emotion,
        "emotion analysis built"
    );
    analysis
}

/// What each conversational phase expects from the speaker's words.
fn is_appropriate(context: SpeakingContext, emotion: EmotionLabel) -> bool {
    let EmotionLabel::Text(sentiment) = emotion else {
        return false;
    };
    match context {
        SpeakingContext::Presenting => sentiment == Sentiment::Positive,
        SpeakingContext::HandlingObjection => {
            matches!(sentiment, Sentiment::Neutral | Sentiment::Positive)
        }
        SpeakingContext::AnsweringQuestion => sentiment != Sentiment::Negative,
    }
}

fn is_frustrated(segment: &EmotionSegment) -> bool {
    let negative_words = segment.sentiment() == Some(Sentiment::Negative)
        && segment.intensity() > FRUSTRATION_INTENSITY;
    negative_words || segment.facial_emotion() == Some(FacialEmotion::Anger)
}

/// Emotion type with the most intervals; ties go to the first one seen.
fn dominant_facial_emotion(facial: &[RawFacialInstance]) -> FacialEmotion {
    let mut counts: Vec<(FacialEmotion, usize)> = Vec::new();
    for instance in facial {
        match counts.iter_mut().find(|(e, _)| *e == instance.emotion) {
            Some((_, n)) => *n += instance.intervals.len(),
            None => counts.push((instance.emotion, instance.intervals.len())),
        }
    }

    let mut best: Option<(FacialEmotion, usize)> = None;
    for (emotion, n) in counts {
        if n > best.map_or(0, |(_, b)| b) {
            best = Some((emotion, n));
        }
    }
    best.map_or(FacialEmotion::Neutral, |(e, _)| e)
}

fn first_extreme<I>(values: I, better: impl Fn(f32, f32) -> bool) -> Option<usize>
where
    I: Iterator<Item = (usize, f32)>,
{
    let mut best: Option<(usize, f32)> = None;
    for (i, v) in values {
        match best {
            Some((_, b)) if !better(v, b) => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

fn fraction(hits: usize, total: usize, empty: f32) -> f32 {
    if total == 0 {
        empty
    } else {
        hits as f32 / total as f32
    }
}

fn mean(values: &[f32]) -> Option<f32> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f32>() / values.len() as f32)
    }
}

/// Sample standard deviation (n - 1); `None` below two values.
fn sample_stdev(values: &[f32]) -> Option<f32> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f32>() / (values.len() - 1) as f32;
    Some(var.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::{correlate, RawInterval};
    use crate::emotion::SegmentSource;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    fn text(t: f64, sentiment: Sentiment, intensity: f32, context: SpeakingContext) -> EmotionSegment {
        EmotionSegment::builder(t, SegmentSource::Text)
            .text(format!("segment at {t}"))
            .sentiment(sentiment)
            .intensity(intensity)
            .confidence(0.9)
            .context(context)
            .build()
            .unwrap()
    }

    fn facial_instance(emotion: FacialEmotion, spans: &[(&str, &str, f32)]) -> RawFacialInstance {
        RawFacialInstance {
            emotion,
            intervals: spans
                .iter()
                .map(|(s, e, c)| RawInterval::new(*s, *e, *c))
                .collect(),
        }
    }

    #[test]
    fn empty_session_uses_defaults() {
        let analysis = analyze(Vec::new(), &[]);
        assert_eq!(analysis.avg_text_sentiment, 0.0);
        assert_eq!(analysis.text_consistency_score, 1.0);
        assert_eq!(analysis.authenticity_score, 1.0);
        assert_eq!(analysis.appropriateness_score, 1.0);
        assert_eq!(analysis.avg_facial_positivity, 0.0);
        assert_eq!(analysis.nervousness_score, 0.0);
        assert_eq!(analysis.dominant_facial_emotion, FacialEmotion::Neutral);
        assert_eq!(analysis.frustration_incidents, 0);
        assert!(analysis.confidence_trend.is_empty());
        assert!(analysis.highest_enthusiasm_moment().is_none());
        assert!(analysis.lowest_confidence_moment().is_none());
    }

    #[test]
    fn single_text_segment_is_perfectly_consistent() {
        let analysis = analyze(
            vec![text(0.0, Sentiment::Negative, 0.9, SpeakingContext::Presenting)],
            &[],
        );
        assert_eq!(analysis.text_consistency_score, 1.0);
        assert_eq!(analysis.appropriateness_score, 0.0);
    }

    #[test]
    fn consistency_is_one_minus_sample_stdev() {
        let analysis = analyze(
            vec![
                text(0.0, Sentiment::Positive, 0.2, SpeakingContext::Presenting),
                text(1.0, Sentiment::Positive, 0.6, SpeakingContext::Presenting),
            ],
            &[],
        );
        // stdev of [0.2, 0.6] with n-1 is sqrt(0.08)
        assert!(approx(analysis.text_consistency_score, 1.0 - 0.08f32.sqrt()));
        assert!(approx(analysis.avg_text_sentiment, 0.4));
    }

    #[test]
    fn appropriateness_follows_context_expectations() {
        let segments = vec![
            text(0.0, Sentiment::Neutral, 0.1, SpeakingContext::Presenting),
            text(1.0, Sentiment::Neutral, 0.1, SpeakingContext::AnsweringQuestion),
            text(2.0, Sentiment::Negative, 0.4, SpeakingContext::AnsweringQuestion),
            text(3.0, Sentiment::Positive, 0.5, SpeakingContext::HandlingObjection),
        ];
        let analysis = analyze(segments, &[]);
        assert!(approx(analysis.appropriateness_score, 0.5));
    }

    #[test]
    fn extremes_pick_first_on_ties() {
        let low = |t: f64| {
            EmotionSegment::builder(t, SegmentSource::Text)
                .sentiment(Sentiment::Positive)
                .intensity(0.8)
                .confidence(0.4)
                .build()
                .unwrap()
        };
        let segments = vec![
            text(0.0, Sentiment::Negative, 0.95, SpeakingContext::Presenting),
            low(5.0),
            low(6.0),
        ];

        let analysis = analyze(segments, &[]);

        assert_eq!(analysis.highest_enthusiasm_moment().unwrap().timestamp(), 5.0);
        assert_eq!(analysis.lowest_confidence_moment().unwrap().timestamp(), 5.0);
        assert_eq!(analysis.confidence_trend, vec![0.9, 0.4, 0.4]);
        assert_eq!(analysis.frustration_incidents, 1);
    }

    #[test]
    fn dominant_emotion_counts_intervals_across_instances() {
        let data = [
            facial_instance(FacialEmotion::Happiness, &[("0:00:00", "0:00:05", 0.9)]),
            facial_instance(
                FacialEmotion::Fear,
                &[("0:00:06", "0:00:07", 0.5), ("0:00:09", "0:00:10", 0.5)],
            ),
            facial_instance(FacialEmotion::Happiness, &[("0:00:20", "0:00:25", 0.9)]),
        ];
        assert_eq!(dominant_facial_emotion(&data), FacialEmotion::Happiness);

        let tied = [
            facial_instance(FacialEmotion::Sadness, &[("0:00:00", "0:00:05", 0.9)]),
            facial_instance(FacialEmotion::Anger, &[("0:00:06", "0:00:07", 0.5)]),
        ];
        assert_eq!(dominant_facial_emotion(&tied), FacialEmotion::Sadness);

        let empty_spans = [facial_instance(FacialEmotion::Contempt, &[])];
        assert_eq!(dominant_facial_emotion(&empty_spans), FacialEmotion::Neutral);
    }

    #[test]
    fn end_to_end_objection_scenario() {
        let mut segments = vec![
            text(0.0, Sentiment::Positive, 0.8, SpeakingContext::Presenting),
            text(30.0, Sentiment::Negative, 0.7, SpeakingContext::HandlingObjection),
            text(60.0, Sentiment::Positive, 0.9, SpeakingContext::Presenting),
        ];
        let facial = vec![
            facial_instance(FacialEmotion::Anger, &[("0:00:28", "0:00:32", 0.85)]),
            facial_instance(
                FacialEmotion::Happiness,
                &[("0:00:00", "0:00:10", 0.9), ("0:00:55", "0:01:05", 0.88)],
            ),
        ];

        correlate(&mut segments, &facial);
        let analysis = analyze(segments, &facial);

        let s = analysis.segments();
        assert_eq!(s[0].facial_emotion(), Some(FacialEmotion::Happiness));
        assert_eq!(s[0].congruent(), Some(true));
        assert_eq!(s[1].facial_emotion(), Some(FacialEmotion::Anger));
        assert_eq!(s[1].congruent(), Some(true));
        assert_eq!(s[2].facial_emotion(), Some(FacialEmotion::Happiness));
        assert_eq!(s[2].facial_confidence(), Some(0.88));
        assert_eq!(s[2].congruent(), Some(true));

        assert_eq!(analysis.frustration_incidents, 1);
        assert_eq!(analysis.frustration_moments().next().unwrap().timestamp(), 30.0);
        assert_eq!(analysis.authenticity_score, 1.0);
        assert_eq!(analysis.incongruent_moments().count(), 0);
        assert!(approx(analysis.avg_facial_positivity, 2.0 / 3.0));
        assert_eq!(analysis.nervousness_score, 0.0);
        assert_eq!(analysis.dominant_facial_emotion, FacialEmotion::Happiness);
        assert!(approx(analysis.avg_text_sentiment, 0.85));
        // presenting positive twice, objection answered with negative words
        assert!(approx(analysis.appropriateness_score, 2.0 / 3.0));
        assert_eq!(analysis.highest_enthusiasm_moment().unwrap().timestamp(), 60.0);
        assert!(analysis.has_facial_data());
    }

    #[test]
    fn incongruent_faces_lower_authenticity() {
        let mut segments = vec![
            text(1.0, Sentiment::Positive, 0.6, SpeakingContext::Presenting),
            text(3.0, Sentiment::Positive, 0.6, SpeakingContext::Presenting),
        ];
        let facial = vec![
            facial_instance(FacialEmotion::Fear, &[("0:00:00", "0:00:02", 0.7)]),
            facial_instance(FacialEmotion::Happiness, &[("0:00:02", "0:00:04", 0.7)]),
        ];

        correlate(&mut segments, &facial);
        let analysis = analyze(segments, &facial);

        assert!(approx(analysis.authenticity_score, 0.5));
        assert!(approx(analysis.nervousness_score, 0.5));
        assert_eq!(analysis.incongruent_moments().next().unwrap().timestamp(), 1.0);
    }

    #[test]
    fn round_trips_through_json_with_moments_intact() {
        let analysis = analyze(
            vec![
                text(0.0, Sentiment::Positive, 0.8, SpeakingContext::Presenting),
                text(5.0, Sentiment::Negative, 0.9, SpeakingContext::Presenting),
            ],
            &[],
        );
        let json = serde_json::to_string(&analysis).unwrap();
        let back: EmotionAnalysis = serde_json::from_str(&json).unwrap();
        assert_eq!(back, analysis);
        assert_eq!(back.highest_enthusiasm_moment().unwrap().timestamp(), 0.0);
        assert_eq!(back.frustration_moments().count(), 1);
    }

    #[test]
    fn dangling_moment_indices_are_rejected_on_deserialize() {
        let analysis = analyze(
            vec![
                text(0.0, Sentiment::Positive, 0.8, SpeakingContext::Presenting),
                text(5.0, Sentiment::Negative, 0.9, SpeakingContext::Presenting),
            ],
            &[],
        );
        let mut value = serde_json::to_value(&analysis).unwrap();
        value["segments"] = serde_json::json!([]);

        let err = serde_json::from_value::<EmotionAnalysis>(value).unwrap_err();
        assert!(err.to_string().contains("moment points at segment"));
    }
}
