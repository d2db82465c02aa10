mod http;
mod sentiment;
mod store;

use serde::{Deserialize, Serialize};

pub use http::{HttpSentimentProvider, DEFAULT_SENTIMENT_API_VERSION};
pub use sentiment::{
    LexiconSentimentProvider, SentimentError, SentimentProvider, SentimentScores, MIXED_THRESHOLD,
};
pub use store::EmotionSegmentStore;

/// Sentiment of the speaker's words.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
    Mixed,
}

/// Expression read from the speaker's face.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FacialEmotion {
    Happiness,
    Fear,
    Anger,
    Sadness,
    Surprise,
    Contempt,
    Disgust,
    Neutral,
}

impl FacialEmotion {
    /// Maps provider emotion names ("Joy", "Sad", "anger", ...) onto the closed set.
    pub fn from_label(label: &str) -> Option<Self> {
        let emotion = match label.trim().to_ascii_lowercase().as_str() {
            "happiness" | "happy" | "joy" => Self::Happiness,
            "fear" | "fearful" => Self::Fear,
            "anger" | "angry" => Self::Anger,
            "sadness" | "sad" => Self::Sadness,
            "surprise" | "surprised" => Self::Surprise,
            "contempt" => Self::Contempt,
            "disgust" | "disgusted" => Self::Disgust,
            "neutral" => Self::Neutral,
            _ => return None,
        };
        Some(emotion)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EmotionLabel {
    Text(Sentiment),
    Facial(FacialEmotion),
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SegmentSource {
    Text,
    Facial,
    Combined,
}

/// Conversational phase a segment was spoken in.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpeakingContext {
    #[default]
    Presenting,
    AnsweringQuestion,
    HandlingObjection,
}

const OBJECTION_CUES: &[&str] = &[
    "too expensive",
    "not sure",
    "concern",
    "worried",
    "already use",
    "already have",
    "don't see",
    "doubt",
    "not convinced",
    "competitor",
];

impl SpeakingContext {
    /// Phase the speaker enters after the avatar says `line`.
    pub fn after_avatar_line(line: &str) -> Self {
        let lower = line.to_lowercase();
        if OBJECTION_CUES.iter().any(|cue| lower.contains(cue)) {
            Self::HandlingObjection
        } else if lower.trim_end().ends_with('?') {
            Self::AnsweringQuestion
        } else {
            Self::Presenting
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SegmentError {
    #[error("{field} must be within [0, 1], got {value}")]
    OutOfUnitRange { field: &'static str, value: f32 },
    #[error("{field} must be finite and >= 0, got {value}")]
    InvalidTime { field: &'static str, value: f64 },
    #[error("text segment at {timestamp}s arrived after one at {previous}s")]
    OutOfOrder { timestamp: f64, previous: f64 },
    #[error("segment requires an emotion label")]
    MissingEmotion,
}

/// One observation of the speaker's emotional state.
///
/// Only constructible through [`SegmentBuilder`] or validated deserialization,
/// so confidence and intensity always lie in [0, 1] and times are finite and >= 0.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "SegmentRecord")]
pub struct EmotionSegment {
    timestamp: f64,
    duration: f64,
    text: String,
    emotion: EmotionLabel,
    source: SegmentSource,
    confidence: f32,
    intensity: f32,
    context: SpeakingContext,
    facial_emotion: Option<FacialEmotion>,
    facial_confidence: Option<f32>,
    congruent: Option<bool>,
}

impl EmotionSegment {
    pub fn builder(timestamp: f64, source: SegmentSource) -> SegmentBuilder {
        SegmentBuilder {
            timestamp,
            source,
            duration: 0.0,
            text: String::new(),
            emotion: None,
            confidence: 1.0,
            intensity: 0.0,
            context: SpeakingContext::default(),
        }
    }

    /// Convenience for the common case of a sentiment-scored transcript fragment.
    pub fn from_scores(
        timestamp: f64,
        duration: f64,
        text: impl Into<String>,
        scores: &SentimentScores,
        context: SpeakingContext,
    ) -> Result<Self, SegmentError> {
        let (sentiment, confidence, intensity) = scores.classify();
        Self::builder(timestamp, SegmentSource::Text)
            .duration(duration)
            .text(text)
            .sentiment(sentiment)
            .confidence(confidence)
            .intensity(intensity)
            .context(context)
            .build()
    }

    /// Seconds from session start.
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn emotion(&self) -> EmotionLabel {
        self.emotion
    }

    pub fn source(&self) -> SegmentSource {
        self.source
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    /// Distance from neutral.
    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    pub fn context(&self) -> SpeakingContext {
        self.context
    }

    pub fn facial_emotion(&self) -> Option<FacialEmotion> {
        self.facial_emotion
    }

    pub fn facial_confidence(&self) -> Option<f32> {
        self.facial_confidence
    }

    pub fn congruent(&self) -> Option<bool> {
        self.congruent
    }

    pub fn is_text(&self) -> bool {
        self.source == SegmentSource::Text
    }

    pub fn sentiment(&self) -> Option<Sentiment> {
        match self.emotion {
            EmotionLabel::Text(s) => Some(s),
            EmotionLabel::Facial(_) => None,
        }
    }

    pub fn is_correlated(&self) -> bool {
        self.facial_emotion.is_some()
    }

    /// The only mutation a stored segment ever sees.
    pub(crate) fn attach_facial(&mut self, emotion: FacialEmotion, confidence: f32, congruent: bool) {
        self.facial_emotion = Some(emotion);
        self.facial_confidence = Some(confidence.clamp(0.0, 1.0));
        self.congruent = Some(congruent);
    }
}

/// Wire form of a segment, checked before it becomes an [`EmotionSegment`].
#[derive(Deserialize)]
struct SegmentRecord {
    timestamp: f64,
    #[serde(default)]
    duration: f64,
    #[serde(default)]
    text: String,
    emotion: EmotionLabel,
    source: SegmentSource,
    confidence: f32,
    intensity: f32,
    #[serde(default)]
    context: SpeakingContext,
    #[serde(default)]
    facial_emotion: Option<FacialEmotion>,
    #[serde(default)]
    facial_confidence: Option<f32>,
    #[serde(default)]
    congruent: Option<bool>,
}

impl TryFrom<SegmentRecord> for EmotionSegment {
    type Error = SegmentError;

    fn try_from(record: SegmentRecord) -> Result<Self, Self::Error> {
        if let Some(confidence) = record.facial_confidence {
            check_unit("facial_confidence", confidence)?;
        }
        let mut builder = EmotionSegment::builder(record.timestamp, record.source)
            .duration(record.duration)
            .text(record.text)
            .confidence(record.confidence)
            .intensity(record.intensity)
            .context(record.context);
        builder.emotion = Some(record.emotion);
        let mut segment = builder.build()?;
        segment.facial_emotion = record.facial_emotion;
        segment.facial_confidence = record.facial_confidence;
        segment.congruent = record.congruent;
        Ok(segment)
    }
}

#[derive(Clone, Debug)]
pub struct SegmentBuilder {
    timestamp: f64,
    source: SegmentSource,
    duration: f64,
    text: String,
    emotion: Option<EmotionLabel>,
    confidence: f32,
    intensity: f32,
    context: SpeakingContext,
}

impl SegmentBuilder {
    pub fn duration(mut self, duration: f64) -> Self {
        self.duration = duration;
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn sentiment(mut self, sentiment: Sentiment) -> Self {
        self.emotion = Some(EmotionLabel::Text(sentiment));
        self
    }

    pub fn facial(mut self, emotion: FacialEmotion) -> Self {
        self.emotion = Some(EmotionLabel::Facial(emotion));
        self
    }

    pub fn confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn intensity(mut self, intensity: f32) -> Self {
        self.intensity = intensity;
        self
    }

    pub fn context(mut self, context: SpeakingContext) -> Self {
        self.context = context;
        self
    }

    pub fn build(self) -> Result<EmotionSegment, SegmentError> {
        check_time("timestamp", self.timestamp)?;
        check_time("duration", self.duration)?;
        check_unit("confidence", self.confidence)?;
        check_unit("intensity", self.intensity)?;
        let emotion = self.emotion.ok_or(SegmentError::MissingEmotion)?;

        Ok(EmotionSegment {
            timestamp: self.timestamp,
            duration: self.duration,
            text: self.text,
            emotion,
            source: self.source,
            confidence: self.confidence,
            intensity: self.intensity,
            context: self.context,
            facial_emotion: None,
            facial_confidence: None,
            congruent: None,
        })
    }
}

fn check_unit(field: &'static str, value: f32) -> Result<(), SegmentError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(SegmentError::OutOfUnitRange { field, value })
    }
}

fn check_time(field: &'static str, value: f64) -> Result<(), SegmentError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(SegmentError::InvalidTime { field, value })
    }
}
