use crate::emotion::Sentiment;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};

/// Both polar scores at or above this make a fragment `Mixed`.
pub const MIXED_THRESHOLD: f32 = 0.35;

#[derive(thiserror::Error, Debug)]
pub enum SentimentError {
    #[error("cannot score empty text")]
    EmptyText,
    #[error("{field} score must be within [0, 1], got {value}")]
    ScoreOutOfRange { field: &'static str, value: f32 },
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("sentiment api error: {0}")]
    Api(String),
    #[error("invalid sentiment response: {0}")]
    InvalidResponse(String),
}

/// Per-class confidences from a text-sentiment provider. They need not sum to one.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct SentimentScores {
    pub positive: f32,
    pub neutral: f32,
    pub negative: f32,
}

impl SentimentScores {
    pub fn new(positive: f32, neutral: f32, negative: f32) -> Result<Self, SentimentError> {
        for (field, value) in [
            ("positive", positive),
            ("neutral", neutral),
            ("negative", negative),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(SentimentError::ScoreOutOfRange { field, value });
            }
        }
        Ok(Self {
            positive,
            neutral,
            negative,
        })
    }

    /// Returns `(label, confidence, intensity)`; intensity is `1 - neutral`.
    pub fn classify(&self) -> (Sentiment, f32, f32) {
        let positive = self.positive.clamp(0.0, 1.0);
        let neutral = self.neutral.clamp(0.0, 1.0);
        let negative = self.negative.clamp(0.0, 1.0);
        let intensity = (1.0 - neutral).clamp(0.0, 1.0);

        if positive >= MIXED_THRESHOLD && negative >= MIXED_THRESHOLD {
            return (Sentiment::Mixed, positive.max(negative), intensity);
        }
        if positive > neutral && positive >= negative {
            (Sentiment::Positive, positive, intensity)
        } else if negative > neutral && negative > positive {
            (Sentiment::Negative, negative, intensity)
        } else {
            (Sentiment::Neutral, neutral, intensity)
        }
    }
}

pub trait SentimentProvider: Send + Sync {
    fn score(&self, text: String) -> BoxFuture<'_, Result<SentimentScores, SentimentError>>;
}

const POSITIVE_WORDS: &[&str] = &[
    "great", "excellent", "love", "happy", "excited", "amazing", "benefit", "benefits", "save",
    "saves", "easy", "fast", "best", "perfect", "glad", "wonderful", "improve", "improves",
    "success", "confident", "thrilled", "fantastic", "proud",
];

const NEGATIVE_WORDS: &[&str] = &[
    "problem", "problems", "issue", "issues", "expensive", "difficult", "bad", "terrible",
    "worried", "unfortunately", "fail", "fails", "slow", "hate", "angry", "frustrated",
    "frustrating", "sorry", "risk", "costly", "awful", "sad", "annoying",
];

/// Offline keyword scorer, used when no cloud sentiment endpoint is configured.
#[derive(Clone, Debug, Default)]
pub struct LexiconSentimentProvider;

impl LexiconSentimentProvider {
    pub fn new() -> Self {
        Self
    }

    pub fn score_text(&self, text: &str) -> SentimentScores {
        let mut positive_hits = 0u32;
        let mut negative_hits = 0u32;
        for word in text.split_whitespace() {
            let word = word
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            if POSITIVE_WORDS.contains(&word.as_str()) {
                positive_hits += 1;
            } else if NEGATIVE_WORDS.contains(&word.as_str()) {
                negative_hits += 1;
            }
        }

        let hits = positive_hits + negative_hits;
        if hits == 0 {
            return SentimentScores {
                positive: 0.05,
                neutral: 0.9,
                negative: 0.05,
            };
        }

        let polar = (0.6 + 0.15 * (hits - 1) as f32).min(0.95);
        SentimentScores {
            positive: polar * positive_hits as f32 / hits as f32,
            neutral: 1.0 - polar,
            negative: polar * negative_hits as f32 / hits as f32,
        }
    }
}

impl SentimentProvider for LexiconSentimentProvider {
    fn score(&self, text: String) -> BoxFuture<'_, Result<SentimentScores, SentimentError>> {
        async move {
            if text.trim().is_empty() {
                return Err(SentimentError::EmptyText);
            }
            Ok(self.score_text(&text))
        }
        .boxed()
    }
}
