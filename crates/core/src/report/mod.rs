//! Structured coaching report produced by an external writer after the session.

use crate::analysis::EmotionAnalysis;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const LOG_TARGET: &str = "report";

pub const MIN_SCORE: f32 = 1.0;
pub const MAX_SCORE: f32 = 10.0;

#[derive(thiserror::Error, Debug)]
pub enum ReportError {
    #[error("report is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{field} must be within [1, 10], got {value}")]
    ScoreOutOfRange { field: &'static str, value: f32 },
    #[error("report writer failed: {0}")]
    Writer(String),
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceLevel {
    Excellent,
    Good,
    Fair,
    NeedsImprovement,
}

impl PerformanceLevel {
    pub fn from_score(score: f32) -> Self {
        if score >= 9.0 {
            Self::Excellent
        } else if score >= 7.0 {
            Self::Good
        } else if score >= 5.0 {
            Self::Fair
        } else {
            Self::NeedsImprovement
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct CriteriaScores {
    pub value_proposition: f32,
    pub objection_handling: f32,
    pub active_listening: f32,
    pub question_quality: f32,
    pub call_to_action: f32,
    pub engagement: f32,
    pub rule_compliance: f32,
}

impl CriteriaScores {
    fn named(&self) -> [(&'static str, f32); 7] {
        [
            ("value_proposition", self.value_proposition),
            ("objection_handling", self.objection_handling),
            ("active_listening", self.active_listening),
            ("question_quality", self.question_quality),
            ("call_to_action", self.call_to_action),
            ("engagement", self.engagement),
            ("rule_compliance", self.rule_compliance),
        ]
    }

    pub fn mean(&self) -> f32 {
        let named = self.named();
        named.iter().map(|(_, v)| v).sum::<f32>() / named.len() as f32
    }

    /// The lowest-scoring criterion; ties go to the one listed first.
    pub fn weakest(&self) -> (&'static str, f32) {
        self.named()
            .into_iter()
            .fold(("value_proposition", f32::INFINITY), |low, c| {
                if c.1 < low.1 {
                    c
                } else {
                    low
                }
            })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ImprovementItem {
    pub area: String,
    pub current_state: String,
    pub recommendation: String,
    #[serde(default)]
    pub example: Option<String>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RuleViolation {
    pub rule_category: String,
    pub rule_name: String,
    pub severity: Severity,
    pub description: String,
    #[serde(default)]
    pub example: Option<String>,
    pub suggestion: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CoachingReport {
    pub overall_score: f32,
    pub performance_level: PerformanceLevel,
    pub criteria_scores: CriteriaScores,
    pub strengths: Vec<String>,
    pub improvements: Vec<ImprovementItem>,
    #[serde(default)]
    pub rule_violations: Vec<RuleViolation>,
    pub summary: String,
    pub next_steps: Vec<String>,
}

impl CoachingReport {
    /// Parses and validates the writer's JSON.
    ///
    /// Every score must lie in [1, 10]. A performance level that disagrees
    /// with the overall score is replaced by the level the score implies.
    pub fn from_json(json: &str) -> Result<Self, ReportError> {
        let mut report: CoachingReport = serde_json::from_str(json)?;
        check_score("overall_score", report.overall_score)?;
        for (field, value) in report.criteria_scores.named() {
            check_score(field, value)?;
        }

        let derived = PerformanceLevel::from_score(report.overall_score);
        if derived != report.performance_level {
            tracing::warn!(
                target: LOG_TARGET,
                reported = ?report.performance_level,
                ?derived,
                overall = report.overall_score,
                "performance level disagrees with overall score"
            );
            report.performance_level = derived;
        }
        Ok(report)
    }

    pub fn high_severity_violations(&self) -> impl Iterator<Item = &RuleViolation> {
        self.rule_violations
            .iter()
            .filter(|v| v.severity == Severity::High)
    }
}

fn check_score(field: &'static str, value: f32) -> Result<(), ReportError> {
    if value.is_finite() && (MIN_SCORE..=MAX_SCORE).contains(&value) {
        Ok(())
    } else {
        Err(ReportError::ScoreOutOfRange { field, value })
    }
}

/// Everything the report writer sees about a finished session.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ReportRequest {
    pub transcript: String,
    pub duration: Duration,
    pub emotion: Option<EmotionAnalysis>,
}

impl ReportRequest {
    /// Short plain-text digest of the emotion analysis for the writer's prompt.
    pub fn emotion_notes(&self) -> Option<String> {
        let analysis = self.emotion.as_ref()?;
        let mut lines = vec![
            format!("Average text sentiment: {:.2}", analysis.avg_text_sentiment),
            format!("Consistency: {:.2}", analysis.text_consistency_score),
            format!("Frustration incidents: {}", analysis.frustration_incidents),
        ];
        if analysis.has_facial_data() {
            lines.push(format!(
                "Dominant facial emotion: {:?}",
                analysis.dominant_facial_emotion
            ));
            lines.push(format!("Nervousness: {:.2}", analysis.nervousness_score));
            lines.push(format!("Authenticity: {:.2}", analysis.authenticity_score));
        }
        Some(lines.join("\n"))
    }
}

pub trait ReportWriter: Send + Sync {
    fn write<'a>(&'a self, request: &'a ReportRequest) -> BoxFuture<'a, Result<CoachingReport, ReportError>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyze;
    use crate::emotion::{EmotionSegment, SegmentSource, Sentiment};

    const SAMPLE: &str = r#"{
        "overall_score": 7,
        "performance_level": "good",
        "criteria_scores": {
            "value_proposition": 8,
            "objection_handling": 6,
            "active_listening": 7,
            "question_quality": 6,
            "call_to_action": 8,
            "engagement": 7,
            "rule_compliance": 6
        },
        "strengths": ["Clear ROI example"],
        "improvements": [{
            "area": "Filler Words",
            "current_state": "Frequent 'um'",
            "recommendation": "Pause instead"
        }],
        "rule_violations": [{
            "rule_category": "company_wording",
            "rule_name": "preferred_terms",
            "severity": "high",
            "description": "Said 'cheap'",
            "example": "This is a cheap solution",
            "suggestion": "Say 'cost-effective'"
        }],
        "summary": "Solid pitch.",
        "next_steps": ["Record and review"]
    }"#;

    #[test]
    fn parses_a_well_formed_report() {
        let report = CoachingReport::from_json(SAMPLE).unwrap();
        assert_eq!(report.performance_level, PerformanceLevel::Good);
        assert_eq!(report.improvements[0].example, None);
        assert_eq!(report.high_severity_violations().count(), 1);
        assert_eq!(report.criteria_scores.weakest(), ("objection_handling", 6.0));
        assert!((report.criteria_scores.mean() - 48.0 / 7.0).abs() < 1e-5);
    }

    #[test]
    fn rejects_out_of_range_scores() {
        let json = SAMPLE.replace("\"engagement\": 7", "\"engagement\": 11");
        let err = CoachingReport::from_json(&json).unwrap_err();
        assert!(matches!(
            err,
            ReportError::ScoreOutOfRange {
                field: "engagement",
                ..
            }
        ));

        let json = SAMPLE.replace("\"overall_score\": 7", "\"overall_score\": 0");
        assert!(matches!(
            CoachingReport::from_json(&json),
            Err(ReportError::ScoreOutOfRange {
                field: "overall_score",
                ..
            })
        ));
    }

    #[test]
    fn inconsistent_level_follows_the_score() {
        let json = SAMPLE.replace("\"good\"", "\"excellent\"");
        let report = CoachingReport::from_json(&json).unwrap();
        assert_eq!(report.performance_level, PerformanceLevel::Good);
    }

    #[test]
    fn malformed_json_is_reported() {
        assert!(matches!(
            CoachingReport::from_json("{not json"),
            Err(ReportError::Json(_))
        ));
    }

    #[test]
    fn level_boundaries() {
        assert_eq!(PerformanceLevel::from_score(10.0), PerformanceLevel::Excellent);
        assert_eq!(PerformanceLevel::from_score(9.0), PerformanceLevel::Excellent);
        assert_eq!(PerformanceLevel::from_score(8.9), PerformanceLevel::Good);
        assert_eq!(PerformanceLevel::from_score(7.0), PerformanceLevel::Good);
        assert_eq!(PerformanceLevel::from_score(5.0), PerformanceLevel::Fair);
        assert_eq!(PerformanceLevel::from_score(4.9), PerformanceLevel::NeedsImprovement);
        assert_eq!(PerformanceLevel::from_score(1.0), PerformanceLevel::NeedsImprovement);
    }

    #[test]
    fn emotion_notes_omit_facial_lines_without_facial_data() {
        let segment = EmotionSegment::builder(0.0, SegmentSource::Text)
            .sentiment(Sentiment::Positive)
            .intensity(0.8)
            .build()
            .unwrap();
        let request = ReportRequest {
            transcript: "hello".into(),
            duration: Duration::from_secs(60),
            emotion: Some(analyze(vec![segment], &[])),
        };
        let notes = request.emotion_notes().unwrap();
        assert!(notes.starts_with("Average text sentiment: 0.80"));
        assert!(!notes.contains("Nervousness"));

        let bare = ReportRequest {
            emotion: None,
            ..request
        };
        assert_eq!(bare.emotion_notes(), None);
    }
}
