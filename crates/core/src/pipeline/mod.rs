//! End-of-session processing: wait for facial analysis, correlate, aggregate.

use crate::analysis::{analyze, EmotionAnalysis};
use crate::config::FacialWaitConfig;
use crate::correlation::{CorrelationSummary, RawFacialInstance};
use crate::emotion::EmotionSegmentStore;
use crate::facial::{wait_for_insights, FacialAnalysisProvider, FacialError, FacialJobId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const LOG_TARGET: &str = "pipeline";

/// What happened to the facial side of the analysis.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FacialOutcome {
    Correlated { summary: CorrelationSummary },
    /// No facial job was submitted for this session.
    Skipped,
    Failed { reason: String },
    TimedOut { waited: Duration },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SessionOutcome {
    pub analysis: EmotionAnalysis,
    pub facial: FacialOutcome,
}

/// A submitted facial-analysis job and the provider that runs it.
#[derive(Clone, Copy)]
pub struct FacialJob<'a> {
    pub provider: &'a dyn FacialAnalysisProvider,
    pub id: &'a FacialJobId,
}

/// Produces the session's final analysis.
///
/// Facial problems never fail the session: a failed or timed-out job yields
/// a text-only analysis and says so in `facial`.
pub async fn finalize_session(
    mut store: EmotionSegmentStore,
    facial: Option<FacialJob<'_>>,
    config: &FacialWaitConfig,
) -> SessionOutcome {
    let (instances, outcome) = match facial {
        None => (Vec::new(), FacialOutcome::Skipped),
        Some(job) => match wait_for_insights(job.provider, job.id, config).await {
            Ok(instances) => {
                let summary = store.correlate(&instances);
                tracing::info!(
                    target: LOG_TARGET,
                    job = %job.id,
                    matched = summary.matched,
                    unmatched = summary.unmatched,
                    parse_failures = summary.parse_failures,
                    "facial data correlated"
                );
                (instances, FacialOutcome::Correlated { summary })
            }
            Err(e) => {
                tracing::warn!(target: LOG_TARGET, job = %job.id, error = %e, "continuing with text-only analysis");
                (Vec::<RawFacialInstance>::new(), degraded(e))
            }
        },
    };

    let analysis = analyze(store.into_segments(), &instances);
    tracing::info!(
        target: LOG_TARGET,
        segments = analysis.segments().len(),
        frustration_incidents = analysis.frustration_incidents,
        has_facial_data = analysis.has_facial_data(),
        "session analysis complete"
    );
    SessionOutcome {
        analysis,
        facial: outcome,
    }
}

fn degraded(error: FacialError) -> FacialOutcome {
    match error {
        FacialError::Timeout { waited, .. } => FacialOutcome::TimedOut { waited },
        other => FacialOutcome::Failed {
            reason: other.to_string(),
        },
    }
}
