mod http;
mod recorded;

use crate::config::FacialWaitConfig;
use crate::correlation::RawFacialInstance;
use crate::util::{poll_until, PollError, PollStatus};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

pub use http::HttpFacialProvider;
pub use recorded::RecordedFacialProvider;

const LOG_TARGET: &str = "facial";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct FacialJobId(pub String);

impl FacialJobId {
    pub fn new<S: Into<String>>(value: S) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FacialJobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of an external facial-analysis job.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Processing,
    Processed,
    Failed { reason: Option<String> },
}

#[derive(thiserror::Error, Debug)]
pub enum FacialError {
    #[error("facial analysis job {job} failed: {}", .reason.as_deref().unwrap_or("no reason given"))]
    JobFailed { job: FacialJobId, reason: Option<String> },
    #[error("facial analysis job {job} still unfinished after {waited:?}")]
    Timeout { job: FacialJobId, waited: Duration },
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("facial api error: {0}")]
    Api(String),
    #[error("invalid facial response: {0}")]
    InvalidResponse(String),
}

pub trait FacialAnalysisProvider: Send + Sync {
    fn job_state<'a>(&'a self, job: &'a FacialJobId) -> BoxFuture<'a, Result<JobState, FacialError>>;

    /// Only meaningful once the job reports `Processed`.
    fn insights<'a>(
        &'a self,
        job: &'a FacialJobId,
    ) -> BoxFuture<'a, Result<Vec<RawFacialInstance>, FacialError>>;
}

/// Polls the job at a fixed interval, then fetches its insights.
///
/// A reported failure is returned as `JobFailed` straight away; running past
/// `max_wait` yields `Timeout`. Neither is retried.
pub async fn wait_for_insights<P>(
    provider: &P,
    job: &FacialJobId,
    config: &FacialWaitConfig,
) -> Result<Vec<RawFacialInstance>, FacialError>
where
    P: FacialAnalysisProvider + ?Sized,
{
    tracing::info!(target: LOG_TARGET, %job, max_wait = ?config.max_wait, "waiting for facial analysis");

    let waited = poll_until(&config.poll_config(), move || async move {
        match provider.job_state(job).await? {
            JobState::Processed => Ok(PollStatus::Ready(())),
            JobState::Failed { reason } => Err(FacialError::JobFailed {
                job: job.clone(),
                reason,
            }),
            JobState::Queued | JobState::Processing => Ok(PollStatus::Pending),
        }
    })
    .await;

    match waited {
        Ok(()) => {}
        Err(PollError::Probe(e)) => return Err(e),
        Err(PollError::TimedOut { waited }) => {
            return Err(FacialError::Timeout {
                job: job.clone(),
                waited,
            })
        }
    }

    let instances = provider.insights(job).await?;
    tracing::info!(
        target: LOG_TARGET,
        %job,
        emotion_types = instances.len(),
        intervals = instances.iter().map(|i| i.intervals.len()).sum::<usize>(),
        "facial insights fetched"
    );
    Ok(instances)
}
