use crate::correlation::RawFacialInstance;
use crate::facial::{FacialAnalysisProvider, FacialError, FacialJobId, JobState};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Replays a fixed sequence of job states, repeating the last one, and then
/// serves prerecorded insights. Backs session replays and tests.
#[derive(Debug)]
pub struct RecordedFacialProvider {
    states: Vec<JobState>,
    insights: Vec<RawFacialInstance>,
    calls: AtomicUsize,
}

impl RecordedFacialProvider {
    pub fn new(states: Vec<JobState>, insights: Vec<RawFacialInstance>) -> Self {
        Self {
            states,
            insights,
            calls: AtomicUsize::new(0),
        }
    }

    /// A job that is already finished.
    pub fn processed(insights: Vec<RawFacialInstance>) -> Self {
        Self::new(vec![JobState::Processed], insights)
    }

    pub fn state_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FacialAnalysisProvider for RecordedFacialProvider {
    fn job_state<'a>(&'a self, _job: &'a FacialJobId) -> BoxFuture<'a, Result<JobState, FacialError>> {
        async move {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            self.states
                .get(n)
                .or_else(|| self.states.last())
                .cloned()
                .ok_or_else(|| FacialError::InvalidResponse("no recorded job states".into()))
        }
        .boxed()
    }

    fn insights<'a>(
        &'a self,
        _job: &'a FacialJobId,
    ) -> BoxFuture<'a, Result<Vec<RawFacialInstance>, FacialError>> {
        async move { Ok(self.insights.clone()) }.boxed()
    }
}
