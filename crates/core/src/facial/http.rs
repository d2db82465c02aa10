use crate::config::ApiKey;
use crate::correlation::{RawFacialInstance, RawInterval};
use crate::emotion::FacialEmotion;
use crate::facial::{FacialAnalysisProvider, FacialError, FacialJobId, JobState};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

const LOG_TARGET: &str = "facial::http";

/// Client for a video-insights REST API that reports per-video processing
/// state and facial emotion instances.
#[derive(Clone)]
pub struct HttpFacialProvider {
    client: Client,
    endpoint: Url,
    account: String,
    access_token: ApiKey,
}

impl HttpFacialProvider {
    pub fn new(endpoint: Url, account: impl Into<String>, access_token: ApiKey) -> Result<Self, FacialError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            endpoint,
            account: account.into(),
            access_token,
        })
    }

    fn index_url(&self, job: &FacialJobId) -> Result<Url, FacialError> {
        let path = format!("Accounts/{}/Videos/{}/Index", self.account, job.as_str());
        self.endpoint
            .join(&path)
            .map_err(|e| FacialError::InvalidResponse(format!("bad endpoint: {e}")))
    }

    async fn fetch_index(&self, job: &FacialJobId) -> Result<VideoIndex, FacialError> {
        let response = self
            .client
            .get(self.index_url(job)?)
            .bearer_auth(self.access_token.expose())
            .send()
            .await
            .map_err(|e| FacialError::Network(e.without_url()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::error!(target: LOG_TARGET, %job, %status, "video index request failed");
            return Err(FacialError::Api(format!("HTTP {status}: {body}")));
        }

        response
            .json()
            .await
            .map_err(|e| {
                FacialError::InvalidResponse(format!("failed to parse JSON: {}", e.without_url()))
            })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoIndex {
    state: String,
    #[serde(default)]
    failure_message: Option<String>,
    #[serde(default)]
    videos: Vec<IndexedVideo>,
}

#[derive(Deserialize)]
struct IndexedVideo {
    insights: VideoInsights,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoInsights {
    #[serde(default)]
    facial_emotions: Vec<EmotionItem>,
}

#[derive(Deserialize)]
struct EmotionItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    instances: Vec<EmotionSpan>,
}

#[derive(Deserialize)]
struct EmotionSpan {
    start: String,
    end: String,
    #[serde(default)]
    confidence: Option<f32>,
}

impl VideoIndex {
    fn job_state(&self) -> JobState {
        match self.state.to_ascii_lowercase().as_str() {
            "processed" => JobState::Processed,
            "failed" | "quarantined" => JobState::Failed {
                reason: self.failure_message.clone(),
            },
            "processing" => JobState::Processing,
            _ => JobState::Queued,
        }
    }

    fn into_instances(self) -> Vec<RawFacialInstance> {
        self.videos
            .into_iter()
            .flat_map(|v| v.insights.facial_emotions)
            .filter_map(|item| {
                let Some(emotion) = FacialEmotion::from_label(&item.kind) else {
                    tracing::debug!(target: LOG_TARGET, kind = %item.kind, "skipping unknown facial emotion");
                    return None;
                };
                let fallback = item.confidence.unwrap_or(1.0);
                let intervals = item
                    .instances
                    .into_iter()
                    .map(|s| RawInterval::new(s.start, s.end, s.confidence.unwrap_or(fallback)))
                    .collect();
                Some(RawFacialInstance { emotion, intervals })
            })
            .collect()
    }
}

impl FacialAnalysisProvider for HttpFacialProvider {
    fn job_state<'a>(&'a self, job: &'a FacialJobId) -> BoxFuture<'a, Result<JobState, FacialError>> {
        async move { Ok(self.fetch_index(job).await?.job_state()) }.boxed()
    }

    fn insights<'a>(
        &'a self,
        job: &'a FacialJobId,
    ) -> BoxFuture<'a, Result<Vec<RawFacialInstance>, FacialError>> {
        async move {
            let index = self.fetch_index(job).await?;
            match index.job_state() {
                JobState::Processed => Ok(index.into_instances()),
                other => Err(FacialError::InvalidResponse(format!(
                    "insights requested while job is {other:?}"
                ))),
            }
        }
        .boxed()
    }
}
