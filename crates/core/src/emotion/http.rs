use crate::config::ApiKey;
use crate::emotion::{SentimentError, SentimentProvider, SentimentScores};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_SENTIMENT_API_VERSION: &str = "2023-04-01";

/// Client for a cloud text-analytics sentiment endpoint.
#[derive(Clone)]
pub struct HttpSentimentProvider {
    client: Client,
    endpoint: Url,
    api_key: ApiKey,
    language: String,
}

impl HttpSentimentProvider {
    pub fn new(endpoint: Url, api_key: ApiKey) -> Self {
        Self {
            client: Client::new(),
            endpoint,
            api_key,
            language: "en".to_owned(),
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    fn analyze_url(&self) -> Result<Url, SentimentError> {
        let mut url = self
            .endpoint
            .join("language/:analyze-text")
            .map_err(|e| SentimentError::InvalidResponse(format!("bad endpoint: {e}")))?;
        url.query_pairs_mut()
            .append_pair("api-version", DEFAULT_SENTIMENT_API_VERSION);
        Ok(url)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeRequest<'a> {
    kind: &'static str,
    analysis_input: AnalysisInput<'a>,
}

#[derive(Serialize)]
struct AnalysisInput<'a> {
    documents: Vec<InputDocument<'a>>,
}

#[derive(Serialize)]
struct InputDocument<'a> {
    id: &'static str,
    language: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct AnalyzeResponse {
    results: AnalyzeResults,
}

#[derive(Deserialize)]
struct AnalyzeResults {
    documents: Vec<ScoredDocument>,
    #[serde(default)]
    errors: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScoredDocument {
    confidence_scores: SentimentScores,
}

impl SentimentProvider for HttpSentimentProvider {
    fn score(&self, text: String) -> BoxFuture<'_, Result<SentimentScores, SentimentError>> {
        async move {
            if text.trim().is_empty() {
                return Err(SentimentError::EmptyText);
            }

            let request = AnalyzeRequest {
                kind: "SentimentAnalysis",
                analysis_input: AnalysisInput {
                    documents: vec![InputDocument {
                        id: "1",
                        language: &self.language,
                        text: &text,
                    }],
                },
            };

            let response = self
                .client
                .post(self.analyze_url()?)
                .header("Ocp-Apim-Subscription-Key", self.api_key.expose())
                .json(&request)
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                return Err(SentimentError::Api(format!("HTTP {status}: {body}")));
            }

            let parsed: AnalyzeResponse = response
                .json()
                .await
                .map_err(|e| SentimentError::InvalidResponse(format!("failed to parse JSON: {e}")))?;

            if let Some(err) = parsed.results.errors.first() {
                return Err(SentimentError::Api(err.to_string()));
            }

            let doc = parsed
                .results
                .documents
                .into_iter()
                .next()
                .ok_or_else(|| SentimentError::InvalidResponse("no documents in response".into()))?;

            let s = doc.confidence_scores;
            SentimentScores::new(s.positive, s.neutral, s.negative)
        }
        .boxed()
    }
}
