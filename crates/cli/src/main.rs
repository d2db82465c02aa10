#![deny(warnings)]

use anyhow::Context;
use clap::Parser;
use coaching_session_core::analysis::EmotionAnalysis;
use coaching_session_core::config::{
    resolve_api_key, ConfigOverrides, EngineConfig, Env, StdEnv, ENV_SENTIMENT_API_KEY,
    ENV_VIDEO_INSIGHTS_API_KEY,
};
use coaching_session_core::correlation::RawFacialInstance;
use coaching_session_core::emotion::{
    HttpSentimentProvider, LexiconSentimentProvider, SentimentProvider,
};
use coaching_session_core::facial::{
    FacialAnalysisProvider, FacialJobId, HttpFacialProvider, JobState, RecordedFacialProvider,
};
use coaching_session_core::pipeline::{finalize_session, FacialJob, FacialOutcome};
use coaching_session_core::session::{CoachingSession, ConversationTurn};
use coaching_session_core::turn::{TimedEffect, TurnEvent};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "coach-replay")]
#[command(about = "Replay a recorded coaching session and print its emotion analysis")]
struct Args {
    /// Scenario file (JSON) with timed session events and optional facial data.
    #[arg(long)]
    scenario: PathBuf,

    #[arg(long)]
    silence_timeout_secs: Option<u64>,

    #[arg(long)]
    min_words: Option<usize>,

    #[arg(long)]
    echo_threshold: Option<f32>,

    #[arg(long)]
    facial_max_wait_secs: Option<u64>,

    #[arg(long)]
    facial_poll_secs: Option<u64>,

    /// Text-analytics endpoint; the offline lexicon scorer is used when absent.
    #[arg(long)]
    sentiment_endpoint: Option<Url>,

    #[arg(long)]
    sentiment_api_key: Option<String>,

    /// Video-insights endpoint; recorded facial data from the scenario is used when absent.
    #[arg(long)]
    video_insights_endpoint: Option<Url>,

    #[arg(long)]
    video_insights_account: Option<String>,

    #[arg(long)]
    video_insights_token: Option<String>,

    #[arg(long)]
    facial_job: Option<String>,

    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Deserialize, Debug)]
struct Scenario {
    events: Vec<ScriptedEvent>,
    #[serde(default)]
    facial: Option<RecordedFacial>,
}

#[derive(Deserialize, Debug)]
struct ScriptedEvent {
    /// Seconds since the session started.
    at: f64,
    #[serde(flatten)]
    kind: EventKind,
}

#[derive(Deserialize, Debug)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum EventKind {
    Start,
    Speech {
        text: String,
        #[serde(default = "default_final")]
        is_final: bool,
        #[serde(default)]
        duration: f64,
    },
    AvatarStarted {
        text: String,
    },
    AvatarEnded,
    End,
}

fn default_final() -> bool {
    true
}

#[derive(Deserialize, Debug)]
struct RecordedFacial {
    job_id: String,
    #[serde(default = "already_processed")]
    states: Vec<JobState>,
    instances: Vec<RawFacialInstance>,
}

fn already_processed() -> Vec<JobState> {
    vec![JobState::Processed]
}

#[derive(Serialize)]
struct ReplayOutput {
    session_id: String,
    effects: Vec<TimedEffect>,
    conversation: Vec<ConversationTurn>,
    facial: FacialOutcome,
    analysis: EmotionAnalysis,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level)?;

    let env = StdEnv;
    let cfg = build_config(&args, &env)?;
    tracing::info!(
        silence_timeout = ?cfg.turn_taking.silence_timeout,
        min_words = cfg.turn_taking.min_words,
        facial_max_wait = ?cfg.facial_wait.max_wait,
        "config loaded"
    );

    let raw = std::fs::read_to_string(&args.scenario)
        .with_context(|| format!("failed to read scenario {}", args.scenario.display()))?;
    let scenario: Scenario = serde_json::from_str(&raw)
        .with_context(|| format!("invalid scenario {}", args.scenario.display()))?;

    let sentiment = build_sentiment(&args, &env)?;
    let output = replay(scenario, &args, &env, cfg, sentiment.as_ref()).await?;

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn replay(
    scenario: Scenario,
    args: &Args,
    env: &impl Env,
    cfg: EngineConfig,
    sentiment: &dyn SentimentProvider,
) -> anyhow::Result<ReplayOutput> {
    let mut session = CoachingSession::new(cfg.turn_taking.clone());
    let session_id = session.id();
    let mut effects = Vec::new();

    for scripted in scenario.events {
        let at = event_time(scripted.at)?;
        let mut duration = 0.0;
        let event = match scripted.kind {
            EventKind::Start => TurnEvent::StartSession,
            EventKind::Speech {
                text,
                is_final,
                duration: d,
            } => {
                duration = d;
                TurnEvent::Transcript { text, is_final }
            }
            EventKind::AvatarStarted { text } => TurnEvent::AvatarSpeechStarted { text },
            EventKind::AvatarEnded => TurnEvent::AvatarSpeechEnded,
            EventKind::End => TurnEvent::EndPresentation { elapsed: at },
        };

        let step = session.send(at, event);
        effects.extend(step.effects);
        if let Some(text) = step.accepted {
            session
                .record_text_segment(sentiment, scripted.at, duration, &text)
                .await
                .with_context(|| format!("failed to score speech at {}s", scripted.at))?;
        }
    }

    let (store, history) = session.into_parts();

    let http_facial = match &args.video_insights_endpoint {
        Some(endpoint) => {
            let token = resolve_api_key(
                args.video_insights_token.clone(),
                ENV_VIDEO_INSIGHTS_API_KEY,
                env,
            )?
            .context("video insights token is required with --video-insights-endpoint")?;
            let account = args
                .video_insights_account
                .clone()
                .context("--video-insights-account is required with --video-insights-endpoint")?;
            let job = args
                .facial_job
                .clone()
                .context("--facial-job is required with --video-insights-endpoint")?;
            Some((
                HttpFacialProvider::new(endpoint.clone(), account, token)?,
                FacialJobId::new(job),
            ))
        }
        None => None,
    };
    let recorded_facial = scenario.facial.map(|f| {
        (
            RecordedFacialProvider::new(f.states, f.instances),
            FacialJobId::new(f.job_id),
        )
    });

    let facial = match (&http_facial, &recorded_facial) {
        (Some((provider, id)), _) => Some(facial_job(provider, id)),
        (None, Some((provider, id))) => Some(facial_job(provider, id)),
        (None, None) => None,
    };

    let outcome = finalize_session(store, facial, &cfg.facial_wait).await;
    tracing::info!(%session_id, facial = ?outcome.facial, "replay finished");

    Ok(ReplayOutput {
        session_id: session_id.to_string(),
        effects,
        conversation: history.turns().to_vec(),
        facial: outcome.facial,
        analysis: outcome.analysis,
    })
}

fn facial_job<'a>(provider: &'a dyn FacialAnalysisProvider, id: &'a FacialJobId) -> FacialJob<'a> {
    FacialJob { provider, id }
}

fn event_time(at: f64) -> anyhow::Result<Duration> {
    anyhow::ensure!(
        at.is_finite() && at >= 0.0,
        "event time must be finite and >= 0, got {at}"
    );
    Duration::try_from_secs_f64(at).with_context(|| format!("event time {at}s is out of range"))
}

fn build_sentiment(args: &Args, env: &impl Env) -> anyhow::Result<Box<dyn SentimentProvider>> {
    match &args.sentiment_endpoint {
        Some(endpoint) => {
            let key = resolve_api_key(args.sentiment_api_key.clone(), ENV_SENTIMENT_API_KEY, env)?
                .context("sentiment api key is required with --sentiment-endpoint")?;
            Ok(Box::new(HttpSentimentProvider::new(endpoint.clone(), key)))
        }
        None => Ok(Box::new(LexiconSentimentProvider::new())),
    }
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(
            level
                .parse()
                .with_context(|| format!("invalid --log-level: {level}"))?,
        )
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn build_config(args: &Args, env: &impl Env) -> anyhow::Result<EngineConfig> {
    let overrides = ConfigOverrides {
        silence_timeout_secs: args.silence_timeout_secs,
        min_words: args.min_words,
        echo_threshold: args.echo_threshold,
        facial_max_wait_secs: args.facial_max_wait_secs,
        facial_poll_secs: args.facial_poll_secs,
    };
    EngineConfig::resolve(overrides, env).context("invalid engine configuration")
}
