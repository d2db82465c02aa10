use crate::util::PollConfig;
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

pub const DEFAULT_SILENCE_TIMEOUT: Duration = Duration::from_secs(6);
pub const DEFAULT_MIN_WORDS: usize = 10;
pub const DEFAULT_PLAYBACK_DRAIN: Duration = Duration::from_secs(3);
pub const DEFAULT_RECOGNIZER_RESUME: Duration = Duration::from_secs(1);
pub const DEFAULT_ECHO_THRESHOLD: f32 = 0.70;
pub const DEFAULT_RECENT_AVATAR_LINES: usize = 3;
pub const DEFAULT_GREETING: &str = "Hi! I'm interested in learning about your product. Go ahead.";

pub const ENV_SILENCE_TIMEOUT_SECS: &str = "COACH_SILENCE_TIMEOUT_SECS";
pub const ENV_MIN_WORDS: &str = "COACH_MIN_WORDS";
pub const ENV_ECHO_THRESHOLD: &str = "COACH_ECHO_THRESHOLD";
pub const ENV_FACIAL_MAX_WAIT_SECS: &str = "COACH_FACIAL_MAX_WAIT_SECS";
pub const ENV_FACIAL_POLL_SECS: &str = "COACH_FACIAL_POLL_SECS";
pub const ENV_SENTIMENT_API_KEY: &str = "COACH_SENTIMENT_API_KEY";
pub const ENV_VIDEO_INSIGHTS_API_KEY: &str = "COACH_VIDEO_INSIGHTS_API_KEY";

/// Policy constants for the live turn-taking engine.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TurnTakingConfig {
    /// Quiet period after the last accepted fragment before the floor is yielded.
    pub silence_timeout: Duration,
    /// Minimum unconsumed words before a pause counts as yielding the floor.
    pub min_words: usize,
    /// First cooldown stage: let avatar audio finish playing through the speakers.
    pub playback_drain: Duration,
    /// Second cooldown stage before the recognizer may resume.
    pub recognizer_resume: Duration,
    /// Similarity above which a fragment is treated as the avatar's own voice.
    pub echo_threshold: f32,
    /// How many recent avatar lines are kept for echo comparison.
    pub recent_avatar_lines: usize,
    pub greeting: String,
}

impl Default for TurnTakingConfig {
    fn default() -> Self {
        Self {
            silence_timeout: DEFAULT_SILENCE_TIMEOUT,
            min_words: DEFAULT_MIN_WORDS,
            playback_drain: DEFAULT_PLAYBACK_DRAIN,
            recognizer_resume: DEFAULT_RECOGNIZER_RESUME,
            echo_threshold: DEFAULT_ECHO_THRESHOLD,
            recent_avatar_lines: DEFAULT_RECENT_AVATAR_LINES,
            greeting: DEFAULT_GREETING.to_owned(),
        }
    }
}

impl TurnTakingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.silence_timeout.is_zero() {
            return Err(ConfigError::ZeroSilenceTimeout);
        }
        if !(0.0..=1.0).contains(&self.echo_threshold) {
            return Err(ConfigError::EchoThresholdOutOfRange(self.echo_threshold));
        }
        if self.recent_avatar_lines == 0 {
            return Err(ConfigError::ZeroAvatarHistory);
        }
        Ok(())
    }
}

/// Bounds on waiting for the post-session facial-analysis job.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FacialWaitConfig {
    pub poll_interval: Duration,
    pub max_wait: Duration,
}

impl Default for FacialWaitConfig {
    fn default() -> Self {
        let poll = PollConfig::default();
        Self {
            poll_interval: poll.interval,
            max_wait: poll.max_wait,
        }
    }
}

impl FacialWaitConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }
        Ok(())
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig::new(self.poll_interval, self.max_wait)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    pub turn_taking: TurnTakingConfig,
    pub facial_wait: FacialWaitConfig,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.turn_taking.validate()?;
        self.facial_wait.validate()
    }

    /// Applies environment overrides on top of the defaults.
    pub fn from_env(env: &impl Env) -> Result<Self, ConfigError> {
        Self::resolve(ConfigOverrides::default(), env)
    }

    /// Resolves each value as command-line override, then environment, then default.
    pub fn resolve(overrides: ConfigOverrides, env: &impl Env) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        if let Some(secs) =
            resolve_parsed(overrides.silence_timeout_secs, ENV_SILENCE_TIMEOUT_SECS, env)?
        {
            cfg.turn_taking.silence_timeout = Duration::from_secs(secs);
        }
        if let Some(words) = resolve_parsed(overrides.min_words, ENV_MIN_WORDS, env)? {
            cfg.turn_taking.min_words = words;
        }
        if let Some(threshold) = resolve_parsed(overrides.echo_threshold, ENV_ECHO_THRESHOLD, env)? {
            cfg.turn_taking.echo_threshold = threshold;
        }
        if let Some(secs) =
            resolve_parsed(overrides.facial_max_wait_secs, ENV_FACIAL_MAX_WAIT_SECS, env)?
        {
            cfg.facial_wait.max_wait = Duration::from_secs(secs);
        }
        if let Some(secs) = resolve_parsed(overrides.facial_poll_secs, ENV_FACIAL_POLL_SECS, env)? {
            cfg.facial_wait.poll_interval = Duration::from_secs(secs);
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

/// Values supplied on the command line; `None` falls through to the environment.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub silence_timeout_secs: Option<u64>,
    pub min_words: Option<usize>,
    pub echo_threshold: Option<f32>,
    pub facial_max_wait_secs: Option<u64>,
    pub facial_poll_secs: Option<u64>,
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new<S: Into<String>>(value: S) -> Result<Self, ConfigError> {
        let v = value.into();
        if v.trim().is_empty() {
            return Err(ConfigError::EmptyApiKey);
        }
        Ok(Self(v))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(**redacted**)")
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("silence timeout must be > 0")]
    ZeroSilenceTimeout,
    #[error("facial poll interval must be > 0")]
    ZeroPollInterval,
    #[error("echo threshold must be within [0, 1], got {0}")]
    EchoThresholdOutOfRange(f32),
    #[error("recent avatar line history must hold at least one line")]
    ZeroAvatarHistory,
    #[error("api key must not be empty")]
    EmptyApiKey,
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },
}

pub trait Env {
    fn var(&self, key: &str) -> Option<String>;
}

#[derive(Clone, Debug, Default)]
pub struct StdEnv;

impl Env for StdEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Clone, Debug, Default)]
pub struct MapEnv {
    vars: std::collections::BTreeMap<String, String>,
}

impl MapEnv {
    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_owned(), value.to_owned());
        self
    }
}

impl Env for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

pub fn resolve_api_key(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
) -> Result<Option<ApiKey>, ConfigError> {
    match cli_value.or_else(|| env.var(env_key)) {
        Some(v) => Ok(Some(ApiKey::new(v)?)),
        None => Ok(None),
    }
}

/// CLI value wins over the environment; `None` when neither is set.
pub fn resolve_parsed<T: std::str::FromStr>(
    cli_value: Option<T>,
    env_key: &str,
    env: &impl Env,
) -> Result<Option<T>, ConfigError> {
    if cli_value.is_some() {
        return Ok(cli_value);
    }
    match env.var(env_key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: env_key.to_owned(),
                value: raw,
            }),
        None => Ok(None),
    }
}
