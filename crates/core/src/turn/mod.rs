//! Decides when the speaker has yielded the floor.
//!
//! `TurnTaker` is a synchronous state machine: every input is a `TurnEvent`
//! and every output is a list of `Effect`s. Timers are requested through
//! `Effect::ArmTimer` and come back as `TurnEvent::TimerFired`; whoever owns
//! the clock (`ScriptedDriver` for replays and tests, `driver::spawn` for a
//! live tokio runtime) performs the scheduling.

pub mod driver;
mod scripted;

use crate::config::TurnTakingConfig;
use crate::echo;
use crate::util::BoundedHistory;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use scripted::{ScriptedDriver, TimedEffect};

const LOG_TARGET: &str = "turn";

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum CooldownStage {
    /// Avatar audio may still be coming out of the speakers.
    PlaybackDrain,
    /// Waiting before the recognizer is told it may resume.
    RecognizerResume,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Listening,
    AvatarSpeaking,
    CoolingDown(CooldownStage),
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TimerKind {
    Silence,
    PlaybackDrain,
    RecognizerResume,
}

impl TimerKind {
    fn index(self) -> usize {
        match self {
            TimerKind::Silence => 0,
            TimerKind::PlaybackDrain => 1,
            TimerKind::RecognizerResume => 2,
        }
    }
}

/// Identifies one arming of a timer. Only the most recent arming of a kind is live.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TimerToken {
    pub kind: TimerKind,
    pub generation: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum TurnEvent {
    StartSession,
    Transcript { text: String, is_final: bool },
    AvatarSpeechStarted { text: String },
    AvatarSpeechEnded,
    TimerFired(TimerToken),
    EndPresentation { elapsed: Duration },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum Effect {
    /// Schedule `token` to fire after `after`, replacing any pending timer of the same kind.
    ArmTimer { token: TimerToken, after: Duration },
    CancelTimer(TimerKind),
    MuteMicrophone,
    ResumeRecognizer,
    AvatarShouldSpeak { text: String },
    PauseDetected { text: String },
    SessionEnded { transcript: String, duration: Duration },
}

impl Effect {
    /// Timer bookkeeping is consumed by the driver; everything else goes outward.
    pub fn is_scheduling(&self) -> bool {
        matches!(self, Effect::ArmTimer { .. } | Effect::CancelTimer(_))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub state: TurnState,
    pub effects: Vec<Effect>,
}

#[derive(Clone, Debug)]
pub struct TurnTaker {
    config: TurnTakingConfig,
    state: TurnState,
    transcript: String,
    /// Byte offset into `transcript` already forwarded in a pause event.
    consumed: usize,
    responded: bool,
    recent_avatar: BoundedHistory<String>,
    generations: [u64; 3],
}

impl TurnTaker {
    pub fn new(config: TurnTakingConfig) -> Self {
        let recent_avatar = BoundedHistory::new(config.recent_avatar_lines);
        Self {
            config,
            state: TurnState::Idle,
            transcript: String::new(),
            consumed: 0,
            responded: false,
            recent_avatar,
            generations: [0; 3],
        }
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn config(&self) -> &TurnTakingConfig {
        &self.config
    }

    /// Everything accepted so far, across all turns.
    pub fn transcript(&self) -> &str {
        self.transcript.trim()
    }

    /// Accepted speech not yet forwarded in a pause event.
    pub fn unconsumed(&self) -> &str {
        self.transcript[self.consumed..].trim()
    }

    pub fn recent_avatar_lines(&self) -> impl Iterator<Item = &str> {
        self.recent_avatar.iter().map(String::as_str)
    }

    pub fn handle(&mut self, event: TurnEvent) -> Transition {
        let effects = match event {
            TurnEvent::StartSession => self.on_start(),
            TurnEvent::Transcript { text, is_final } => self.on_transcript(text, is_final),
            TurnEvent::AvatarSpeechStarted { text } => self.on_avatar_started(text),
            TurnEvent::AvatarSpeechEnded => self.on_avatar_ended(),
            TurnEvent::TimerFired(token) => self.on_timer(token),
            TurnEvent::EndPresentation { elapsed } => self.on_end(elapsed),
        };
        Transition {
            state: self.state,
            effects,
        }
    }

    fn on_start(&mut self) -> Vec<Effect> {
        if self.state != TurnState::Idle {
            return self.ignored("start_session");
        }
        self.transcript.clear();
        self.consumed = 0;
        self.responded = false;
        self.recent_avatar.clear();
        self.state = TurnState::Listening;
        tracing::info!(target: LOG_TARGET, "session started, listening");
        vec![Effect::AvatarShouldSpeak {
            text: self.config.greeting.clone(),
        }]
    }

    fn on_transcript(&mut self, text: String, is_final: bool) -> Vec<Effect> {
        if !is_final {
            tracing::trace!(target: LOG_TARGET, interim = %text, "interim fragment");
            return Vec::new();
        }
        if self.state != TurnState::Listening {
            tracing::debug!(
                target: LOG_TARGET,
                state = ?self.state,
                fragment = %text,
                "discarding fragment while microphone is gated"
            );
            return Vec::new();
        }
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }
        if echo::is_echo(
            text,
            self.recent_avatar.iter().map(String::as_str),
            self.config.echo_threshold,
        ) {
            tracing::info!(target: LOG_TARGET, fragment = %text, "discarding echo of avatar speech");
            return Vec::new();
        }

        if !self.transcript.is_empty() {
            self.transcript.push(' ');
        }
        self.transcript.push_str(text);
        self.responded = false;
        tracing::debug!(
            target: LOG_TARGET,
            fragment = %text,
            unconsumed_words = word_count(self.unconsumed()),
            "fragment accepted"
        );
        vec![self.arm(TimerKind::Silence, self.config.silence_timeout)]
    }

    fn on_avatar_started(&mut self, text: String) -> Vec<Effect> {
        let effects = match self.state {
            TurnState::Idle => return self.ignored("avatar_speech_started"),
            TurnState::Listening => vec![self.cancel(TimerKind::Silence), Effect::MuteMicrophone],
            TurnState::AvatarSpeaking => Vec::new(),
            TurnState::CoolingDown(CooldownStage::PlaybackDrain) => {
                vec![self.cancel(TimerKind::PlaybackDrain)]
            }
            TurnState::CoolingDown(CooldownStage::RecognizerResume) => {
                vec![self.cancel(TimerKind::RecognizerResume)]
            }
        };
        tracing::info!(target: LOG_TARGET, line = %text, "avatar speaking, microphone gated");
        self.recent_avatar.push(text);
        self.state = TurnState::AvatarSpeaking;
        effects
    }

    fn on_avatar_ended(&mut self) -> Vec<Effect> {
        if self.state != TurnState::AvatarSpeaking {
            return self.ignored("avatar_speech_ended");
        }
        self.state = TurnState::CoolingDown(CooldownStage::PlaybackDrain);
        vec![self.arm(TimerKind::PlaybackDrain, self.config.playback_drain)]
    }

    fn on_timer(&mut self, token: TimerToken) -> Vec<Effect> {
        if self.generations[token.kind.index()] != token.generation {
            tracing::trace!(target: LOG_TARGET, ?token, "stale timer");
            return Vec::new();
        }
        match (token.kind, self.state) {
            (TimerKind::Silence, TurnState::Listening) => self.on_silence(),
            (TimerKind::PlaybackDrain, TurnState::CoolingDown(CooldownStage::PlaybackDrain)) => {
                self.state = TurnState::CoolingDown(CooldownStage::RecognizerResume);
                vec![self.arm(TimerKind::RecognizerResume, self.config.recognizer_resume)]
            }
            (
                TimerKind::RecognizerResume,
                TurnState::CoolingDown(CooldownStage::RecognizerResume),
            ) => {
                self.state = TurnState::Listening;
                tracing::info!(target: LOG_TARGET, "cooldown finished, listening");
                let mut effects = vec![Effect::ResumeRecognizer];
                // speech cut off by the avatar still needs a silence window of its own
                if !self.responded && !self.unconsumed().is_empty() {
                    effects.push(self.arm(TimerKind::Silence, self.config.silence_timeout));
                }
                effects
            }
            _ => self.ignored("timer_fired"),
        }
    }

    fn on_silence(&mut self) -> Vec<Effect> {
        if self.responded {
            return Vec::new();
        }
        let pending = self.unconsumed();
        let words = word_count(pending);
        if words < self.config.min_words {
            tracing::debug!(
                target: LOG_TARGET,
                words,
                min_words = self.config.min_words,
                "pause too short to yield the floor"
            );
            return Vec::new();
        }

        let text = pending.to_owned();
        self.consumed = self.transcript.len();
        self.responded = true;
        tracing::info!(target: LOG_TARGET, words, "pause detected");
        vec![Effect::PauseDetected { text }]
    }

    fn on_end(&mut self, elapsed: Duration) -> Vec<Effect> {
        if self.state != TurnState::Listening {
            return self.ignored("end_presentation");
        }
        self.state = TurnState::Idle;
        tracing::info!(
            target: LOG_TARGET,
            duration_secs = elapsed.as_secs_f64(),
            words = word_count(&self.transcript),
            "presentation ended"
        );
        vec![
            self.cancel(TimerKind::Silence),
            Effect::SessionEnded {
                transcript: self.transcript().to_owned(),
                duration: elapsed,
            },
        ]
    }

    fn arm(&mut self, kind: TimerKind, after: Duration) -> Effect {
        let generation = self.bump(kind);
        Effect::ArmTimer {
            token: TimerToken { kind, generation },
            after,
        }
    }

    fn cancel(&mut self, kind: TimerKind) -> Effect {
        self.bump(kind);
        Effect::CancelTimer(kind)
    }

    fn bump(&mut self, kind: TimerKind) -> u64 {
        let slot = &mut self.generations[kind.index()];
        *slot += 1;
        *slot
    }

    fn ignored(&self, event: &'static str) -> Vec<Effect> {
        tracing::debug!(target: LOG_TARGET, event, state = ?self.state, "event has no effect in this state");
        Vec::new()
    }
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
