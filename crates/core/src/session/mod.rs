//! Per-session state: the turn-taking engine, the emotion segment store and
//! the conversation so far. Sessions share nothing with each other.

use crate::config::TurnTakingConfig;
use crate::emotion::{
    EmotionSegment, EmotionSegmentStore, SegmentError, SentimentError, SentimentProvider,
    SpeakingContext,
};
use crate::turn::{Effect, ScriptedDriver, TimedEffect, TurnEvent, TurnState, TurnTaker};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, SystemTime};
use uuid::Uuid;

const LOG_TARGET: &str = "session";

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("no active session with id {0}")]
    NotFound(Uuid),
    #[error("sentiment scoring failed: {0}")]
    Sentiment(#[from] SentimentError),
    #[error("invalid segment: {0}")]
    Segment(#[from] SegmentError),
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Speaker {
    Presenter,
    Customer,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::Presenter => f.write_str("PRESENTER"),
            Speaker::Customer => f.write_str("CUSTOMER"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ConversationTurn {
    pub speaker: Speaker,
    pub text: String,
}

/// Ordered record of who said what.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ConversationHistory {
    turns: Vec<ConversationTurn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, speaker: Speaker, text: impl Into<String>) {
        let text = text.into();
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        self.turns.push(ConversationTurn {
            speaker,
            text: text.to_owned(),
        });
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// The last `n` turns, oldest first.
    pub fn recent(&self, n: usize) -> &[ConversationTurn] {
        &self.turns[self.turns.len().saturating_sub(n)..]
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// One `SPEAKER: text` line per turn.
    pub fn render(&self) -> String {
        self.turns
            .iter()
            .map(|t| format!("{}: {}", t.speaker, t.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// What one call to [`CoachingSession::send`] produced.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionStep {
    pub effects: Vec<TimedEffect>,
    /// The final fragment the engine accepted into the transcript, if any.
    pub accepted: Option<String>,
}

pub struct CoachingSession {
    id: Uuid,
    started_at: SystemTime,
    turns: ScriptedDriver,
    store: EmotionSegmentStore,
    history: ConversationHistory,
    context: SpeakingContext,
}

impl CoachingSession {
    pub fn new(config: TurnTakingConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: SystemTime::now(),
            turns: ScriptedDriver::new(TurnTaker::new(config)),
            store: EmotionSegmentStore::new(),
            history: ConversationHistory::new(),
            context: SpeakingContext::default(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    /// Session clock: time since the session started, as seen by the engine.
    pub fn elapsed(&self) -> Duration {
        self.turns.now()
    }

    pub fn state(&self) -> TurnState {
        self.turns.taker().state()
    }

    pub fn taker(&self) -> &TurnTaker {
        self.turns.taker()
    }

    pub fn store(&self) -> &EmotionSegmentStore {
        &self.store
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn context(&self) -> SpeakingContext {
        self.context
    }

    /// Advances the session clock to `at`, then hands `event` to the engine.
    pub fn send(&mut self, at: Duration, event: TurnEvent) -> SessionStep {
        let mut effects = self.advance_to(at);

        let was_idle = self.state() == TurnState::Idle;
        let trailing = self.taker().unconsumed().to_owned();
        let transcript_len = self.taker().transcript().len();

        let avatar_line = match &event {
            TurnEvent::AvatarSpeechStarted { text } if !was_idle => Some(text.clone()),
            _ => None,
        };

        let handled = self.turns.send(at, event);
        let accepted = (self.taker().transcript().len() > transcript_len)
            .then(|| self.taker().transcript()[transcript_len..].trim().to_owned());

        if let Some(line) = avatar_line {
            self.context = SpeakingContext::after_avatar_line(&line);
            tracing::debug!(target: LOG_TARGET, session_id = %self.id, context = ?self.context, "speaking context updated");
            self.history.push(Speaker::Customer, line);
        }
        for timed in &handled {
            if let Effect::SessionEnded { .. } = timed.effect {
                self.history.push(Speaker::Presenter, trailing.as_str());
            }
        }
        self.observe(&handled);

        effects.extend(handled);
        SessionStep { effects, accepted }
    }

    /// Fires any engine timers due by `at`.
    pub fn advance_to(&mut self, at: Duration) -> Vec<TimedEffect> {
        let fired = self.turns.advance_to(at);
        self.observe(&fired);
        fired
    }

    fn observe(&mut self, effects: &[TimedEffect]) {
        for timed in effects {
            if let Effect::PauseDetected { text } = &timed.effect {
                self.history.push(Speaker::Presenter, text.as_str());
                self.context = SpeakingContext::Presenting;
                tracing::info!(
                    target: LOG_TARGET,
                    session_id = %self.id,
                    at_secs = timed.at.as_secs_f64(),
                    "presenter yielded the floor"
                );
            }
        }
    }

    /// Scores `text` and stores it as a text segment in the current speaking context.
    pub async fn record_text_segment<S>(
        &mut self,
        provider: &S,
        timestamp: f64,
        duration: f64,
        text: &str,
    ) -> Result<&EmotionSegment, SessionError>
    where
        S: SentimentProvider + ?Sized,
    {
        let scores = provider.score(text.to_owned()).await?;
        let segment = EmotionSegment::from_scores(timestamp, duration, text, &scores, self.context)?;
        tracing::debug!(
            target: LOG_TARGET,
            session_id = %self.id,
            timestamp,
            emotion = ?segment.emotion(),
            context = ?segment.context(),
            "text segment recorded"
        );
        self.store.push_text(segment)?;
        let last = self.store.len() - 1;
        Ok(&self.store.segments()[last])
    }

    pub fn into_parts(self) -> (EmotionSegmentStore, ConversationHistory) {
        (self.store, self.history)
    }
}

/// Active sessions keyed by id.
#[derive(Default)]
pub struct SessionRegistry {
    config: TurnTakingConfig,
    sessions: HashMap<Uuid, CoachingSession>,
}

impl SessionRegistry {
    pub fn new(config: TurnTakingConfig) -> Self {
        Self {
            config,
            sessions: HashMap::new(),
        }
    }

    pub fn start(&mut self) -> Uuid {
        let session = CoachingSession::new(self.config.clone());
        let id = session.id();
        tracing::info!(target: LOG_TARGET, session_id = %id, active = self.sessions.len() + 1, "session registered");
        self.sessions.insert(id, session);
        id
    }

    pub fn get(&self, id: &Uuid) -> Result<&CoachingSession, SessionError> {
        self.sessions.get(id).ok_or(SessionError::NotFound(*id))
    }

    pub fn get_mut(&mut self, id: &Uuid) -> Result<&mut CoachingSession, SessionError> {
        self.sessions.get_mut(id).ok_or(SessionError::NotFound(*id))
    }

    pub fn remove(&mut self, id: &Uuid) -> Result<CoachingSession, SessionError> {
        let session = self.sessions.remove(id).ok_or(SessionError::NotFound(*id))?;
        tracing::info!(target: LOG_TARGET, session_id = %id, active = self.sessions.len(), "session removed");
        Ok(session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::{LexiconSentimentProvider, Sentiment};

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn final_text(text: &str) -> TurnEvent {
        TurnEvent::Transcript {
            text: text.into(),
            is_final: true,
        }
    }

    fn avatar(text: &str) -> TurnEvent {
        TurnEvent::AvatarSpeechStarted { text: text.into() }
    }

    #[tokio::test]
    async fn tracks_history_and_context_through_an_objection() {
        let lexicon = LexiconSentimentProvider::new();
        let mut session = CoachingSession::new(TurnTakingConfig::default());
        let greeting = session.taker().config().greeting.clone();

        session.send(secs(0), TurnEvent::StartSession);
        session.send(secs(1), avatar(&greeting));
        assert_eq!(session.context(), SpeakingContext::Presenting);
        session.send(secs(4), TurnEvent::AvatarSpeechEnded);

        let pitch = "Our platform saves your team ten hours every week on reporting";
        let step = session.send(secs(10), final_text(pitch));
        assert_eq!(step.accepted.as_deref(), Some(pitch));
        let segment = session
            .record_text_segment(&lexicon, 10.0, 4.0, pitch)
            .await
            .unwrap();
        assert_eq!(segment.sentiment(), Some(Sentiment::Positive));
        assert_eq!(segment.context(), SpeakingContext::Presenting);

        let fired = session.advance_to(secs(20));
        assert!(fired
            .iter()
            .any(|t| matches!(t.effect, Effect::PauseDetected { .. }) && t.at == secs(16)));

        session.send(secs(21), avatar("Isn't that too expensive for a small team?"));
        assert_eq!(session.context(), SpeakingContext::HandlingObjection);
        session.send(secs(24), TurnEvent::AvatarSpeechEnded);

        let answer = "I understand the concern, most teams recover the cost quickly";
        let step = session.send(secs(30), final_text(answer));
        assert_eq!(step.accepted.as_deref(), Some(answer));
        let segment = session
            .record_text_segment(&lexicon, 30.0, 5.0, answer)
            .await
            .unwrap();
        assert_eq!(segment.context(), SpeakingContext::HandlingObjection);

        let step = session.send(secs(35), TurnEvent::EndPresentation { elapsed: secs(35) });
        assert!(step
            .effects
            .iter()
            .any(|t| matches!(t.effect, Effect::SessionEnded { .. })));

        let speakers: Vec<Speaker> = session.history().turns().iter().map(|t| t.speaker).collect();
        assert_eq!(
            speakers,
            vec![
                Speaker::Customer,
                Speaker::Presenter,
                Speaker::Customer,
                Speaker::Presenter
            ]
        );
        let rendered = session.history().render();
        assert!(rendered.starts_with("CUSTOMER: Hi!"));
        assert!(rendered.ends_with(&format!("PRESENTER: {answer}")));
        assert_eq!(session.store().len(), 2);
    }

    #[tokio::test]
    async fn rejected_fragments_are_not_reported_as_accepted() {
        let mut session = CoachingSession::new(TurnTakingConfig::default());
        session.send(secs(0), TurnEvent::StartSession);

        let step = session.send(
            secs(1),
            TurnEvent::Transcript {
                text: "our platform".into(),
                is_final: false,
            },
        );
        assert_eq!(step.accepted, None);

        session.send(secs(2), avatar("tell me more about pricing"));
        let step = session.send(secs(3), final_text("tell me more about pricing"));
        assert_eq!(step.accepted, None);
        assert_eq!(session.taker().transcript(), "");
    }

    #[tokio::test]
    async fn out_of_order_segment_is_rejected() {
        let lexicon = LexiconSentimentProvider::new();
        let mut session = CoachingSession::new(TurnTakingConfig::default());
        session
            .record_text_segment(&lexicon, 12.0, 1.0, "great results")
            .await
            .unwrap();
        let err = session
            .record_text_segment(&lexicon, 11.0, 1.0, "fast setup")
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Segment(SegmentError::OutOfOrder { .. })));
        assert_eq!(session.store().len(), 1);
    }

    #[test]
    fn recent_returns_newest_turns_in_order() {
        let mut history = ConversationHistory::new();
        history.push(Speaker::Presenter, "one");
        history.push(Speaker::Customer, "two");
        history.push(Speaker::Presenter, "  ");
        history.push(Speaker::Presenter, "three");

        assert_eq!(history.len(), 3);
        let recent: Vec<&str> = history.recent(2).iter().map(|t| t.text.as_str()).collect();
        assert_eq!(recent, vec!["two", "three"]);
        assert_eq!(history.recent(10).len(), 3);
    }

    #[test]
    fn registry_isolates_sessions() {
        let mut registry = SessionRegistry::new(TurnTakingConfig::default());
        let a = registry.start();
        let b = registry.start();
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);

        registry
            .get_mut(&a)
            .unwrap()
            .send(Duration::ZERO, TurnEvent::StartSession);
        assert_eq!(registry.get(&a).unwrap().state(), TurnState::Listening);
        assert_eq!(registry.get(&b).unwrap().state(), TurnState::Idle);

        let removed = registry.remove(&a).unwrap();
        assert_eq!(removed.id(), a);
        assert!(matches!(registry.get(&a), Err(SessionError::NotFound(id)) if id == a));
        assert!(matches!(registry.remove(&a), Err(SessionError::NotFound(_))));
    }
}
