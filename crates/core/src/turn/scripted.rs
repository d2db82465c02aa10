use crate::turn::{Effect, TimerToken, TurnEvent, TurnTaker};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// An outward effect stamped with the virtual time it was produced at.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TimedEffect {
    pub at: Duration,
    pub effect: Effect,
}

/// Drives a `TurnTaker` on a virtual clock.
///
/// Timers due at or before an event's timestamp fire before that event is
/// handled. Used for deterministic replays of recorded sessions.
#[derive(Clone, Debug)]
pub struct ScriptedDriver {
    taker: TurnTaker,
    now: Duration,
    pending: Vec<(Duration, TimerToken)>,
}

impl ScriptedDriver {
    pub fn new(taker: TurnTaker) -> Self {
        Self {
            taker,
            now: Duration::ZERO,
            pending: Vec::new(),
        }
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn taker(&self) -> &TurnTaker {
        &self.taker
    }

    pub fn into_taker(self) -> TurnTaker {
        self.taker
    }

    /// Advances to `at` and then handles `event`.
    pub fn send(&mut self, at: Duration, event: TurnEvent) -> Vec<TimedEffect> {
        let mut out = self.advance_to(at);
        out.extend(self.dispatch(event));
        out
    }

    /// Fires every timer due by `until`, earliest deadline first.
    pub fn advance_to(&mut self, until: Duration) -> Vec<TimedEffect> {
        let mut out = Vec::new();
        while let Some(idx) = self.next_due(until) {
            let (deadline, token) = self.pending.remove(idx);
            self.now = self.now.max(deadline);
            out.extend(self.dispatch(TurnEvent::TimerFired(token)));
        }
        self.now = self.now.max(until);
        out
    }

    fn next_due(&self, until: Duration) -> Option<usize> {
        self.pending
            .iter()
            .enumerate()
            .filter(|(_, (deadline, _))| *deadline <= until)
            .min_by_key(|(_, (deadline, _))| *deadline)
            .map(|(idx, _)| idx)
    }

    fn dispatch(&mut self, event: TurnEvent) -> Vec<TimedEffect> {
        let transition = self.taker.handle(event);
        let mut out = Vec::new();
        for effect in transition.effects {
            match effect {
                Effect::ArmTimer { token, after } => {
                    self.pending.retain(|(_, t)| t.kind != token.kind);
                    self.pending.push((self.now + after, token));
                }
                Effect::CancelTimer(kind) => self.pending.retain(|(_, t)| t.kind != kind),
                other => out.push(TimedEffect {
                    at: self.now,
                    effect: other,
                }),
            }
        }
        out
    }
}
