use crate::turn::{Effect, TimerKind, TimerToken, TurnEvent, TurnTaker};
use std::collections::HashMap;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::task::JoinHandle;

const LOG_TARGET: &str = "turn::driver";
const TIMER_CHANNEL_CAPACITY: usize = 8;

/// Runs `taker` on the tokio clock until `events` closes or the effect sink
/// is dropped, then returns the final state machine.
///
/// Events are handled strictly in arrival order on one task. Timers are
/// sleeping tasks that post their token back; re-arming a kind aborts the
/// previous sleeper, and a token that still slips through is rejected by the
/// state machine as stale.
pub fn spawn(
    taker: TurnTaker,
    events: Receiver<TurnEvent>,
    effects: Sender<Effect>,
) -> JoinHandle<TurnTaker> {
    tokio::spawn(run(taker, events, effects))
}

async fn run(
    mut taker: TurnTaker,
    mut events: Receiver<TurnEvent>,
    effects: Sender<Effect>,
) -> TurnTaker {
    let (timer_tx, mut timer_rx) = mpsc::channel::<TimerToken>(TIMER_CHANNEL_CAPACITY);
    let mut timers = Timers::default();

    loop {
        let event = tokio::select! {
            event = events.recv() => match event {
                Some(event) => event,
                None => {
                    tracing::debug!(target: LOG_TARGET, "event stream closed");
                    break;
                }
            },
            Some(token) = timer_rx.recv() => TurnEvent::TimerFired(token),
        };

        let transition = taker.handle(event);
        for effect in transition.effects {
            match effect {
                Effect::ArmTimer { token, after } => {
                    let tx = timer_tx.clone();
                    timers.replace(
                        token.kind,
                        tokio::spawn(async move {
                            tokio::time::sleep(after).await;
                            let _ = tx.send(token).await;
                        }),
                    );
                }
                Effect::CancelTimer(kind) => timers.cancel(kind),
                outward => {
                    if effects.send(outward).await.is_err() {
                        tracing::warn!(target: LOG_TARGET, "effect receiver dropped, stopping");
                        timers.cancel_all();
                        return taker;
                    }
                }
            }
        }
    }

    timers.cancel_all();
    taker
}

#[derive(Default)]
struct Timers {
    handles: HashMap<TimerKind, JoinHandle<()>>,
}

impl Timers {
    fn replace(&mut self, kind: TimerKind, handle: JoinHandle<()>) {
        if let Some(previous) = self.handles.insert(kind, handle) {
            previous.abort();
        }
    }

    fn cancel(&mut self, kind: TimerKind) {
        if let Some(handle) = self.handles.remove(&kind) {
            handle.abort();
        }
    }

    fn cancel_all(&mut self) {
        for (_, handle) in self.handles.drain() {
            handle.abort();
        }
    }
}
