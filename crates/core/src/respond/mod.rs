//! Decides whether the simulated customer answers a pause, and what it says.

use crate::session::{ConversationHistory, ConversationTurn};
use crate::turn::word_count;
use futures::future::BoxFuture;

const LOG_TARGET: &str = "respond";

/// Pauses carrying fewer words than this never get a reply.
pub const MIN_REPLY_WORDS: usize = 5;

/// Conversation turns handed to the responder as context.
pub const CONTEXT_TURNS: usize = 4;

pub const FALLBACK_REPLY: &str = "That's a good question. Could you elaborate a bit more?";

const INVITATION_PHRASES: &[&str] = &[
    "what do you think",
    "any questions",
    "does that make sense",
    "do you have any",
    "tell me what you",
];

const SILENCE_MARKERS: &[&str] = &["SILENT", "SILENCE", "NO RESPONSE"];

#[derive(thiserror::Error, Debug)]
pub enum RespondError {
    #[error("responder error: {0}")]
    Backend(String),
}

/// Produces the customer's raw reply, which may be a silence marker.
pub trait CustomerResponder: Send + Sync {
    fn reply<'a>(
        &'a self,
        presenter_text: &'a str,
        recent: &'a [ConversationTurn],
    ) -> BoxFuture<'a, Result<String, RespondError>>;
}

/// True when the presenter is handing the floor to the customer.
pub fn is_direct_question(text: &str) -> bool {
    if text.trim_end().ends_with('?') {
        return true;
    }
    text.split('.')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .any(|s| INVITATION_PHRASES.iter().any(|p| s.starts_with(p)))
}

/// Cleans up a raw reply. `None` means the customer stays silent.
pub fn interpret_reply(raw: &str, is_question: bool) -> Option<String> {
    let reply = raw.trim().trim_matches(|c: char| c == '"' || c == '\'').trim();
    let silent = SILENCE_MARKERS
        .iter()
        .any(|m| reply.eq_ignore_ascii_case(m));

    if is_question {
        if reply.is_empty() || silent {
            return Some(FALLBACK_REPLY.to_owned());
        }
        return Some(reply.to_owned());
    }
    if silent || reply.chars().count() < 2 {
        return None;
    }
    Some(reply.to_owned())
}

/// Runs one pause through the responder.
///
/// Responder failures are logged and treated as silence so a flaky backend
/// never blocks the presenter.
pub async fn respond_to_pause<R>(
    responder: &R,
    presenter_text: &str,
    history: &ConversationHistory,
) -> Option<String>
where
    R: CustomerResponder + ?Sized,
{
    let words = word_count(presenter_text);
    if words < MIN_REPLY_WORDS {
        tracing::debug!(target: LOG_TARGET, words, "pause too short to answer");
        return None;
    }

    let is_question = is_direct_question(presenter_text);
    let raw = match responder
        .reply(presenter_text, history.recent(CONTEXT_TURNS))
        .await
    {
        Ok(raw) => raw,
        Err(e) => {
            tracing::error!(target: LOG_TARGET, error = %e, "customer responder failed");
            return None;
        }
    };

    let reply = interpret_reply(&raw, is_question);
    match &reply {
        Some(text) => tracing::info!(target: LOG_TARGET, is_question, reply = %text, "customer replies"),
        None => tracing::info!(target: LOG_TARGET, "customer stays silent"),
    }
    reply
}
