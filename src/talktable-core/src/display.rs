//! Display sink passed to the scheduler.

use crate::participant::Seat;

/// Lifecycle events emitted around each turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TalkEvent {
    /// A participant is about to be invoked. `prompt` is only set when the
    /// session reveals prompts.
    TurnStart {
        turn_number: u32,
        label: String,
        speaker: String,
        model: String,
        seat: Seat,
        prompt: Option<String>,
    },
    /// The participant's full response has been persisted.
    TurnEnd { speaker: String },
    /// A cancellation arrived while the participant was speaking.
    Interrupted { speaker: String },
    /// The interrupted turn is being attempted again.
    Retrying { speaker: String, attempt: u32 },
    /// The invocation failed and the session is ending.
    TurnFailed { speaker: String, error: String },
}

/// Receives streamed text and turn events.
///
/// Implementations must return quickly; the scheduler calls them inline.
pub trait DisplaySink: Send + Sync {
    /// Print one streamed fragment of `speaker`'s response.
    fn write_fragment(&self, speaker: &str, fragment: &str);

    fn on_event(&self, _event: TalkEvent) {}
}

