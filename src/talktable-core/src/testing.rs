//! Scripted collaborators for unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::{StreamExt, future, stream};
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::display::{DisplaySink, TalkEvent};
use crate::error::TalkTableError;
use crate::gateway::{InvocationRequest, ModelGateway, ModelReply};
use crate::interrupt::{CancelSignal, OperatorChoice, OperatorPrompt};
use crate::session::TurnRecord;
use crate::store::{HistoryEntry, SessionMeta, TranscriptStore};

/// Sink that remembers everything it was given.
#[derive(Default)]
pub struct RecordingSink {
    fragments: Mutex<Vec<(String, String)>>,
    events: Mutex<Vec<TalkEvent>>,
}

impl RecordingSink {
    pub fn fragments_for(&self, speaker: &str) -> Vec<String> {
        self.fragments
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| s == speaker)
            .map(|(_, f)| f.clone())
            .collect()
    }

    pub fn events(&self) -> Vec<TalkEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl DisplaySink for RecordingSink {
    fn write_fragment(&self, speaker: &str, fragment: &str) {
        self.fragments
            .lock()
            .unwrap()
            .push((speaker.to_string(), fragment.to_string()));
    }

    fn on_event(&self, event: TalkEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Cancellation source fired by hand from other test doubles.
#[derive(Default)]
pub struct NotifySignal {
    notify: Notify,
}

impl NotifySignal {
    pub fn fire(&self) {
        self.notify.notify_one();
    }
}

#[async_trait]
impl CancelSignal for NotifySignal {
    async fn cancelled(&self) {
        self.notify.notified().await;
    }
}

pub enum OperatorStep {
    Stop,
    Continue,
    /// Fire another cancellation and never answer.
    InterruptAgain,
}

pub struct ScriptedOperator {
    steps: Mutex<VecDeque<OperatorStep>>,
    signal: Arc<NotifySignal>,
    asked: Mutex<u32>,
}

impl ScriptedOperator {
    pub fn new(steps: Vec<OperatorStep>, signal: Arc<NotifySignal>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            signal,
            asked: Mutex::new(0),
        }
    }

    pub fn times_asked(&self) -> u32 {
        *self.asked.lock().unwrap()
    }
}

#[async_trait]
impl OperatorPrompt for ScriptedOperator {
    async fn ask_stop_or_continue(&self) -> Result<OperatorChoice, TalkTableError> {
        *self.asked.lock().unwrap() += 1;
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(OperatorStep::Stop) => Ok(OperatorChoice::Stop),
            Some(OperatorStep::Continue) => Ok(OperatorChoice::Continue),
            Some(OperatorStep::InterruptAgain) => {
                self.signal.fire();
                future::pending().await
            }
            None => Err(TalkTableError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "no scripted operator answer",
            ))),
        }
    }
}

/// One scripted gateway answer.
pub enum Reply {
    Text(String),
    Stream(Vec<String>),
    /// Stream these fragments, then fire a cancellation and hang.
    Interrupt(Vec<String>),
    Fail(String),
    /// Fail as if the model id were not registered.
    UnknownModel,
}

/// Gateway that answers from a script and records every request.
pub struct ScriptedGateway {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<InvocationRequest>>,
    invoked_at: Mutex<Vec<Instant>>,
    signal: Arc<NotifySignal>,
}

impl ScriptedGateway {
    pub fn new(replies: Vec<Reply>, signal: Arc<NotifySignal>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
            invoked_at: Mutex::new(Vec::new()),
            signal,
        }
    }

    pub fn requests(&self) -> Vec<InvocationRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Clock reading at each invocation, in call order.
    pub fn invocation_times(&self) -> Vec<Instant> {
        self.invoked_at.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelGateway for ScriptedGateway {
    async fn invoke(&self, request: &InvocationRequest) -> Result<ModelReply, TalkTableError> {
        self.requests.lock().unwrap().push(request.clone());
        self.invoked_at.lock().unwrap().push(Instant::now());
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            // Unscripted calls echo the prompt so long sessions need no script.
            None => Ok(ModelReply::Text(format!("reply to: {}", request.prompt))),
            Some(Reply::Text(text)) => Ok(ModelReply::Text(text)),
            Some(Reply::Stream(parts)) => Ok(ModelReply::Stream(Box::pin(stream::iter(
                parts.into_iter().map(Ok),
            )))),
            Some(Reply::Interrupt(parts)) => {
                let signal = self.signal.clone();
                let hang = stream::once(async move {
                    signal.fire();
                    future::pending::<Result<String, TalkTableError>>().await
                });
                Ok(ModelReply::Stream(Box::pin(
                    stream::iter(parts.into_iter().map(Ok)).chain(hang),
                )))
            }
            Some(Reply::Fail(reason)) => Err(TalkTableError::invocation(&request.model_id, reason)),
            Some(Reply::UnknownModel) => {
                Err(TalkTableError::lookup(&request.model_id, "not registered"))
            }
        }
    }
}

/// Store whose turn appends start failing after `ok_turns` successes.
pub struct FailingStore {
    inner: crate::store::SqliteStore,
    ok_turns: Mutex<u32>,
}

impl FailingStore {
    pub fn new(ok_turns: u32) -> Self {
        Self {
            inner: crate::store::SqliteStore::open_in_memory().unwrap(),
            ok_turns: Mutex::new(ok_turns),
        }
    }

    pub fn turns(&self, session_id: &str) -> Vec<TurnRecord> {
        self.inner.fetch_turns(session_id).unwrap()
    }
}

impl TranscriptStore for FailingStore {
    fn append_session(&self, meta: &SessionMeta) -> Result<(), TalkTableError> {
        self.inner.append_session(meta)
    }

    fn append_turn(&self, turn: &TurnRecord) -> Result<(), TalkTableError> {
        let mut left = self.ok_turns.lock().unwrap();
        if *left == 0 {
            return Err(TalkTableError::Persistence("disk full".to_string()));
        }
        *left -= 1;
        self.inner.append_turn(turn)
    }

    fn fetch_history(&self, session_id: &str) -> Result<Vec<HistoryEntry>, TalkTableError> {
        self.inner.fetch_history(session_id)
    }
}
