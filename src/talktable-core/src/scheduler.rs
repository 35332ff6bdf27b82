//! Turn scheduling.
//!
//! Drives a session through its [`plan`](crate::schedule::plan): builds each
//! turn's prompt, invokes the participant under the interrupt guard, streams
//! the reply to the display sink and appends the resolved turn to the
//! transcript.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::display::{DisplaySink, TalkEvent};
use crate::error::TalkTableError;
use crate::gateway::{InvocationRequest, ModelGateway};
use crate::interrupt::{Guarded, InterruptController, Resolution};
use crate::participant::Participant;
use crate::prompts::{PromptsConfig, render};
use crate::schedule::{Step, plan};
use crate::session::{ERROR_MARKER, Session, SessionReport, SessionStatus, TurnRecord};
use crate::store::{SessionMeta, TranscriptStore};
use crate::stream::aggregate;

/// How a single turn resolved.
enum TurnOutcome {
    Spoken(String),
    Stopped,
}

/// A turn ready to be invoked.
struct PreparedTurn {
    step: Step,
    turn_number: u32,
    speaker: Participant,
    request: InvocationRequest,
}

/// Sequences moderator and debater turns for one session.
pub struct TurnScheduler {
    session: Session,
    gateway: Arc<dyn ModelGateway>,
    store: Arc<dyn TranscriptStore>,
    sink: Arc<dyn DisplaySink>,
    interrupts: InterruptController,
    prompts: PromptsConfig,
    /// Turns of any kind persisted so far.
    turns_completed: u32,
    /// Full response of the latest debater turn.
    last_response: Option<String>,
    /// Debater responses of the round in progress, in speaking order.
    round_responses: Vec<String>,
}

impl TurnScheduler {
    pub fn new(
        session: Session,
        gateway: Arc<dyn ModelGateway>,
        store: Arc<dyn TranscriptStore>,
        sink: Arc<dyn DisplaySink>,
        interrupts: InterruptController,
    ) -> Self {
        Self {
            session,
            gateway,
            store,
            sink,
            interrupts,
            prompts: PromptsConfig::default(),
            turns_completed: 0,
            last_response: None,
            round_responses: Vec::with_capacity(2),
        }
    }

    /// Use custom moderator templates.
    pub fn with_prompts(mut self, prompts: PromptsConfig) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Run the whole session.
    pub async fn run(&mut self) -> SessionReport {
        let (status, error) = match self.drive().await {
            Ok(status) => (status, None),
            Err(TalkTableError::ForcedAbort) => {
                (SessionStatus::AbortedByUser, Some(TalkTableError::ForcedAbort))
            }
            Err(e) => (SessionStatus::AbortedByError, Some(e)),
        };

        info!(
            session = %self.session.id(),
            status = status.display_name(),
            turns = self.turns_completed,
            "session finished"
        );

        SessionReport {
            session_id: self.session.id().to_string(),
            status,
            turns_completed: self.turns_completed,
            error,
        }
    }

    async fn drive(&mut self) -> Result<SessionStatus, TalkTableError> {
        let [a, b] = self.session.debaters();
        info!(
            session = %self.session.id(),
            topic = %self.session.topic(),
            rounds = self.session.max_rounds(),
            "starting session"
        );
        self.store.append_session(&SessionMeta {
            session_id: self.session.id().to_string(),
            topic: self.session.topic().to_string(),
            debater_a_name: a.name.clone(),
            debater_a_model: a.model.clone(),
            debater_b_name: b.name.clone(),
            debater_b_model: b.model.clone(),
        })?;

        for step in plan(self.session.max_rounds()) {
            let turn = self.prepare(step)?;
            match self.take_turn(&turn).await? {
                TurnOutcome::Stopped => return Ok(SessionStatus::AbortedByUser),
                TurnOutcome::Spoken(response) => {
                    self.turns_completed += 1;
                    if let Step::Debater { .. } = step {
                        self.session.advance_turn();
                        self.round_responses.push(response.clone());
                        self.last_response = Some(response);

                        let delay = self.session.inter_turn_delay();
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
            }
        }

        Ok(SessionStatus::Completed)
    }

    /// Build the speaker, prompt and turn number for `step`.
    fn prepare(&mut self, step: Step) -> Result<PreparedTurn, TalkTableError> {
        let seat = step.seat();
        let speaker = self.session.participant(seat).clone();
        let topic = self.session.topic().to_string();
        let persona = speaker.render_persona(&topic, &self.session.opponent_name(seat));
        let mut context_fragments = Vec::new();

        let [a, b] = self.session.debaters().clone();
        let total_rounds = self.session.max_rounds().to_string();

        let (turn_number, prompt) = match step {
            Step::Debater { turn_number, .. } => {
                let prompt = self.last_response.clone().unwrap_or_else(|| topic.clone());
                (turn_number, prompt)
            }
            Step::Intro => (
                self.session.turn_count(),
                render(
                    &self.prompts.intro,
                    &[
                        ("topic", &topic),
                        ("debater_a", &a.name),
                        ("model_a", &a.model),
                        ("debater_b", &b.name),
                        ("model_b", &b.model),
                        ("total_rounds", &total_rounds),
                    ],
                ),
            ),
            Step::RoundOpen { round } => (
                self.session.turn_count(),
                render(
                    &self.prompts.round_open,
                    &[
                        ("topic", &topic),
                        ("round", &round.to_string()),
                        ("total_rounds", &total_rounds),
                        ("next_speaker", &a.name),
                        ("next_model", &a.model),
                    ],
                ),
            ),
            Step::RoundTransition { closing } => {
                let (response_a, response_b) = self.take_round_responses();
                (
                    self.session.turn_count(),
                    render(
                        &self.prompts.round_transition,
                        &[
                            ("topic", &topic),
                            ("round", &closing.to_string()),
                            ("next_round", &(closing + 1).to_string()),
                            ("total_rounds", &total_rounds),
                            ("debater_a", &a.name),
                            ("debater_b", &b.name),
                            ("next_speaker", &a.name),
                            ("response_a", &response_a),
                            ("response_b", &response_b),
                        ],
                    ),
                )
            }
            Step::RoundClose { round } => {
                let (response_a, response_b) = self.take_round_responses();
                (
                    self.session.turn_count(),
                    render(
                        &self.prompts.round_close,
                        &[
                            ("topic", &topic),
                            ("round", &round.to_string()),
                            ("total_rounds", &total_rounds),
                            ("debater_a", &a.name),
                            ("debater_b", &b.name),
                            ("response_a", &response_a),
                            ("response_b", &response_b),
                        ],
                    ),
                )
            }
            Step::Conclusion => {
                context_fragments = self
                    .store
                    .fetch_history(self.session.id())?
                    .into_iter()
                    .map(|entry| format!("{}: {}", entry.speaker_name, entry.response))
                    .collect();
                (
                    self.session.turn_count(),
                    render(
                        &self.prompts.conclusion,
                        &[
                            ("topic", &topic),
                            ("total_rounds", &total_rounds),
                            ("debater_a", &a.name),
                            ("debater_b", &b.name),
                        ],
                    ),
                )
            }
        };

        let request = InvocationRequest {
            model_id: speaker.model.clone(),
            persona,
            prompt,
            context_fragments,
        };

        Ok(PreparedTurn {
            step,
            turn_number,
            speaker,
            request,
        })
    }

    fn take_round_responses(&mut self) -> (String, String) {
        let mut responses = std::mem::take(&mut self.round_responses).into_iter();
        (
            responses.next().unwrap_or_default(),
            responses.next().unwrap_or_default(),
        )
    }

    /// Invoke the speaker until the turn resolves. An interrupted attempt is
    /// discarded and, if the operator asks for it, repeated with the same
    /// turn number and prompt.
    async fn take_turn(&self, turn: &PreparedTurn) -> Result<TurnOutcome, TalkTableError> {
        let speaker = turn.speaker.name.as_str();
        let seat = turn.step.seat();

        debug!(turn = turn.turn_number, speaker, prompt = %turn.request.prompt, "turn prompt");
        self.sink.on_event(TalkEvent::TurnStart {
            turn_number: turn.turn_number,
            label: turn.step.label(),
            speaker: speaker.to_string(),
            model: turn.speaker.model.clone(),
            seat,
            prompt: self
                .session
                .reveal_prompt()
                .then(|| turn.request.prompt.clone()),
        });

        let mut attempt = 1;
        loop {
            let call = async {
                match self.gateway.invoke(&turn.request).await {
                    Ok(reply) => aggregate(reply, speaker, self.sink.as_ref()).await,
                    Err(e) => Err(e),
                }
            };

            match self.interrupts.guard(call).await {
                Guarded::Completed(Ok(response)) => {
                    self.persist(turn, &response)?;
                    self.sink.on_event(TalkEvent::TurnEnd {
                        speaker: speaker.to_string(),
                    });
                    info!(turn = turn.turn_number, speaker, attempt, "turn completed");
                    return Ok(TurnOutcome::Spoken(response));
                }
                Guarded::Completed(Err(e)) => {
                    error!(turn = turn.turn_number, speaker, error = %e, "turn failed");
                    self.sink.on_event(TalkEvent::TurnFailed {
                        speaker: speaker.to_string(),
                        error: e.to_string(),
                    });
                    if e.is_gateway_failure() {
                        self.persist(turn, &format!("{} {}", ERROR_MARKER, e))?;
                    }
                    return Err(e);
                }
                Guarded::Cancelled => {
                    warn!(turn = turn.turn_number, speaker, attempt, "turn interrupted");
                    self.sink.on_event(TalkEvent::Interrupted {
                        speaker: speaker.to_string(),
                    });
                    match self.interrupts.resolve().await? {
                        Resolution::Stop => return Ok(TurnOutcome::Stopped),
                        Resolution::Retry => {
                            attempt += 1;
                            self.sink.on_event(TalkEvent::Retrying {
                                speaker: speaker.to_string(),
                                attempt,
                            });
                        }
                    }
                }
            }
        }
    }

    fn persist(&self, turn: &PreparedTurn, response: &str) -> Result<(), TalkTableError> {
        self.store.append_turn(&TurnRecord {
            session_id: self.session.id().to_string(),
            turn_number: turn.turn_number,
            speaker_name: turn.speaker.name.clone(),
            model_id: turn.speaker.model.clone(),
            prompt: turn.request.prompt.clone(),
            response: response.to_string(),
            is_moderator: turn.step.is_moderator(),
            timestamp: Utc::now(),
        })
    }
}
