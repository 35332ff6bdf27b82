//! Session and turn records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::TalkTableError;
use crate::participant::{Participant, Seat};

/// One orchestrated conversation. Immutable once created apart from the
/// running `turn_count`.
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    topic: String,
    debaters: [Participant; 2],
    moderator: Participant,
    max_rounds: u32,
    inter_turn_delay: Duration,
    reveal_prompt: bool,
    /// Debater turns completed so far.
    turn_count: u32,
}

impl Session {
    pub fn new(
        topic: impl Into<String>,
        debaters: [Participant; 2],
        moderator: Participant,
        max_rounds: u32,
    ) -> Result<Self, TalkTableError> {
        if max_rounds == 0 {
            return Err(TalkTableError::Config(
                "a session needs at least one round".to_string(),
            ));
        }
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            topic: topic.into(),
            debaters,
            moderator,
            max_rounds,
            inter_turn_delay: Duration::ZERO,
            reveal_prompt: false,
            turn_count: 0,
        })
    }

    /// Build a session from a validated configuration. Only the first two
    /// participants take part.
    pub fn from_config(config: &AppConfig) -> Result<Self, TalkTableError> {
        let [a, b] = match config.participants.as_slice() {
            [a, b, ..] => [a.clone(), b.clone()],
            other => {
                return Err(TalkTableError::InvalidParticipantCount {
                    min: 2,
                    actual: other.len(),
                });
            }
        };
        Ok(Self::new(&config.topic, [a, b], config.moderator(), config.max_turns)?
            .with_delay(config.inter_turn_delay())
            .with_reveal_prompt(config.show_prompt))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.inter_turn_delay = delay;
        self
    }

    pub fn with_reveal_prompt(mut self, reveal: bool) -> Self {
        self.reveal_prompt = reveal;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn debaters(&self) -> &[Participant; 2] {
        &self.debaters
    }

    pub fn moderator(&self) -> &Participant {
        &self.moderator
    }

    pub fn max_rounds(&self) -> u32 {
        self.max_rounds
    }

    pub fn inter_turn_delay(&self) -> Duration {
        self.inter_turn_delay
    }

    pub fn reveal_prompt(&self) -> bool {
        self.reveal_prompt
    }

    pub fn turn_count(&self) -> u32 {
        self.turn_count
    }

    pub(crate) fn advance_turn(&mut self) -> u32 {
        self.turn_count += 1;
        self.turn_count
    }

    pub fn participant(&self, seat: Seat) -> &Participant {
        match seat {
            Seat::DebaterA => &self.debaters[0],
            Seat::DebaterB => &self.debaters[1],
            Seat::Moderator => &self.moderator,
        }
    }

    /// Name of whoever faces `seat`. The moderator faces both debaters.
    pub fn opponent_name(&self, seat: Seat) -> String {
        match seat {
            Seat::DebaterA => self.debaters[1].name.clone(),
            Seat::DebaterB => self.debaters[0].name.clone(),
            Seat::Moderator => format!("{} and {}", self.debaters[0].name, self.debaters[1].name),
        }
    }
}

/// A resolved turn as written to the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub session_id: String,
    /// Debater turns count from 1. Moderator turns carry the number of the
    /// latest completed debater turn, so the intro is turn 0.
    pub turn_number: u32,
    pub speaker_name: String,
    pub model_id: String,
    pub prompt: String,
    pub response: String,
    pub is_moderator: bool,
    pub timestamp: DateTime<Utc>,
}

/// Prefix of the response stored for a turn whose invocation failed.
pub const ERROR_MARKER: &str = "[error]";

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionStatus {
    Completed,
    AbortedByUser,
    AbortedByError,
}

impl SessionStatus {
    pub fn display_name(&self) -> &str {
        match self {
            SessionStatus::Completed => "completed",
            SessionStatus::AbortedByUser => "aborted by user",
            SessionStatus::AbortedByError => "aborted by error",
        }
    }
}

/// Outcome of [`TurnScheduler::run`](crate::TurnScheduler::run).
#[derive(Debug)]
pub struct SessionReport {
    pub session_id: String,
    pub status: SessionStatus,
    /// Turns, moderator and debater, successfully persisted.
    pub turns_completed: u32,
    /// The error that ended the session, if any. A forced abort reports
    /// `AbortedByUser` together with [`TalkTableError::ForcedAbort`].
    pub error: Option<TalkTableError>,
}

impl SessionReport {
    pub fn exit_code(&self) -> i32 {
        match (&self.status, &self.error) {
            (_, Some(e)) => e.exit_code(),
            (SessionStatus::AbortedByError, None) => 1,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn debaters() -> [Participant; 2] {
        [Participant::new("Alice", "m1"), Participant::new("Bob", "m2")]
    }

    #[test]
    fn test_session_ids_are_unique() {
        let a = Session::new("T", debaters(), Participant::new("MC", "m3"), 1).unwrap();
        let b = Session::new("T", debaters(), Participant::new("MC", "m3"), 1).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.turn_count(), 0);
    }

    #[test]
    fn test_zero_rounds_rejected() {
        assert!(Session::new("T", debaters(), Participant::new("MC", "m3"), 0).is_err());
    }

    #[test]
    fn test_from_config_takes_first_two_participants() {
        let config = AppConfig::from_yaml_str(
            "topic: T\nmax_turns: 4\nllm_wait_time: 0.5\nshow_prompt: true\nparticipants:\n  - {name: A, model: m1}\n  - {name: B, model: m2}\n  - {name: C, model: m3}\n",
        )
        .unwrap();
        let session = Session::from_config(&config).unwrap();
        assert_eq!(session.debaters()[0].name, "A");
        assert_eq!(session.debaters()[1].name, "B");
        assert_eq!(session.max_rounds(), 4);
        assert_eq!(session.inter_turn_delay(), Duration::from_millis(500));
        assert!(session.reveal_prompt());
        assert_eq!(session.moderator().name, "MC");
    }

    #[test]
    fn test_opponents() {
        let session = Session::new("T", debaters(), Participant::new("MC", "m3"), 1).unwrap();
        assert_eq!(session.opponent_name(Seat::DebaterA), "Bob");
        assert_eq!(session.opponent_name(Seat::DebaterB), "Alice");
        assert_eq!(session.opponent_name(Seat::Moderator), "Alice and Bob");
    }

    #[test]
    fn test_report_exit_codes() {
        let report = SessionReport {
            session_id: "s".into(),
            status: SessionStatus::AbortedByUser,
            turns_completed: 3,
            error: None,
        };
        assert_eq!(report.exit_code(), 0);

        let report = SessionReport {
            error: Some(TalkTableError::ForcedAbort),
            ..report
        };
        assert_eq!(report.exit_code(), 130);
    }
}
