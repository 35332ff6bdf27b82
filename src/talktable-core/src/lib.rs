//! TalkTable Core Library
//!
//! Orchestrates a moderated conversation between two language models:
//! turn scheduling, streamed response aggregation, interrupt handling and
//! transcript persistence.

pub mod config;
pub mod display;
pub mod error;
pub mod gateway;
pub mod interrupt;
pub mod participant;
pub mod prompts;
pub mod schedule;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod stream;

#[cfg(test)]
mod testing;

pub use config::AppConfig;
pub use display::{DisplaySink, TalkEvent};
pub use error::TalkTableError;
pub use gateway::{
    Endpoint, FragmentStream, InvocationRequest, ModelGateway, ModelRegistry, ModelReply,
    OpenAiGateway,
};
pub use interrupt::{
    CancelSignal, CtrlCSignal, Guarded, InterruptController, OperatorChoice, OperatorPrompt,
    Resolution,
};
pub use participant::{Participant, Seat};
pub use scheduler::TurnScheduler;
pub use session::{Session, SessionReport, SessionStatus, TurnRecord};
pub use store::{HistoryEntry, SessionMeta, SqliteStore, TranscriptStore};
