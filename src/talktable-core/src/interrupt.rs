//! Interrupt handling around model invocations.
//!
//! A cancellation that arrives while a participant is speaking abandons the
//! attempt and asks the operator whether to stop the session or retry the
//! turn. A second cancellation during that question aborts outright.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::TalkTableError;

/// Source of cancellation requests.
#[async_trait]
pub trait CancelSignal: Send + Sync {
    /// Resolve when the next cancellation arrives.
    async fn cancelled(&self);
}

/// Operator's answer after an interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorChoice {
    Stop,
    Continue,
}

/// Synchronous question put to the operator.
#[async_trait]
pub trait OperatorPrompt: Send + Sync {
    async fn ask_stop_or_continue(&self) -> Result<OperatorChoice, TalkTableError>;
}

/// Tagged result of a guarded call.
#[derive(Debug, PartialEq, Eq)]
pub enum Guarded<T> {
    Completed(T),
    Cancelled,
}

/// What to do with an interrupted turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Run the same turn again from scratch.
    Retry,
    /// End the session.
    Stop,
}

/// Ctrl-C delivered through tokio's signal handling.
#[derive(Debug, Default, Clone, Copy)]
pub struct CtrlCSignal;

#[async_trait]
impl CancelSignal for CtrlCSignal {
    async fn cancelled(&self) {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c, interrupts disabled");
            std::future::pending::<()>().await;
        }
    }
}

pub struct InterruptController {
    signal: Arc<dyn CancelSignal>,
    operator: Arc<dyn OperatorPrompt>,
}

impl InterruptController {
    pub fn new(signal: Arc<dyn CancelSignal>, operator: Arc<dyn OperatorPrompt>) -> Self {
        Self { signal, operator }
    }

    /// Await `fut` unless a cancellation arrives first, in which case `fut`
    /// is dropped along with whatever it had aggregated.
    pub async fn guard<F, T>(&self, fut: F) -> Guarded<T>
    where
        F: Future<Output = T>,
    {
        tokio::select! {
            biased;
            _ = self.signal.cancelled() => Guarded::Cancelled,
            out = fut => Guarded::Completed(out),
        }
    }

    /// Ask the operator how to handle an interrupted turn.
    ///
    /// Returns [`TalkTableError::ForcedAbort`] if another cancellation
    /// arrives before the operator answers.
    pub async fn resolve(&self) -> Result<Resolution, TalkTableError> {
        tokio::select! {
            biased;
            choice = self.operator.ask_stop_or_continue() => match choice? {
                OperatorChoice::Stop => {
                    info!("operator chose to stop the session");
                    Ok(Resolution::Stop)
                }
                OperatorChoice::Continue => {
                    info!("operator chose to retry the turn");
                    Ok(Resolution::Retry)
                }
            },
            _ = self.signal.cancelled() => {
                warn!("interrupted again while waiting for the operator");
                Err(TalkTableError::ForcedAbort)
            }
        }
    }
}
