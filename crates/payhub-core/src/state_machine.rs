use std::fmt;

use crate::error::CoreError;

/// The states of an outbound transfer lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum TransferState {
    /// Transfer accepted and funds reserved; execution not yet attempted.
    Scheduled,
    /// Handed off to the external network, awaiting confirmation.
    Processed,
    /// Settled on the target network — transfer is final.
    Confirmed,
    /// Execution failed or was reverted. Final state.
    Failed,
    /// Withdrawn by the sender before execution. Final state.
    Canceled,
}

impl TransferState {
    /// Whether this is a final (terminal) state.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed | Self::Canceled)
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scheduled => write!(f, "Scheduled"),
            Self::Processed => write!(f, "Processed"),
            Self::Confirmed => write!(f, "Confirmed"),
            Self::Failed => write!(f, "Failed"),
            Self::Canceled => write!(f, "Canceled"),
        }
    }
}

/// Events that trigger transfer state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEvent {
    /// The transfer was submitted to the external network.
    Submitted,
    /// The target network confirmed settlement.
    Confirmed,
    /// Execution failed or the submitted transaction was reverted.
    Failed,
    /// The sender withdrew the transfer before execution.
    Canceled,
}

/// Manages transfer state transitions.
///
/// Valid transitions:
/// - Scheduled → Processed (Submitted)
/// - Scheduled → Confirmed (Confirmed — internal transfers settle immediately)
/// - Scheduled → Failed (Failed)
/// - Scheduled → Canceled (Canceled)
/// - Processed → Confirmed (Confirmed)
/// - Processed → Failed (Failed — a submitted transaction was reverted)
pub struct TransferStateMachine;

impl TransferStateMachine {
    /// Attempt a state transition based on an event.
    /// Returns the new state on success, or an error for invalid transitions.
    pub fn transition(
        current: TransferState,
        event: TransferEvent,
    ) -> Result<TransferState, CoreError> {
        let new_state = match (current, event) {
            // From Scheduled
            (TransferState::Scheduled, TransferEvent::Submitted) => TransferState::Processed,
            (TransferState::Scheduled, TransferEvent::Confirmed) => TransferState::Confirmed,
            (TransferState::Scheduled, TransferEvent::Failed) => TransferState::Failed,
            (TransferState::Scheduled, TransferEvent::Canceled) => TransferState::Canceled,

            // From Processed
            (TransferState::Processed, TransferEvent::Confirmed) => TransferState::Confirmed,
            (TransferState::Processed, TransferEvent::Failed) => TransferState::Failed,

            // All other transitions are invalid
            _ => {
                let target = match event {
                    TransferEvent::Submitted => TransferState::Processed,
                    TransferEvent::Confirmed => TransferState::Confirmed,
                    TransferEvent::Failed => TransferState::Failed,
                    TransferEvent::Canceled => TransferState::Canceled,
                };
                return Err(CoreError::InvalidStateTransition {
                    from: current,
                    to: target,
                });
            }
        };

        tracing::debug!(
            from = %current,
            to = %new_state,
            event = ?event,
            "transfer state transition"
        );

        Ok(new_state)
    }

    /// Check if a transition is valid without performing it.
    pub fn can_transition(current: TransferState, event: TransferEvent) -> bool {
        Self::transition(current, event).is_ok()
    }
}
