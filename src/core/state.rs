use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::BelegError;

/// Lifecycle of one document run.
///
/// ```text
/// Mapped -> Correcting -> Validated -> Serialized
///                 |            |
///                 \-> Rejected <-/
/// ```
///
/// `Validated -> Rejected` only happens when the writer fails on a document
/// the engine accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingState {
    Mapped,
    Correcting,
    Validated,
    Serialized,
    Rejected,
}

impl ProcessingState {
    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Serialized | Self::Rejected)
    }

    pub fn can_transition_to(&self, next: ProcessingState) -> bool {
        matches!(
            (self, next),
            (Self::Mapped, Self::Correcting)
                | (Self::Correcting, Self::Validated)
                | (Self::Correcting, Self::Rejected)
                | (Self::Validated, Self::Serialized)
                | (Self::Validated, Self::Rejected)
        )
    }

    /// Move to `next`, refusing anything the lifecycle does not allow.
    pub fn transition(&mut self, next: ProcessingState) -> Result<(), BelegError> {
        if !self.can_transition_to(next) {
            return Err(BelegError::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            });
        }
        tracing::debug!(from = %self, to = %next, "state transition");
        *self = next;
        Ok(())
    }
}

impl fmt::Display for ProcessingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Mapped => "MAPPED",
            Self::Correcting => "CORRECTING",
            Self::Validated => "VALIDATED",
            Self::Serialized => "SERIALIZED",
            Self::Rejected => "REJECTED",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path() {
        let mut state = ProcessingState::Mapped;
        state.transition(ProcessingState::Correcting).unwrap();
        state.transition(ProcessingState::Validated).unwrap();
        state.transition(ProcessingState::Serialized).unwrap();
        assert!(state.is_terminal());
    }

    #[test]
    fn skipping_a_state_is_refused() {
        let mut state = ProcessingState::Mapped;
        let err = state.transition(ProcessingState::Serialized).unwrap_err();
        assert!(matches!(err, BelegError::InvalidTransition { .. }));
        assert_eq!(state, ProcessingState::Mapped);
    }

    #[test]
    fn writer_failure_rejects_a_validated_document() {
        let mut state = ProcessingState::Validated;
        state.transition(ProcessingState::Rejected).unwrap();
        assert!(state.is_terminal());
    }

    #[test]
    fn rejected_is_final() {
        let mut state = ProcessingState::Correcting;
        state.transition(ProcessingState::Rejected).unwrap();
        assert!(state.transition(ProcessingState::Validated).is_err());
    }
}
