use solver_core::ViewState;

use crate::error::{PipelineError, Result};

/// Transition rules for the client-observable session state.
pub struct ViewStateMachine;

impl ViewStateMachine {
    pub fn validate_transition(from: &ViewState, to: &ViewState) -> Result<()> {
        let allowed = Self::allowed_transitions(from);

        if allowed.contains(to) {
            Ok(())
        } else {
            Err(PipelineError::InvalidTransition {
                from: from.as_str().to_string(),
                to: to.as_str().to_string(),
            })
        }
    }

    fn allowed_transitions(from: &ViewState) -> Vec<ViewState> {
        match from {
            ViewState::Input => vec![ViewState::Processing],
            ViewState::Processing => {
                vec![ViewState::Review, ViewState::Solution, ViewState::Input]
            }
            ViewState::Review => vec![ViewState::Processing],
            ViewState::Solution => vec![ViewState::Input],
        }
    }

    pub fn can_transition(from: &ViewState, to: &ViewState) -> bool {
        Self::validate_transition(from, to).is_ok()
    }

    /// Resolve a stored state on restore. A stored `Processing` marker has
    /// no live connection to resume into, so it resets to `Input`.
    pub fn restore(stored: ViewState) -> ViewState {
        match stored {
            ViewState::Processing => ViewState::Input,
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        assert!(ViewStateMachine::can_transition(
            &ViewState::Input,
            &ViewState::Processing
        ));
        assert!(ViewStateMachine::can_transition(
            &ViewState::Processing,
            &ViewState::Review
        ));
        assert!(ViewStateMachine::can_transition(
            &ViewState::Review,
            &ViewState::Processing
        ));
        assert!(ViewStateMachine::can_transition(
            &ViewState::Processing,
            &ViewState::Solution
        ));
        assert!(ViewStateMachine::can_transition(
            &ViewState::Solution,
            &ViewState::Input
        ));
    }

    #[test]
    fn test_failure_resets_to_input() {
        assert!(ViewStateMachine::can_transition(
            &ViewState::Processing,
            &ViewState::Input
        ));
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(!ViewStateMachine::can_transition(
            &ViewState::Input,
            &ViewState::Solution
        ));
        assert!(!ViewStateMachine::can_transition(
            &ViewState::Review,
            &ViewState::Solution
        ));
        assert!(!ViewStateMachine::can_transition(
            &ViewState::Solution,
            &ViewState::Review
        ));
    }

    #[test]
    fn test_restore_discards_processing() {
        assert_eq!(
            ViewStateMachine::restore(ViewState::Processing),
            ViewState::Input
        );
        assert_eq!(
            ViewStateMachine::restore(ViewState::Review),
            ViewState::Review
        );
        assert_eq!(
            ViewStateMachine::restore(ViewState::Solution),
            ViewState::Solution
        );
    }
}
