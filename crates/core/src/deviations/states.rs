use serde::{Deserialize, Serialize};

use crate::domain::deviation::{DeviationId, DeviationStatus};
use crate::errors::EngineError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviationEvent {
    Approve,
    Reject,
}

impl DeviationEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }
}

/// Follow-up work a transition asks of the case owner.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviationAction {
    ApplyProposedTagging,
    RestoreCaseEligibility,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: DeviationStatus,
    pub to: DeviationStatus,
    pub event: DeviationEvent,
    pub actions: Vec<DeviationAction>,
}

/// `Pending → {Approved, Rejected}`. Terminal states accept nothing.
pub fn transition(
    deviation_id: &DeviationId,
    current: DeviationStatus,
    event: DeviationEvent,
) -> Result<TransitionOutcome, EngineError> {
    use DeviationAction::{ApplyProposedTagging, RestoreCaseEligibility};
    use DeviationStatus::{Approved, Pending, Rejected};

    let (to, actions) = match (current, event) {
        (Pending, DeviationEvent::Approve) => {
            (Approved, vec![ApplyProposedTagging, RestoreCaseEligibility])
        }
        (Pending, DeviationEvent::Reject) => (Rejected, vec![RestoreCaseEligibility]),
        (Approved | Rejected, _) => {
            return Err(EngineError::InvalidTransition {
                deviation_id: deviation_id.0.clone(),
                status: current,
            });
        }
    };

    Ok(TransitionOutcome { from: current, to, event, actions })
}

#[cfg(test)]
mod tests {
    use super::{transition, DeviationAction, DeviationEvent};
    use crate::domain::deviation::{DeviationId, DeviationStatus};
    use crate::errors::EngineError;

    #[test]
    fn pending_deviation_can_be_approved_or_rejected() {
        let id = DeviationId::new("DEV-1");

        let approved = transition(&id, DeviationStatus::Pending, DeviationEvent::Approve)
            .expect("pending -> approved");
        assert_eq!(approved.to, DeviationStatus::Approved);
        assert!(approved.actions.contains(&DeviationAction::ApplyProposedTagging));

        let rejected = transition(&id, DeviationStatus::Pending, DeviationEvent::Reject)
            .expect("pending -> rejected");
        assert_eq!(rejected.to, DeviationStatus::Rejected);
        assert_eq!(rejected.actions, vec![DeviationAction::RestoreCaseEligibility]);
    }

    #[test]
    fn terminal_states_reject_every_event() {
        let id = DeviationId::new("DEV-2");
        for status in [DeviationStatus::Approved, DeviationStatus::Rejected] {
            for event in [DeviationEvent::Approve, DeviationEvent::Reject] {
                let error = transition(&id, status, event).expect_err("terminal state is final");
                assert_eq!(
                    error,
                    EngineError::InvalidTransition { deviation_id: "DEV-2".to_owned(), status }
                );
            }
        }
    }
}
