pub mod query;
pub mod states;
pub mod workflow;

pub use query::{DeviationQuery, DeviationSummary, Page};
pub use states::{transition, DeviationAction, DeviationEvent, TransitionOutcome};
pub use workflow::{
    DecisionRequest, DeviationDecision, DeviationWorkflow, RaiseDeviationRequest, RaisedDeviation,
    WorkflowPolicy,
};
