//! Core engine: the purchase workflow, its step table, and the supervisor
//! that keeps exactly one workflow active.

pub mod agent;
pub mod step;
pub mod supervisor;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;

pub use agent::{Agent, AgentSnapshot};
pub use step::{Stage, Step};
pub use supervisor::Supervisor;
pub use workflow::{TickOutcome, Transition, Workflow, WorkflowError, WorkflowSnapshot};

/// What a reply resumes once the dispatcher has matched it to its request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Callback {
    /// Apply the reply to `step` of the given workflow.
    Workflow { workflow_id: u64, step: Step },
    /// Log the status of a completion notification.
    Notification { workflow_id: u64 },
}
