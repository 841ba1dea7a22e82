//! Supervisor: owns the sequence of workflows.
//!
//! Exactly one workflow is active. When the active workflow has been done for
//! longer than its timeout it is retired and a successor is started that
//! inherits its search cursor. Retired workflows are kept for audit.

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use super::step::Step;
use super::workflow::{TickOutcome, Transition, Workflow, WorkflowError, WorkflowSnapshot};
use super::Callback;
use crate::config::{PurchaseConfig, MAX_WORKFLOW_TIMEOUT_SECS};
use crate::correlation::RequestCorrelator;
use crate::strategy::AcceptancePolicy;
use crate::transport::{InboundMessage, Outbox};

#[derive(Debug)]
pub struct Supervisor {
    settings: PurchaseConfig,
    policy: Box<dyn AcceptancePolicy>,
    timeout: Duration,
    active: Workflow,
    retired: Vec<Workflow>,
    next_id: u64,
}

impl Supervisor {
    pub fn new(
        settings: PurchaseConfig,
        policy: Box<dyn AcceptancePolicy>,
        now: DateTime<Utc>,
    ) -> Self {
        let timeout_secs = settings
            .workflow_timeout_seconds
            .min(MAX_WORKFLOW_TIMEOUT_SECS);
        let timeout = Duration::seconds(timeout_secs as i64);
        info!(workflow_id = 1, "Starting workflow");
        Self {
            settings,
            policy,
            timeout,
            active: Workflow::new(1, timeout, None, now),
            retired: Vec::new(),
            next_id: 2,
        }
    }

    pub fn settings(&self) -> &PurchaseConfig {
        &self.settings
    }

    pub fn active(&self) -> &Workflow {
        &self.active
    }

    /// Every workflow, oldest first. The last one is active.
    pub fn workflows(&self) -> impl Iterator<Item = &Workflow> {
        self.retired.iter().chain(std::iter::once(&self.active))
    }

    /// Retire the active workflow if it expired, then tick the active one.
    pub fn tick(
        &mut self,
        now: DateTime<Utc>,
        outbox: &mut dyn Outbox,
        correlator: &mut RequestCorrelator<Callback>,
    ) -> Result<TickOutcome, WorkflowError> {
        if self.active.is_expired(now) {
            self.start_successor(now);
        }
        self.active.tick(&self.settings, outbox, correlator)
    }

    /// Route a reply to the workflow that issued it. Replies for retired
    /// workflows are refused.
    pub fn on_response(
        &mut self,
        workflow_id: u64,
        step: Step,
        message: InboundMessage,
        now: DateTime<Utc>,
    ) -> Result<Transition, WorkflowError> {
        if workflow_id != self.active.id() {
            return Err(WorkflowError::UnknownWorkflow { workflow_id });
        }
        self.active
            .on_response(step, message, self.policy.as_ref(), now)
    }

    pub fn snapshots(&self, now: DateTime<Utc>) -> Vec<WorkflowSnapshot> {
        self.workflows().map(|wf| wf.snapshot(now)).collect()
    }

    fn start_successor(&mut self, now: DateTime<Utc>) {
        let id = self.next_id;
        self.next_id += 1;
        let successor = Workflow::new(id, self.timeout, self.active.search_cursor(), now);
        let retired = std::mem::replace(&mut self.active, successor);
        info!(
            retired_id = retired.id(),
            workflow_id = id,
            cursor = ?self.active.search_cursor(),
            "Workflow expired, starting successor"
        );
        self.retired.push(retired);
    }
}
