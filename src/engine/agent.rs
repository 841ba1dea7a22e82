//! Agent: the driver-facing core.
//!
//! Bundles the supervisor with the request correlator, one response
//! dispatcher per protocol family and the transport. The driver loop calls
//! [`Agent::tick`] on its interval and [`Agent::deliver`] for every inbound
//! message; both run on the driver task, so callbacks never race the tick.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

use super::step::Stage;
use super::supervisor::Supervisor;
use super::workflow::{TickOutcome, Transition, Workflow, WorkflowError, WorkflowSnapshot};
use super::Callback;
use crate::correlation::{DispatchOutcome, DispatchStats, RequestCorrelator, ResponseDispatcher};
use crate::transport::{InboundMessage, OutboundRequest, Outbox, Protocol, ResponseBody, TokenSource};
use crate::types::PurchaseSummary;

/// One dispatcher per protocol family, addressable without a lookup miss.
#[derive(Debug, Clone)]
struct Dispatchers {
    contract_api: ResponseDispatcher,
    signing: ResponseDispatcher,
    ledger_api: ResponseDispatcher,
    http: ResponseDispatcher,
}

impl Dispatchers {
    fn standard() -> Self {
        Self {
            contract_api: ResponseDispatcher::contract_api(),
            signing: ResponseDispatcher::signing(),
            ledger_api: ResponseDispatcher::ledger_api(),
            http: ResponseDispatcher::http(),
        }
    }

    fn for_protocol(&mut self, protocol: Protocol) -> &mut ResponseDispatcher {
        match protocol {
            Protocol::ContractApi => &mut self.contract_api,
            Protocol::Signing => &mut self.signing,
            Protocol::LedgerApi => &mut self.ledger_api,
            Protocol::Http => &mut self.http,
        }
    }

    fn stats(&self) -> BTreeMap<Protocol, DispatchStats> {
        [&self.contract_api, &self.signing, &self.ledger_api, &self.http]
            .into_iter()
            .map(|d| (d.protocol(), d.stats()))
            .collect()
    }
}

pub struct Agent<T> {
    supervisor: Supervisor,
    correlator: RequestCorrelator<Callback>,
    dispatchers: Dispatchers,
    transport: T,
    webhook_url: Option<String>,
    notifications_sent: u64,
}

impl<T: Outbox + TokenSource> Agent<T> {
    pub fn new(supervisor: Supervisor, transport: T, webhook_url: Option<String>) -> Self {
        Self {
            supervisor,
            correlator: RequestCorrelator::new(),
            dispatchers: Dispatchers::standard(),
            transport,
            webhook_url,
            notifications_sent: 0,
        }
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Requests awaiting a reply, workflow steps and notifications alike.
    pub fn pending_requests(&self) -> usize {
        self.correlator.pending()
    }

    /// One scheduler tick.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Result<TickOutcome, WorkflowError> {
        self.supervisor
            .tick(now, &mut self.transport, &mut self.correlator)
    }

    /// Route an inbound message through its protocol's dispatcher and run
    /// the callback it resolves to. Callback failures are logged, never
    /// returned.
    pub fn deliver(&mut self, message: InboundMessage, now: DateTime<Utc>) -> DispatchOutcome {
        let supervisor = &mut self.supervisor;
        let mut completed = None;

        let dispatcher = self.dispatchers.for_protocol(message.protocol);
        let outcome = dispatcher.dispatch(
            message,
            &mut self.transport,
            &mut self.correlator,
            |callback, message| match callback {
                Callback::Workflow { workflow_id, step } => {
                    match supervisor.on_response(workflow_id, step, message, now) {
                        Ok(Transition::Completed) => completed = Some(workflow_id),
                        Ok(transition) => {
                            debug!(workflow_id, step = %step, transition = ?transition, "Applied response")
                        }
                        Err(e) => warn!(workflow_id, step = %step, error = %e, "Callback failed"),
                    }
                }
                Callback::Notification { workflow_id } => log_notification(workflow_id, message),
            },
        );

        if completed.is_some() {
            self.notify_completion();
        }
        outcome
    }

    /// POST a summary of the just-completed active workflow to the webhook.
    fn notify_completion(&mut self) {
        let Some(url) = self.webhook_url.clone() else {
            return;
        };
        let workflow = self.supervisor.active();
        let workflow_id = workflow.id();
        let body = match serde_json::to_value(summary(workflow)) {
            Ok(body) => body,
            Err(e) => {
                error!(workflow_id, error = %e, "Could not encode completion summary");
                return;
            }
        };

        match self.transport.put(OutboundRequest::Http { url, body }) {
            Ok(token) => {
                if let Err(e) = self
                    .correlator
                    .register(token, Callback::Notification { workflow_id })
                {
                    warn!(workflow_id, error = %e, "Could not register notification");
                    return;
                }
                self.notifications_sent += 1;
                info!(workflow_id, token = %token, "Completion notification sent");
            }
            Err(e) => warn!(workflow_id, error = %e, "Could not send completion notification"),
        }
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> AgentSnapshot {
        AgentSnapshot {
            taken_at: now,
            active_workflow_id: self.supervisor.active().id(),
            active_stage: self.supervisor.active().stage(),
            pending_requests: self.correlator.pending(),
            notifications_sent: self.notifications_sent,
            dispatch: self.dispatchers.stats(),
            workflows: self.supervisor.snapshots(now),
        }
    }
}

fn summary(workflow: &Workflow) -> PurchaseSummary {
    PurchaseSummary {
        workflow_id: workflow.id(),
        sale_id: workflow.selected_sale_id(),
        price_per_unit: workflow.sale_details().map(|s| s.price_per_unit),
        tx_id: workflow.tx_id().map(str::to_string),
        block_number: workflow.tx_receipt().map(|r| r.block_number),
        completed_at: workflow.completed_at(),
    }
}

fn log_notification(workflow_id: u64, message: InboundMessage) {
    match message.body {
        ResponseBody::Http { status, .. } if (200..300).contains(&status) => {
            info!(workflow_id, status, "Completion webhook acknowledged")
        }
        ResponseBody::Http { status, body } => {
            warn!(workflow_id, status, body = %body, "Completion webhook rejected")
        }
        other => warn!(workflow_id, kind = %other.kind(), "Unexpected webhook response"),
    }
}

/// Point-in-time view of the agent for the audit dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct AgentSnapshot {
    pub taken_at: DateTime<Utc>,
    pub active_workflow_id: u64,
    pub active_stage: Stage,
    pub pending_requests: usize,
    pub notifications_sent: u64,
    pub dispatch: BTreeMap<Protocol, DispatchStats>,
    pub workflows: Vec<WorkflowSnapshot>,
}

impl AgentSnapshot {
    /// Placeholder published before the first tick.
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            taken_at: now,
            active_workflow_id: 0,
            active_stage: Stage::Searching,
            pending_requests: 0,
            notifications_sent: 0,
            dispatch: BTreeMap::new(),
            workflows: Vec::new(),
        }
    }

    pub fn active(&self) -> Option<&WorkflowSnapshot> {
        self.workflows
            .iter()
            .find(|wf| wf.id == self.active_workflow_id)
    }

    /// Total dropped messages across all protocols.
    pub fn dropped(&self) -> u64 {
        self.dispatch.values().map(DispatchStats::dropped).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::DropReason;
    use crate::engine::step::Step;
    use crate::engine::testing::{purchase_config, RecordingOutbox};
    use crate::strategy::PriceCeiling;
    use crate::transport::CorrelationToken;
    use crate::types::{RawTransaction, SaleDetails, SignedTransaction, TxReceipt, Wei};

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn agent(webhook: Option<&str>) -> Agent<RecordingOutbox> {
        agent_with_ceiling(1_000_000, webhook)
    }

    fn agent_with_ceiling(ceiling: Wei, webhook: Option<&str>) -> Agent<RecordingOutbox> {
        let sup = Supervisor::new(purchase_config(), Box::new(PriceCeiling::new(ceiling)), t0());
        Agent::new(sup, RecordingOutbox::default(), webhook.map(str::to_string))
    }

    fn answer(agent: &mut Agent<RecordingOutbox>, protocol: Protocol, body: ResponseBody) -> DispatchOutcome {
        let token = agent.transport().last_token();
        agent.deliver(InboundMessage::reply(protocol, token, body), t0())
    }

    fn run_to_done(agent: &mut Agent<RecordingOutbox>) {
        run_sale_to_done(agent, SaleDetails::sample(3, 10));
    }

    fn run_sale_to_done(agent: &mut Agent<RecordingOutbox>, sale: SaleDetails) {
        let replies = [
            (Protocol::ContractApi, ResponseBody::ActiveSale { sale: Some(sale) }),
            (Protocol::ContractApi, ResponseBody::PurchasePayload { data: "0x01".into() }),
            (Protocol::ContractApi, ResponseBody::MultisigHash { tx_hash: "0x02".into() }),
            (Protocol::Signing, ResponseBody::Signature { signature: "0x03".into() }),
            (Protocol::ContractApi, ResponseBody::RawTransaction { raw: RawTransaction { body: serde_json::json!({}) } }),
            (Protocol::Signing, ResponseBody::SignedTransaction { signed: SignedTransaction { body: "0x04".into() } }),
            (Protocol::LedgerApi, ResponseBody::TransactionDigest { tx_id: "0x05".into() }),
            (
                Protocol::LedgerApi,
                ResponseBody::TransactionReceipt {
                    receipt: Some(TxReceipt { tx_id: "0x05".into(), block_number: 77, status: true, gas_used: 0 }),
                },
            ),
        ];
        for (protocol, body) in replies {
            agent.tick(t0()).unwrap();
            assert!(matches!(answer(agent, protocol, body), DispatchOutcome::Delivered(_)));
        }
    }

    #[test]
    fn test_full_pipeline_reaches_done() {
        let mut agent = agent(None);
        run_to_done(&mut agent);
        assert_eq!(agent.supervisor().active().stage(), Stage::Done);
        assert_eq!(agent.transport().sent.len(), 8);
        assert_eq!(agent.pending_requests(), 0);
    }

    #[test]
    fn test_completion_sends_webhook() {
        let mut agent = agent(Some("http://hooks.local/done"));
        run_to_done(&mut agent);

        assert_eq!(agent.transport().sent.len(), 9);
        let (_, request) = agent.transport().sent.last().unwrap();
        match request {
            OutboundRequest::Http { url, body } => {
                assert_eq!(url, "http://hooks.local/done");
                assert_eq!(body["workflow_id"], 1);
                assert_eq!(body["block_number"], 77);
            }
            other => panic!("expected webhook, got {other:?}"),
        }
        assert_eq!(agent.pending_requests(), 1);

        let outcome = answer(&mut agent, Protocol::Http, ResponseBody::Http { status: 204, body: String::new() });
        assert!(matches!(outcome, DispatchOutcome::Delivered(_)));
        assert_eq!(agent.pending_requests(), 0);
        // The webhook does not count as a workflow request.
        assert_eq!(agent.supervisor().active().requests_issued(), 8);
    }

    #[test]
    fn test_failed_webhook_releases_callback() {
        let mut agent = agent(Some("http://hooks.local/done"));
        run_to_done(&mut agent);
        assert_eq!(agent.pending_requests(), 1);

        let outcome = answer(
            &mut agent,
            Protocol::Http,
            ResponseBody::Error { message: "connection refused".into() },
        );
        assert!(matches!(outcome, DispatchOutcome::Delivered(_)));
        assert_eq!(agent.pending_requests(), 0);
        assert_eq!(agent.snapshot(t0()).dropped(), 0);
    }

    #[test]
    fn test_webhook_sent_for_price_above_u64() {
        let price: Wei = 20_000_000_000_000_000_000;
        let mut agent = agent_with_ceiling(price, Some("http://hooks.local/done"));
        run_sale_to_done(&mut agent, SaleDetails::sample(3, price));

        assert_eq!(agent.transport().sent.len(), 9);
        match &agent.transport().sent[8].1 {
            OutboundRequest::Http { body, .. } => {
                assert_eq!(body["price_per_unit"], "20000000000000000000");
                assert_eq!(body["sale_id"], 3);
            }
            other => panic!("expected webhook, got {other:?}"),
        }
        assert_eq!(agent.snapshot(t0()).notifications_sent, 1);
    }

    #[test]
    fn test_wrong_protocol_dispatcher_drops_kind() {
        let mut agent = agent(None);
        agent.tick(t0()).unwrap();
        // A contract-api state reply arriving on the signing channel.
        let outcome = answer(&mut agent, Protocol::Signing, ResponseBody::ActiveSale { sale: None });
        assert_eq!(outcome, DispatchOutcome::Dropped(DropReason::UnallowedKind));
        assert!(agent.supervisor().active().request_in_flight());
    }

    #[test]
    fn test_unknown_token_dropped() {
        let mut agent = agent(None);
        agent.tick(t0()).unwrap();
        let stray = InboundMessage::reply(
            Protocol::ContractApi,
            CorrelationToken::new(),
            ResponseBody::ActiveSale { sale: None },
        );
        assert_eq!(
            agent.deliver(stray, t0()),
            DispatchOutcome::Dropped(DropReason::UnidentifiedDialogue)
        );
        assert_eq!(agent.pending_requests(), 1);
        assert_eq!(agent.supervisor().active().in_flight(), Some(Step::DiscoverSale));
    }

    #[test]
    fn test_snapshot_counts_drops() {
        let mut agent = agent(None);
        agent.tick(t0()).unwrap();
        answer(&mut agent, Protocol::ContractApi, ResponseBody::Error { message: "rpc down".into() });

        let snap = agent.snapshot(t0());
        assert_eq!(snap.active_workflow_id, 1);
        assert_eq!(snap.active_stage, Stage::Searching);
        assert_eq!(snap.pending_requests, 1);
        assert_eq!(snap.dropped(), 1);
        assert_eq!(snap.dispatch[&Protocol::ContractApi].unallowed_kind, 1);
        assert_eq!(snap.active().map(|wf| wf.id), Some(1));
    }
}
