//! Workflow: the progress of one purchase attempt.
//!
//! Pipeline fields are populated strictly in order and never reset; the
//! current [`Stage`] is derived from the highest populated field. Each tick
//! issues the request for the first unmet step, unless a request is already
//! in flight. Replies come back through [`Workflow::on_response`].

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::step::{Stage, Step};
use super::Callback;
use crate::config::PurchaseConfig;
use crate::correlation::{CorrelationError, RequestCorrelator};
use crate::strategy::AcceptancePolicy;
use crate::transport::{CorrelationToken, InboundMessage, Outbox, ResponseBody, ResponseKind, TransportError};
use crate::types::{
    format_eth, strip_hex_prefix, RawTransaction, SaleDetails, SaleId, SignedTransaction, TxReceipt,
};

// ---------------------------------------------------------------------------
// Outcomes and errors
// ---------------------------------------------------------------------------

/// What a tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// A request was handed to the transport.
    Issued {
        workflow_id: u64,
        step: Step,
        token: CorrelationToken,
    },
    /// A request is already in flight; nothing issued.
    AwaitingResponse { workflow_id: u64, step: Step },
    /// The transport refused the request. Retried next tick.
    Abandoned {
        workflow_id: u64,
        step: Step,
        error: TransportError,
    },
    /// The workflow is done and waiting to expire.
    Finished { workflow_id: u64 },
}

/// What applying a reply did to the workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// A pipeline field was populated.
    Advanced(Stage),
    /// The candidate was rejected; the search cursor moved to its id.
    CandidateRejected { sale_id: SaleId },
    /// No open sale below the cursor.
    NoCandidate,
    /// The reader returned a candidate not below the cursor. Ignored.
    CursorViolation { sale_id: SaleId },
    /// The transaction is not mined yet; the receipt is polled again.
    NotYetMined,
    /// The receipt arrived; the workflow is done.
    Completed,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WorkflowError {
    #[error("workflow {workflow_id}: unexpected {kind} response for step {step}")]
    UnexpectedResponse {
        workflow_id: u64,
        step: Step,
        kind: ResponseKind,
    },

    #[error("workflow {workflow_id} is not awaiting a {step} response")]
    NotAwaiting { workflow_id: u64, step: Step },

    #[error("unknown workflow {workflow_id}")]
    UnknownWorkflow { workflow_id: u64 },

    #[error("workflow {workflow_id}: step {step} is missing {field}")]
    MissingPrerequisite {
        workflow_id: u64,
        step: Step,
        field: &'static str,
    },

    #[error(transparent)]
    Correlation(#[from] CorrelationError),
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Workflow {
    id: u64,
    timeout: Duration,
    started_at: DateTime<Utc>,
    search_cursor: Option<SaleId>,
    in_flight: Option<Step>,
    requests_issued: u32,
    rejected: Vec<SaleId>,

    selected_sale_id: Option<SaleId>,
    sale_details: Option<SaleDetails>,
    purchase_payload: Option<String>,
    multisig_tx_hash: Option<String>,
    signed_hash: Option<String>,
    raw_transaction: Option<RawTransaction>,
    signed_transaction: Option<SignedTransaction>,
    tx_id: Option<String>,
    tx_receipt: Option<TxReceipt>,
    completed_at: Option<DateTime<Utc>>,
}

impl Workflow {
    pub fn new(
        id: u64,
        timeout: Duration,
        search_cursor: Option<SaleId>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            timeout,
            started_at,
            search_cursor,
            in_flight: None,
            requests_issued: 0,
            rejected: Vec::new(),
            selected_sale_id: None,
            sale_details: None,
            purchase_payload: None,
            multisig_tx_hash: None,
            signed_hash: None,
            raw_transaction: None,
            signed_transaction: None,
            tx_id: None,
            tx_receipt: None,
            completed_at: None,
        }
    }

    // -- accessors ----------------------------------------------------------

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn search_cursor(&self) -> Option<SaleId> {
        self.search_cursor
    }

    pub fn request_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// The step whose reply is awaited, if any.
    pub fn in_flight(&self) -> Option<Step> {
        self.in_flight
    }

    pub fn requests_issued(&self) -> u32 {
        self.requests_issued
    }

    /// Candidate ids rejected by this workflow, in discovery order.
    pub fn rejected(&self) -> &[SaleId] {
        &self.rejected
    }

    pub fn selected_sale_id(&self) -> Option<SaleId> {
        self.selected_sale_id
    }

    pub fn sale_details(&self) -> Option<&SaleDetails> {
        self.sale_details.as_ref()
    }

    pub fn purchase_payload(&self) -> Option<&str> {
        self.purchase_payload.as_deref()
    }

    pub fn multisig_tx_hash(&self) -> Option<&str> {
        self.multisig_tx_hash.as_deref()
    }

    pub fn signed_hash(&self) -> Option<&str> {
        self.signed_hash.as_deref()
    }

    pub fn raw_transaction(&self) -> Option<&RawTransaction> {
        self.raw_transaction.as_ref()
    }

    pub fn signed_transaction(&self) -> Option<&SignedTransaction> {
        self.signed_transaction.as_ref()
    }

    pub fn tx_id(&self) -> Option<&str> {
        self.tx_id.as_deref()
    }

    pub fn tx_receipt(&self) -> Option<&TxReceipt> {
        self.tx_receipt.as_ref()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    // -- derived state ------------------------------------------------------

    /// Stage keyed off the highest populated pipeline field.
    pub fn stage(&self) -> Stage {
        let reached = [
            (Stage::Done, self.tx_receipt.is_some()),
            (Stage::Broadcast, self.tx_id.is_some()),
            (Stage::TxSigned, self.signed_transaction.is_some()),
            (Stage::RawTxReady, self.raw_transaction.is_some()),
            (Stage::HashSigned, self.signed_hash.is_some()),
            (Stage::HashReady, self.multisig_tx_hash.is_some()),
            (Stage::PayloadReady, self.purchase_payload.is_some()),
            (Stage::SaleSelected, self.selected_sale_id.is_some()),
        ];
        reached
            .into_iter()
            .find(|(_, populated)| *populated)
            .map(|(stage, _)| stage)
            .unwrap_or(Stage::Searching)
    }

    pub fn is_done(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Done, and `now` is past `completed_at + timeout`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.completed_at
            .is_some_and(|completed| now > completed + self.timeout)
    }

    // -- tick ---------------------------------------------------------------

    /// Issue the request for the first unmet step, unless one is in flight.
    pub fn tick(
        &mut self,
        cfg: &PurchaseConfig,
        outbox: &mut dyn Outbox,
        correlator: &mut RequestCorrelator<Callback>,
    ) -> Result<TickOutcome, WorkflowError> {
        if let Some(step) = self.in_flight {
            debug!(workflow_id = self.id, step = %step, "Request in flight, skipping tick");
            return Ok(TickOutcome::AwaitingResponse {
                workflow_id: self.id,
                step,
            });
        }

        let Some(step) = self.stage().pending_step() else {
            return Ok(TickOutcome::Finished {
                workflow_id: self.id,
            });
        };

        let request = step.build_request(self, cfg)?;
        let request_name = request.name();

        let token = match outbox.put(request) {
            Ok(token) => token,
            Err(error) => {
                warn!(
                    workflow_id = self.id,
                    step = %step,
                    error = %error,
                    "Could not issue request"
                );
                return Ok(TickOutcome::Abandoned {
                    workflow_id: self.id,
                    step,
                    error,
                });
            }
        };

        correlator.register(
            token,
            Callback::Workflow {
                workflow_id: self.id,
                step,
            },
        )?;
        self.in_flight = Some(step);
        self.requests_issued += 1;

        info!(
            workflow_id = self.id,
            step = %step,
            request = request_name,
            token = %token,
            cursor = ?self.search_cursor,
            "Issued request"
        );

        Ok(TickOutcome::Issued {
            workflow_id: self.id,
            step,
            token,
        })
    }

    // -- replies ------------------------------------------------------------

    /// Apply the reply to the request issued for `step`.
    ///
    /// The in-flight flag is cleared before the body is inspected, so a reply
    /// of the wrong shape leaves the stage unchanged and the request is
    /// re-issued on the next tick.
    pub fn on_response(
        &mut self,
        step: Step,
        message: InboundMessage,
        policy: &dyn AcceptancePolicy,
        now: DateTime<Utc>,
    ) -> Result<Transition, WorkflowError> {
        if self.in_flight != Some(step) {
            return Err(WorkflowError::NotAwaiting {
                workflow_id: self.id,
                step,
            });
        }
        self.in_flight = None;

        let kind = message.kind();
        if kind != step.expected_kind() {
            return Err(WorkflowError::UnexpectedResponse {
                workflow_id: self.id,
                step,
                kind,
            });
        }
        let advanced = Transition::Advanced(step.target_stage());
        let transition = match (step, message.body) {
            (Step::DiscoverSale, ResponseBody::ActiveSale { sale }) => {
                self.consider_candidate(sale, policy)
            }
            (Step::FetchPayload, ResponseBody::PurchasePayload { data }) => {
                info!(workflow_id = self.id, payload = %data, "Purchase payload ready");
                self.purchase_payload = Some(data);
                advanced
            }
            (Step::ComputeHash, ResponseBody::MultisigHash { tx_hash }) => {
                let hash = strip_hex_prefix(&tx_hash).to_string();
                info!(workflow_id = self.id, hash = %hash, "Multisig hash ready");
                self.multisig_tx_hash = Some(hash);
                advanced
            }
            (Step::SignHash, ResponseBody::Signature { signature }) => {
                let signature = strip_hex_prefix(&signature).to_string();
                info!(workflow_id = self.id, signature = %signature, "Multisig hash signed");
                self.signed_hash = Some(signature);
                advanced
            }
            (Step::BuildTransaction, ResponseBody::RawTransaction { raw }) => {
                info!(workflow_id = self.id, "Raw multisig transaction ready");
                self.raw_transaction = Some(raw);
                advanced
            }
            (Step::SignTransaction, ResponseBody::SignedTransaction { signed }) => {
                info!(workflow_id = self.id, "Transaction signed");
                self.signed_transaction = Some(signed);
                advanced
            }
            (Step::Broadcast, ResponseBody::TransactionDigest { tx_id }) => {
                info!(workflow_id = self.id, tx_id = %tx_id, "Transaction broadcast");
                self.tx_id = Some(tx_id);
                advanced
            }
            (Step::PollReceipt, ResponseBody::TransactionReceipt { receipt: None }) => {
                debug!(workflow_id = self.id, "Transaction not mined yet");
                Transition::NotYetMined
            }
            (Step::PollReceipt, ResponseBody::TransactionReceipt { receipt: Some(receipt) }) => {
                if !receipt.status {
                    warn!(workflow_id = self.id, receipt = %receipt, "Purchase transaction reverted");
                }
                info!(
                    workflow_id = self.id,
                    receipt = %receipt,
                    "Transaction settled, workflow complete"
                );
                self.tx_receipt = Some(receipt);
                self.completed_at = Some(now);
                Transition::Completed
            }
            (step, _) => {
                return Err(WorkflowError::UnexpectedResponse {
                    workflow_id: self.id,
                    step,
                    kind,
                })
            }
        };
        Ok(transition)
    }

    fn consider_candidate(
        &mut self,
        sale: Option<SaleDetails>,
        policy: &dyn AcceptancePolicy,
    ) -> Transition {
        let Some(sale) = sale else {
            debug!(workflow_id = self.id, cursor = ?self.search_cursor, "No active sale below cursor");
            return Transition::NoCandidate;
        };

        if self.search_cursor.is_some_and(|cursor| sale.sale_id >= cursor) {
            warn!(
                workflow_id = self.id,
                sale_id = sale.sale_id,
                cursor = ?self.search_cursor,
                "Reader returned a sale not below the cursor; ignoring"
            );
            return Transition::CursorViolation {
                sale_id: sale.sale_id,
            };
        }

        if !sale.is_open() {
            info!(
                workflow_id = self.id,
                sale = %sale,
                active = sale.is_active,
                paused = sale.is_paused,
                "Skipping closed sale"
            );
            return self.reject(sale.sale_id);
        }

        if !policy.accept(&sale) {
            info!(
                workflow_id = self.id,
                sale = %sale,
                price = %format_eth(sale.price_per_unit),
                "Found unsuitable sale, continuing search"
            );
            return self.reject(sale.sale_id);
        }

        info!(workflow_id = self.id, sale = %sale, "Found suitable sale");
        self.selected_sale_id = Some(sale.sale_id);
        self.sale_details = Some(sale);
        Transition::Advanced(Step::DiscoverSale.target_stage())
    }

    fn reject(&mut self, sale_id: SaleId) -> Transition {
        self.search_cursor = Some(sale_id);
        self.rejected.push(sale_id);
        Transition::CandidateRejected { sale_id }
    }

    // -- audit --------------------------------------------------------------

    pub fn snapshot(&self, now: DateTime<Utc>) -> WorkflowSnapshot {
        WorkflowSnapshot {
            id: self.id,
            stage: self.stage(),
            request_in_flight: self.request_in_flight(),
            awaiting: self.in_flight,
            search_cursor: self.search_cursor,
            rejected_sales: self.rejected.clone(),
            requests_issued: self.requests_issued,
            sale: self.sale_details.clone(),
            tx_id: self.tx_id.clone(),
            receipt: self.tx_receipt.clone(),
            started_at: self.started_at,
            completed_at: self.completed_at,
            expired: self.is_expired(now),
        }
    }
}

/// Serializable view of a workflow for the audit dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowSnapshot {
    pub id: u64,
    pub stage: Stage,
    pub request_in_flight: bool,
    pub awaiting: Option<Step>,
    pub search_cursor: Option<SaleId>,
    pub rejected_sales: Vec<SaleId>,
    pub requests_issued: u32,
    pub sale: Option<SaleDetails>,
    pub tx_id: Option<String>,
    pub receipt: Option<TxReceipt>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub expired: bool,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
