//! Pipeline stages and the transition table.
//!
//! A workflow's stage is exactly "which prefix of pipeline fields is
//! populated". Each non-terminal stage has one step: the request that
//! populates the next field.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use super::workflow::{Workflow, WorkflowError};
use crate::config::PurchaseConfig;
use crate::transport::{OutboundRequest, ResponseKind};
use crate::types::{MultisigCall, SigningMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Searching,
    SaleSelected,
    PayloadReady,
    HashReady,
    HashSigned,
    RawTxReady,
    TxSigned,
    Broadcast,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Searching => "SEARCHING",
            Stage::SaleSelected => "SALE_SELECTED",
            Stage::PayloadReady => "PAYLOAD_READY",
            Stage::HashReady => "HASH_READY",
            Stage::HashSigned => "HASH_SIGNED",
            Stage::RawTxReady => "RAW_TX_READY",
            Stage::TxSigned => "TX_SIGNED",
            Stage::Broadcast => "BROADCAST",
            Stage::Done => "DONE",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    DiscoverSale,
    FetchPayload,
    ComputeHash,
    SignHash,
    BuildTransaction,
    SignTransaction,
    Broadcast,
    PollReceipt,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::DiscoverSale => "discover_sale",
            Step::FetchPayload => "fetch_payload",
            Step::ComputeHash => "compute_hash",
            Step::SignHash => "sign_hash",
            Step::BuildTransaction => "build_transaction",
            Step::SignTransaction => "sign_transaction",
            Step::Broadcast => "broadcast",
            Step::PollReceipt => "poll_receipt",
        };
        write!(f, "{name}")
    }
}

/// (from stage, step issued, reply kind it expects, stage once populated)
const TRANSITIONS: [(Stage, Step, ResponseKind, Stage); 8] = [
    (Stage::Searching, Step::DiscoverSale, ResponseKind::State, Stage::SaleSelected),
    (Stage::SaleSelected, Step::FetchPayload, ResponseKind::State, Stage::PayloadReady),
    (Stage::PayloadReady, Step::ComputeHash, ResponseKind::State, Stage::HashReady),
    (Stage::HashReady, Step::SignHash, ResponseKind::SignedMessage, Stage::HashSigned),
    (Stage::HashSigned, Step::BuildTransaction, ResponseKind::RawTransaction, Stage::RawTxReady),
    (Stage::RawTxReady, Step::SignTransaction, ResponseKind::SignedTransaction, Stage::TxSigned),
    (Stage::TxSigned, Step::Broadcast, ResponseKind::TransactionDigest, Stage::Broadcast),
    (Stage::Broadcast, Step::PollReceipt, ResponseKind::TransactionReceipt, Stage::Done),
];

impl Stage {
    /// The step that moves a workflow out of this stage. `None` once done.
    pub fn pending_step(self) -> Option<Step> {
        TRANSITIONS
            .iter()
            .find(|(from, ..)| *from == self)
            .map(|(_, step, ..)| *step)
    }
}

impl Step {
    /// Every step, in issue order.
    pub const PIPELINE: [Step; 8] = [
        Step::DiscoverSale,
        Step::FetchPayload,
        Step::ComputeHash,
        Step::SignHash,
        Step::BuildTransaction,
        Step::SignTransaction,
        Step::Broadcast,
        Step::PollReceipt,
    ];

    fn row(self) -> (Stage, Step, ResponseKind, Stage) {
        TRANSITIONS[self as usize]
    }

    /// The reply kind this step's callback can apply.
    pub fn expected_kind(self) -> ResponseKind {
        self.row().2
    }

    /// The stage reached once this step's field is populated.
    pub fn target_stage(self) -> Stage {
        self.row().3
    }

    /// Build the outbound request for this step from the workflow's
    /// populated fields.
    pub fn build_request(
        self,
        workflow: &Workflow,
        cfg: &PurchaseConfig,
    ) -> Result<OutboundRequest, WorkflowError> {
        let missing = |field: &'static str| WorkflowError::MissingPrerequisite {
            workflow_id: workflow.id(),
            step: self,
            field,
        };

        let request = match self {
            Step::DiscoverSale => OutboundRequest::ActiveSale {
                contract: cfg.target_sale_contract_address.clone(),
                below_id: workflow.search_cursor(),
            },
            Step::FetchPayload => OutboundRequest::PurchasePayload {
                contract: cfg.purchase_contract_address.clone(),
                sale_id: workflow
                    .selected_sale_id()
                    .ok_or_else(|| missing("selected_sale_id"))?,
            },
            Step::ComputeHash => OutboundRequest::MultisigHash {
                multisig: cfg.multisig_contract_address.clone(),
                call: purchase_call(self, workflow, cfg)?,
            },
            Step::SignHash => OutboundRequest::SignMessage {
                message: workflow
                    .multisig_tx_hash()
                    .ok_or_else(|| missing("multisig_tx_hash"))?
                    .to_string(),
                mode: SigningMode::Deprecated,
            },
            Step::BuildTransaction => {
                let signature = workflow
                    .signed_hash()
                    .ok_or_else(|| missing("signed_hash"))?;
                let mut signatures = BTreeMap::new();
                signatures.insert(cfg.signer_address.clone(), signature.to_string());
                OutboundRequest::BuildMultisigTransaction {
                    multisig: cfg.multisig_contract_address.clone(),
                    sender: cfg.signer_address.clone(),
                    call: purchase_call(self, workflow, cfg)?,
                    signatures,
                }
            }
            Step::SignTransaction => OutboundRequest::SignTransaction {
                raw: workflow
                    .raw_transaction()
                    .ok_or_else(|| missing("raw_transaction"))?
                    .clone(),
            },
            Step::Broadcast => OutboundRequest::Broadcast {
                signed: workflow
                    .signed_transaction()
                    .ok_or_else(|| missing("signed_transaction"))?
                    .clone(),
            },
            Step::PollReceipt => OutboundRequest::Receipt {
                tx_id: workflow.tx_id().ok_or_else(|| missing("tx_id"))?.to_string(),
            },
        };
        Ok(request)
    }
}

/// The purchase call the multisig executes: pay the sale price to the
/// purchase contract with the fetched calldata.
fn purchase_call(
    step: Step,
    workflow: &Workflow,
    cfg: &PurchaseConfig,
) -> Result<MultisigCall, WorkflowError> {
    let missing = |field: &'static str| WorkflowError::MissingPrerequisite {
        workflow_id: workflow.id(),
        step,
        field,
    };
    let sale = workflow.sale_details().ok_or_else(|| missing("sale_details"))?;
    let data = workflow
        .purchase_payload()
        .ok_or_else(|| missing("purchase_payload"))?;
    Ok(MultisigCall {
        to: cfg.purchase_contract_address.clone(),
        value: sale.price_per_unit,
        data: data.to_string(),
        safe_tx_gas: cfg.tx_gas_limit,
    })
}
