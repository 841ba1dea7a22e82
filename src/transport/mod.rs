//! Correlated request/response transport.
//!
//! Outbound requests leave through an [`Outbox`]; each one opens a dialogue
//! identified by a fresh [`CorrelationToken`]. Replies come back as
//! [`InboundMessage`]s carrying the dialogue reference, which a
//! [`TokenSource`] turns back into the token the request was issued under.

pub mod dialogue;
pub mod runtime;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::types::{
    MultisigCall, RawTransaction, SaleDetails, SaleId, SignedTransaction, SigningMode, TxReceipt,
};

// ---------------------------------------------------------------------------
// Correlation token
// ---------------------------------------------------------------------------

/// Opaque identifier binding a request to its eventual response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CorrelationToken(Uuid);

impl CorrelationToken {
    /// Allocate a fresh random token.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

// ---------------------------------------------------------------------------
// Protocols and response kinds
// ---------------------------------------------------------------------------

/// Protocol family a request travels over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// Contract calls against the chain (reads, hashes, raw tx assembly).
    ContractApi,
    /// Message and transaction signing.
    Signing,
    /// Transaction submission and receipts.
    LedgerApi,
    /// Plain HTTP.
    Http,
}

impl Protocol {
    pub const ALL: &'static [Protocol] = &[
        Protocol::ContractApi,
        Protocol::Signing,
        Protocol::LedgerApi,
        Protocol::Http,
    ];
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::ContractApi => write!(f, "contract_api"),
            Protocol::Signing => write!(f, "signing"),
            Protocol::LedgerApi => write!(f, "ledger_api"),
            Protocol::Http => write!(f, "http"),
        }
    }
}

/// The performative of a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    State,
    RawTransaction,
    SignedMessage,
    SignedTransaction,
    TransactionDigest,
    TransactionReceipt,
    HttpResponse,
    Error,
}

impl fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResponseKind::State => "state",
            ResponseKind::RawTransaction => "raw_transaction",
            ResponseKind::SignedMessage => "signed_message",
            ResponseKind::SignedTransaction => "signed_transaction",
            ResponseKind::TransactionDigest => "transaction_digest",
            ResponseKind::TransactionReceipt => "transaction_receipt",
            ResponseKind::HttpResponse => "http_response",
            ResponseKind::Error => "error",
        };
        write!(f, "{name}")
    }
}

// ---------------------------------------------------------------------------
// Outbound requests
// ---------------------------------------------------------------------------

/// A request the core asks the transport to carry out.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "request", rename_all = "snake_case")]
pub enum OutboundRequest {
    /// Most recent open sale strictly below `below_id` (or the newest one).
    ActiveSale {
        contract: String,
        below_id: Option<SaleId>,
    },
    /// Calldata for buying one unit of `sale_id`.
    PurchasePayload { contract: String, sale_id: SaleId },
    /// Hash the multisig owners must sign to approve `call`.
    MultisigHash { multisig: String, call: MultisigCall },
    /// Sign an arbitrary hex message.
    SignMessage { message: String, mode: SigningMode },
    /// Assemble the multisig `execTransaction` for `call` with the collected
    /// owner signatures.
    BuildMultisigTransaction {
        multisig: String,
        sender: String,
        call: MultisigCall,
        signatures: BTreeMap<String, String>,
    },
    SignTransaction { raw: RawTransaction },
    Broadcast { signed: SignedTransaction },
    Receipt { tx_id: String },
    /// POST a JSON body to `url`.
    Http { url: String, body: serde_json::Value },
}

impl OutboundRequest {
    /// The protocol family this request travels over.
    pub fn protocol(&self) -> Protocol {
        match self {
            OutboundRequest::ActiveSale { .. }
            | OutboundRequest::PurchasePayload { .. }
            | OutboundRequest::MultisigHash { .. }
            | OutboundRequest::BuildMultisigTransaction { .. } => Protocol::ContractApi,
            OutboundRequest::SignMessage { .. } | OutboundRequest::SignTransaction { .. } => {
                Protocol::Signing
            }
            OutboundRequest::Broadcast { .. } | OutboundRequest::Receipt { .. } => {
                Protocol::LedgerApi
            }
            OutboundRequest::Http { .. } => Protocol::Http,
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            OutboundRequest::ActiveSale { .. } => "active_sale",
            OutboundRequest::PurchasePayload { .. } => "purchase_payload",
            OutboundRequest::MultisigHash { .. } => "multisig_hash",
            OutboundRequest::SignMessage { .. } => "sign_message",
            OutboundRequest::BuildMultisigTransaction { .. } => "build_multisig_transaction",
            OutboundRequest::SignTransaction { .. } => "sign_transaction",
            OutboundRequest::Broadcast { .. } => "broadcast",
            OutboundRequest::Receipt { .. } => "receipt",
            OutboundRequest::Http { .. } => "http",
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound messages
// ---------------------------------------------------------------------------

/// Payload of a reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseBody {
    /// `None` when no open sale exists below the requested id.
    ActiveSale { sale: Option<SaleDetails> },
    PurchasePayload { data: String },
    MultisigHash { tx_hash: String },
    Signature { signature: String },
    RawTransaction { raw: RawTransaction },
    SignedTransaction { signed: SignedTransaction },
    TransactionDigest { tx_id: String },
    /// `None` while the transaction is not yet mined.
    TransactionReceipt { receipt: Option<TxReceipt> },
    Http { status: u16, body: String },
    Error { message: String },
}

impl ResponseBody {
    pub fn kind(&self) -> ResponseKind {
        match self {
            ResponseBody::ActiveSale { .. }
            | ResponseBody::PurchasePayload { .. }
            | ResponseBody::MultisigHash { .. } => ResponseKind::State,
            ResponseBody::Signature { .. } => ResponseKind::SignedMessage,
            ResponseBody::RawTransaction { .. } => ResponseKind::RawTransaction,
            ResponseBody::SignedTransaction { .. } => ResponseKind::SignedTransaction,
            ResponseBody::TransactionDigest { .. } => ResponseKind::TransactionDigest,
            ResponseBody::TransactionReceipt { .. } => ResponseKind::TransactionReceipt,
            ResponseBody::Http { .. } => ResponseKind::HttpResponse,
            ResponseBody::Error { .. } => ResponseKind::Error,
        }
    }
}

/// A reply delivered by the transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InboundMessage {
    /// Channel the message arrived on.
    pub protocol: Protocol,
    /// Reference to the dialogue the message belongs to, if it carries one.
    pub dialogue_reference: Option<CorrelationToken>,
    pub body: ResponseBody,
}

impl InboundMessage {
    pub fn reply(protocol: Protocol, token: CorrelationToken, body: ResponseBody) -> Self {
        Self {
            protocol,
            dialogue_reference: Some(token),
            body,
        }
    }

    pub fn kind(&self) -> ResponseKind {
        self.body.kind()
    }
}

impl fmt::Display for InboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.dialogue_reference {
            Some(token) => write!(f, "{}/{} [{}]", self.protocol, self.kind(), token),
            None => write!(f, "{}/{} [no dialogue]", self.protocol, self.kind()),
        }
    }
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Transport failures surfaced to the issuer of a request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("no dialogue registry for protocol {0}")]
    MissingContext(Protocol),

    #[error("transport inbox is closed")]
    Closed,
}

/// Issues outbound requests.
pub trait Outbox {
    /// Send `request`, returning the token its reply will carry.
    fn put(&mut self, request: OutboundRequest) -> Result<CorrelationToken, TransportError>;
}

/// Recovers the correlation token of an inbound message from the
/// transport's dialogue bookkeeping.
pub trait TokenSource {
    /// `None` when the message belongs to no known dialogue.
    fn extract_token(&mut self, message: &InboundMessage) -> Option<CorrelationToken>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
