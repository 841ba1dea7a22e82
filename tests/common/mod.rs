//! In-memory transport for integration testing.
//!
//! Provides a deterministic `Outbox` + `TokenSource` that records every
//! request and lets the test answer them explicitly. No tasks, no network.

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use mintwatch::config::PurchaseConfig;
use mintwatch::correlation::DispatchOutcome;
use mintwatch::engine::{Agent, Supervisor};
use mintwatch::strategy::PriceCeiling;
use mintwatch::transport::{
    CorrelationToken, InboundMessage, OutboundRequest, Outbox, Protocol, ResponseBody,
    TokenSource, TransportError,
};
use mintwatch::types::{
    RawTransaction, SaleDetails, SaleId, SaleMetadata, SignedTransaction, TxReceipt, Wei,
};

/// Records requests and tracks open dialogues like the real transport.
#[derive(Debug, Default)]
pub struct LoopbackTransport {
    pub sent: Vec<(CorrelationToken, OutboundRequest)>,
    open: HashSet<CorrelationToken>,
    /// Protocols with no dialogue registry.
    pub missing: HashSet<Protocol>,
}

impl LoopbackTransport {
    pub fn last(&self) -> &(CorrelationToken, OutboundRequest) {
        self.sent.last().expect("no request sent")
    }

    /// Open a dialogue the agent never issued, so no callback exists for it.
    pub fn open_foreign_dialogue(&mut self) -> CorrelationToken {
        let token = CorrelationToken::new();
        self.open.insert(token);
        token
    }

    pub fn request_names(&self) -> Vec<&'static str> {
        self.sent.iter().map(|(_, r)| r.name()).collect()
    }
}

impl Outbox for LoopbackTransport {
    fn put(&mut self, request: OutboundRequest) -> Result<CorrelationToken, TransportError> {
        let protocol = request.protocol();
        if self.missing.contains(&protocol) {
            return Err(TransportError::MissingContext(protocol));
        }
        let token = CorrelationToken::new();
        self.open.insert(token);
        self.sent.push((token, request));
        Ok(token)
    }
}

impl TokenSource for LoopbackTransport {
    fn extract_token(&mut self, message: &InboundMessage) -> Option<CorrelationToken> {
        let token = message.dialogue_reference?;
        self.open.remove(&token).then_some(token)
    }
}

pub fn t0() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

pub fn purchase_config(price_ceiling: Wei) -> PurchaseConfig {
    PurchaseConfig {
        price_ceiling,
        workflow_timeout_seconds: 30,
        target_sale_contract_address: "0xsale".into(),
        purchase_contract_address: "0xpurchase".into(),
        multisig_contract_address: "0xsafe".into(),
        tx_gas_limit: 4_000_000,
        signer_address: "0xowner".into(),
        artist_allow_list: Vec::new(),
    }
}

pub fn agent(price_ceiling: Wei) -> Agent<LoopbackTransport> {
    let cfg = purchase_config(price_ceiling);
    let policy = Box::new(PriceCeiling::new(cfg.price_ceiling));
    Agent::new(
        Supervisor::new(cfg, policy, t0()),
        LoopbackTransport::default(),
        None,
    )
}

pub fn sale(sale_id: SaleId, price_per_unit: Wei) -> SaleDetails {
    SaleDetails {
        sale_id,
        price_per_unit,
        seller: "0x00000000000000000000000000000000000a11ce".into(),
        is_active: true,
        is_paused: false,
        metadata: SaleMetadata {
            name: format!("Release #{sale_id}"),
            artist: "test-artist".into(),
            ..SaleMetadata::default()
        },
    }
}

/// Answer the most recent request on `protocol`.
pub fn answer(
    agent: &mut Agent<LoopbackTransport>,
    protocol: Protocol,
    body: ResponseBody,
    now: DateTime<Utc>,
) -> DispatchOutcome {
    let token = agent.transport().last().0;
    agent.deliver(InboundMessage::reply(protocol, token, body), now)
}

/// The well-formed reply for each pipeline request, in order, buying `sale`.
pub fn happy_path(sale: SaleDetails) -> Vec<(Protocol, ResponseBody)> {
    vec![
        (Protocol::ContractApi, ResponseBody::ActiveSale { sale: Some(sale) }),
        (
            Protocol::ContractApi,
            ResponseBody::PurchasePayload {
                data: "0xefef39a1".into(),
            },
        ),
        (
            Protocol::ContractApi,
            ResponseBody::MultisigHash {
                tx_hash: "0x5afe".into(),
            },
        ),
        (
            Protocol::Signing,
            ResponseBody::Signature {
                signature: "0x51691b".into(),
            },
        ),
        (
            Protocol::ContractApi,
            ResponseBody::RawTransaction {
                raw: RawTransaction {
                    body: serde_json::json!({ "to": "0xsafe", "nonce": 0 }),
                },
            },
        ),
        (
            Protocol::Signing,
            ResponseBody::SignedTransaction {
                signed: SignedTransaction {
                    body: "0xf86b".into(),
                },
            },
        ),
        (
            Protocol::LedgerApi,
            ResponseBody::TransactionDigest {
                tx_id: "0xtx".into(),
            },
        ),
        (
            Protocol::LedgerApi,
            ResponseBody::TransactionReceipt {
                receipt: Some(TxReceipt {
                    tx_id: "0xtx".into(),
                    block_number: 1_000_042,
                    status: true,
                    gas_used: 180_000,
                }),
            },
        ),
    ]
}
