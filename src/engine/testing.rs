//! Synchronous test doubles for the engine.

use std::collections::HashSet;

use crate::config::PurchaseConfig;
use crate::transport::{
    CorrelationToken, InboundMessage, OutboundRequest, Outbox, TokenSource, TransportError,
};

pub(crate) fn purchase_config() -> PurchaseConfig {
    PurchaseConfig {
        price_ceiling: 1_000_000,
        workflow_timeout_seconds: 30,
        target_sale_contract_address: "0xsale".into(),
        purchase_contract_address: "0xpurchase".into(),
        multisig_contract_address: "0xsafe".into(),
        tx_gas_limit: 4_000_000,
        signer_address: "0xowner".into(),
        artist_allow_list: Vec::new(),
    }
}

/// Records every request and hands out fresh tokens. Tokens stay open until
/// a reply carrying them is extracted.
#[derive(Debug, Default)]
pub(crate) struct RecordingOutbox {
    pub sent: Vec<(CorrelationToken, OutboundRequest)>,
    pub open: HashSet<CorrelationToken>,
    /// When set, every `put` fails with this error.
    pub refuse: Option<TransportError>,
}

impl RecordingOutbox {
    pub fn last_token(&self) -> CorrelationToken {
        self.sent.last().map(|(t, _)| *t).expect("nothing sent")
    }
}

impl Outbox for RecordingOutbox {
    fn put(&mut self, request: OutboundRequest) -> Result<CorrelationToken, TransportError> {
        if let Some(err) = &self.refuse {
            return Err(err.clone());
        }
        let token = CorrelationToken::new();
        self.open.insert(token);
        self.sent.push((token, request));
        Ok(token)
    }
}

impl TokenSource for RecordingOutbox {
    fn extract_token(&mut self, message: &InboundMessage) -> Option<CorrelationToken> {
        let token = message.dialogue_reference?;
        self.open.remove(&token).then_some(token)
    }
}
