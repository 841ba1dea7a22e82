//! Tokio-backed transport.
//!
//! `put` opens a dialogue and spawns a task that runs the request against
//! the chain collaborators (or plain HTTP). The reply is posted on an
//! unbounded channel the driver loop drains; the core itself never awaits.

use anyhow::{Context, Result};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::dialogue::DialogueRegistry;
use super::{
    CorrelationToken, InboundMessage, OutboundRequest, Outbox, Protocol, ResponseBody,
    TokenSource, TransportError,
};
use crate::ledger::{ContractReader, LedgerApi, MessageSigner};

/// The collaborators requests are executed against.
#[derive(Clone)]
pub struct Collaborators {
    pub reader: Arc<dyn ContractReader>,
    pub signer: Arc<dyn MessageSigner>,
    pub ledger: Arc<dyn LedgerApi>,
    pub http: reqwest::Client,
}

impl Collaborators {
    /// Use one value for all three chain capabilities.
    pub fn from_single<C>(chain: Arc<C>, http: reqwest::Client) -> Self
    where
        C: ContractReader + MessageSigner + LedgerApi + 'static,
    {
        Self {
            reader: chain.clone(),
            signer: chain.clone(),
            ledger: chain,
            http,
        }
    }
}

pub struct Transport {
    collaborators: Collaborators,
    registries: HashMap<Protocol, DialogueRegistry>,
    inbox: mpsc::UnboundedSender<InboundMessage>,
}

impl Transport {
    /// Transport with a dialogue registry for every protocol family.
    pub fn new(collaborators: Collaborators) -> (Self, mpsc::UnboundedReceiver<InboundMessage>) {
        Self::with_protocols(collaborators, Protocol::ALL)
    }

    /// Transport that only carries `protocols`; requests on any other
    /// protocol fail with [`TransportError::MissingContext`].
    pub fn with_protocols(
        collaborators: Collaborators,
        protocols: &[Protocol],
    ) -> (Self, mpsc::UnboundedReceiver<InboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let registries = protocols
            .iter()
            .map(|p| (*p, DialogueRegistry::new(*p)))
            .collect();
        (
            Self {
                collaborators,
                registries,
                inbox: tx,
            },
            rx,
        )
    }

    /// Dialogues still waiting for a reply.
    pub fn open_dialogues(&self) -> usize {
        self.registries.values().map(|r| r.open_count()).sum()
    }
}

impl Outbox for Transport {
    fn put(&mut self, request: OutboundRequest) -> Result<CorrelationToken, TransportError> {
        let protocol = request.protocol();
        if self.inbox.is_closed() {
            return Err(TransportError::Closed);
        }
        let registry = self
            .registries
            .get_mut(&protocol)
            .ok_or(TransportError::MissingContext(protocol))?;

        let token = CorrelationToken::new();
        registry.open(token, Utc::now());
        debug!(protocol = %protocol, request = request.name(), token = %token, "Request issued");

        let collaborators = self.collaborators.clone();
        let inbox = self.inbox.clone();
        tokio::spawn(async move {
            let name = request.name();
            let body = match execute(&collaborators, request).await {
                Ok(body) => body,
                Err(e) => {
                    warn!(protocol = %protocol, request = name, error = %e, "Collaborator call failed");
                    ResponseBody::Error {
                        message: format!("{e:#}"),
                    }
                }
            };
            if inbox.send(InboundMessage::reply(protocol, token, body)).is_err() {
                debug!(token = %token, "Inbox closed, reply discarded");
            }
        });

        Ok(token)
    }
}

impl TokenSource for Transport {
    fn extract_token(&mut self, message: &InboundMessage) -> Option<CorrelationToken> {
        let Some(registry) = self.registries.get_mut(&message.protocol) else {
            warn!(protocol = %message.protocol, "No dialogue registry for protocol");
            return None;
        };
        message
            .dialogue_reference
            .as_ref()
            .and_then(|reference| registry.close(reference, Utc::now()))
    }
}

/// Run one request against the collaborators.
async fn execute(collaborators: &Collaborators, request: OutboundRequest) -> Result<ResponseBody> {
    let body = match request {
        OutboundRequest::ActiveSale { contract, below_id } => ResponseBody::ActiveSale {
            sale: collaborators
                .reader
                .read_active_sale(&contract, below_id)
                .await?,
        },
        OutboundRequest::PurchasePayload { contract, sale_id } => ResponseBody::PurchasePayload {
            data: collaborators
                .reader
                .read_purchase_payload(&contract, sale_id)
                .await?,
        },
        OutboundRequest::MultisigHash { multisig, call } => ResponseBody::MultisigHash {
            tx_hash: collaborators
                .reader
                .compute_multisig_hash(&multisig, &call)
                .await?,
        },
        OutboundRequest::SignMessage { message, mode } => ResponseBody::Signature {
            signature: collaborators.signer.sign(&message, mode).await?,
        },
        OutboundRequest::BuildMultisigTransaction {
            multisig,
            sender,
            call,
            signatures,
        } => ResponseBody::RawTransaction {
            raw: collaborators
                .reader
                .build_multisig_transaction(&multisig, &sender, &call, &signatures)
                .await?,
        },
        OutboundRequest::SignTransaction { raw } => ResponseBody::SignedTransaction {
            signed: collaborators.signer.sign_transaction(&raw).await?,
        },
        OutboundRequest::Broadcast { signed } => ResponseBody::TransactionDigest {
            tx_id: collaborators.ledger.broadcast(&signed).await?,
        },
        OutboundRequest::Receipt { tx_id } => ResponseBody::TransactionReceipt {
            receipt: collaborators.ledger.get_receipt(&tx_id).await?,
        },
        OutboundRequest::Http { url, body } => {
            let resp = collaborators
                .http
                .post(&url)
                .timeout(Duration::from_secs(10))
                .json(&body)
                .send()
                .await
                .with_context(|| format!("POST {url} failed"))?;
            let status = resp.status().as_u16();
            ResponseBody::Http {
                status,
                body: resp.text().await.unwrap_or_default(),
            }
        }
    };
    Ok(body)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
