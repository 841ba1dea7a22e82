//! Signing/ledger gateway integration.
//!
//! The gateway is a sidecar that owns the node connection, the contract ABIs
//! and the agent key. It exposes one JSON endpoint per capability:
//!
//! - `POST /contract/active-sale`        → `{ "sale": SaleDetails | null }`
//! - `POST /contract/purchase-payload`   → `{ "data": "0x..." }`
//! - `POST /multisig/hash`               → `{ "tx_hash": "0x..." }`
//! - `POST /multisig/transaction`        → `RawTransaction`
//! - `POST /signer/message`              → `{ "signature": "0x..." }`
//! - `POST /signer/transaction`          → `SignedTransaction`
//! - `POST /ledger/broadcast`            → `{ "tx_id": "0x..." }`
//! - `GET  /ledger/receipt?tx_id=...`    → `{ "receipt": TxReceipt | null }`
//!
//! Auth: `Authorization: Bearer {key}` when an API key is configured.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use super::{ContractReader, LedgerApi, MessageSigner};
use crate::types::{
    MintwatchError, MultisigCall, RawTransaction, SaleDetails, SaleId, SignedTransaction,
    SigningMode, TxReceipt,
};

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ActiveSaleRequest<'a> {
    contract: &'a str,
    below_id: Option<SaleId>,
}

#[derive(Debug, Deserialize)]
struct ActiveSaleResponse {
    #[serde(default)]
    sale: Option<SaleDetails>,
}

#[derive(Debug, Serialize)]
struct PurchasePayloadRequest<'a> {
    contract: &'a str,
    sale_id: SaleId,
}

#[derive(Debug, Deserialize)]
struct PurchasePayloadResponse {
    data: String,
}

#[derive(Debug, Serialize)]
struct MultisigHashRequest<'a> {
    multisig: &'a str,
    #[serde(flatten)]
    call: &'a MultisigCall,
}

#[derive(Debug, Deserialize)]
struct MultisigHashResponse {
    tx_hash: String,
}

#[derive(Debug, Serialize)]
struct MultisigTransactionRequest<'a> {
    multisig: &'a str,
    sender: &'a str,
    #[serde(flatten)]
    call: &'a MultisigCall,
    signatures_by_signer: &'a BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct SignMessageRequest<'a> {
    message: &'a str,
    mode: SigningMode,
}

#[derive(Debug, Deserialize)]
struct SignMessageResponse {
    signature: String,
}

#[derive(Debug, Deserialize)]
struct BroadcastResponse {
    tx_id: String,
}

#[derive(Debug, Deserialize)]
struct ReceiptResponse {
    #[serde(default)]
    receipt: Option<TxReceipt>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for the signing/ledger gateway.
pub struct GatewayClient {
    http: Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl GatewayClient {
    pub fn new(base_url: &str, api_key: Option<SecretString>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("MINTWATCH/0.1.0 (release-collector)")
            .build()
            .context("Failed to build HTTP client for gateway")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn receipt_url(&self, tx_id: &str) -> String {
        format!(
            "{}?tx_id={}",
            self.url("/ledger/receipt"),
            urlencoding::encode(tx_id)
        )
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key.expose_secret()),
            None => builder,
        }
    }

    async fn send<R: DeserializeOwned>(&self, endpoint: &str, builder: RequestBuilder) -> Result<R> {
        let resp = self
            .authorize(builder)
            .send()
            .await
            .with_context(|| format!("Gateway request to {endpoint} failed"))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MintwatchError::Gateway {
                endpoint: endpoint.to_string(),
                message: format!("HTTP {status}: {body}"),
            }
            .into());
        }

        let parsed = resp
            .json::<R>()
            .await
            .with_context(|| format!("Failed to parse gateway response from {endpoint}"))?;
        debug!(endpoint, "Gateway call complete");
        Ok(parsed)
    }

    async fn post<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<R> {
        let builder = self.http.post(self.url(endpoint)).json(body);
        self.send(endpoint, builder).await
    }
}

#[async_trait]
impl ContractReader for GatewayClient {
    async fn read_active_sale(
        &self,
        contract: &str,
        below_id: Option<SaleId>,
    ) -> Result<Option<SaleDetails>> {
        let resp: ActiveSaleResponse = self
            .post("/contract/active-sale", &ActiveSaleRequest { contract, below_id })
            .await?;
        Ok(resp.sale)
    }

    async fn read_purchase_payload(&self, contract: &str, sale_id: SaleId) -> Result<String> {
        let resp: PurchasePayloadResponse = self
            .post(
                "/contract/purchase-payload",
                &PurchasePayloadRequest { contract, sale_id },
            )
            .await?;
        Ok(resp.data)
    }

    async fn compute_multisig_hash(&self, multisig: &str, call: &MultisigCall) -> Result<String> {
        let resp: MultisigHashResponse = self
            .post("/multisig/hash", &MultisigHashRequest { multisig, call })
            .await?;
        Ok(resp.tx_hash)
    }

    async fn build_multisig_transaction(
        &self,
        multisig: &str,
        sender: &str,
        call: &MultisigCall,
        signatures: &BTreeMap<String, String>,
    ) -> Result<RawTransaction> {
        self.post(
            "/multisig/transaction",
            &MultisigTransactionRequest {
                multisig,
                sender,
                call,
                signatures_by_signer: signatures,
            },
        )
        .await
    }
}

#[async_trait]
impl MessageSigner for GatewayClient {
    async fn sign(&self, message: &str, mode: SigningMode) -> Result<String> {
        let resp: SignMessageResponse = self
            .post("/signer/message", &SignMessageRequest { message, mode })
            .await?;
        Ok(resp.signature)
    }

    async fn sign_transaction(&self, raw: &RawTransaction) -> Result<SignedTransaction> {
        self.post("/signer/transaction", raw).await
    }
}

#[async_trait]
impl LedgerApi for GatewayClient {
    async fn broadcast(&self, signed: &SignedTransaction) -> Result<String> {
        let resp: BroadcastResponse = self.post("/ledger/broadcast", signed).await?;
        Ok(resp.tx_id)
    }

    async fn get_receipt(&self, tx_id: &str) -> Result<Option<TxReceipt>> {
        let builder = self.http.get(self.receipt_url(tx_id));
        let resp: ReceiptResponse = self.send("/ledger/receipt", builder).await?;
        Ok(resp.receipt)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
