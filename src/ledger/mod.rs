//! Chain collaborators.
//!
//! Defines the three capabilities the transport executes requests against,
//! and provides implementations for:
//! - `gateway`: JSON-over-HTTP signing/ledger gateway (live mode)
//! - `simulated`: in-memory chain for dry runs

pub mod gateway;
pub mod simulated;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::types::{
    MultisigCall, RawTransaction, SaleDetails, SaleId, SignedTransaction, SigningMode, TxReceipt,
};

/// Read-only contract access plus multisig transaction assembly.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContractReader: Send + Sync {
    /// The most recent open sale with an id strictly below `below_id`, or the
    /// newest open sale when `below_id` is `None`.
    async fn read_active_sale(
        &self,
        contract: &str,
        below_id: Option<SaleId>,
    ) -> Result<Option<SaleDetails>>;

    /// Hex calldata that buys one unit of `sale_id`.
    async fn read_purchase_payload(&self, contract: &str, sale_id: SaleId) -> Result<String>;

    /// 32-byte hash (hex) the multisig owners sign to approve `call`.
    async fn compute_multisig_hash(&self, multisig: &str, call: &MultisigCall) -> Result<String>;

    /// Unsigned transaction executing `call` through the multisig.
    async fn build_multisig_transaction(
        &self,
        multisig: &str,
        sender: &str,
        call: &MultisigCall,
        signatures: &BTreeMap<String, String>,
    ) -> Result<RawTransaction>;
}

/// Holds the agent key; signs messages and transactions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageSigner: Send + Sync {
    async fn sign(&self, message: &str, mode: SigningMode) -> Result<String>;

    async fn sign_transaction(&self, raw: &RawTransaction) -> Result<SignedTransaction>;
}

/// Transaction submission and receipt lookup.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerApi: Send + Sync {
    /// Submit a signed transaction, returning its id (digest).
    async fn broadcast(&self, signed: &SignedTransaction) -> Result<String>;

    /// `None` while the transaction is not yet mined.
    async fn get_receipt(&self, tx_id: &str) -> Result<Option<TxReceipt>>;
}
