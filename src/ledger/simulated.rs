//! In-memory chain for dry runs.
//!
//! Serves a fixed catalogue of sales, derives deterministic hashes and
//! signatures, and mines each broadcast transaction after a configurable
//! number of receipt polls. Nothing leaves the process.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use tracing::info;

use super::{ContractReader, LedgerApi, MessageSigner};
use crate::types::{
    MintwatchError, MultisigCall, RawTransaction, SaleDetails, SaleId, SaleMetadata,
    SignedTransaction, SigningMode, TxReceipt,
};

/// Receipt polls answered with "not yet mined" before a transaction mines.
const DEFAULT_CONFIRMATION_POLLS: u32 = 2;

/// First block number handed out.
const GENESIS_BLOCK: u64 = 1_000_000;

#[derive(Debug, Default)]
struct ChainState {
    /// tx id → receipt polls seen so far
    pending: HashMap<String, u32>,
    mined: HashMap<String, TxReceipt>,
    next_block: u64,
}

pub struct SimulatedChain {
    sales: Vec<SaleDetails>,
    confirmation_polls: u32,
    state: Mutex<ChainState>,
}

impl SimulatedChain {
    pub fn new(sales: Vec<SaleDetails>) -> Self {
        Self {
            sales,
            confirmation_polls: DEFAULT_CONFIRMATION_POLLS,
            state: Mutex::new(ChainState {
                next_block: GENESIS_BLOCK,
                ..ChainState::default()
            }),
        }
    }

    pub fn with_confirmation_polls(mut self, polls: u32) -> Self {
        self.confirmation_polls = polls;
        self
    }

    /// A small catalogue with a spread of prices, one paused and one
    /// inactive release.
    pub fn demo() -> Self {
        const ETH: u128 = 1_000_000_000_000_000_000;
        let sale = |sale_id: SaleId, price: u128, active: bool, paused: bool, name: &str| {
            SaleDetails {
                sale_id,
                price_per_unit: price,
                seller: format!("0x{:040x}", 0xa000 + sale_id),
                is_active: active,
                is_paused: paused,
                metadata: SaleMetadata {
                    name: name.to_string(),
                    artist: format!("artist-{sale_id}"),
                    ..SaleMetadata::default()
                },
            }
        };
        Self::new(vec![
            sale(1, ETH / 20, true, false, "Genesis Grid"),
            sale(2, ETH / 10, true, false, "Slow Tides"),
            sale(3, ETH / 4, false, false, "Unreleased"),
            sale(4, 3 * ETH, true, false, "Golden Ratio"),
            sale(5, ETH / 2, true, true, "Paused Garden"),
            sale(6, 2 * ETH, true, false, "Chromatic Drift"),
        ])
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ChainState>> {
        self.state
            .lock()
            .map_err(|_| MintwatchError::Simulation("chain state poisoned".into()).into())
    }
}

/// Deterministic 32-byte hex digest of `parts`.
fn digest<T: Hash + ?Sized>(parts: &T) -> String {
    let mut out = String::with_capacity(64);
    for salt in 0u8..4 {
        let mut hasher = DefaultHasher::new();
        salt.hash(&mut hasher);
        parts.hash(&mut hasher);
        out.push_str(&format!("{:016x}", hasher.finish()));
    }
    out
}

#[async_trait]
impl ContractReader for SimulatedChain {
    async fn read_active_sale(
        &self,
        _contract: &str,
        below_id: Option<SaleId>,
    ) -> Result<Option<SaleDetails>> {
        Ok(self
            .sales
            .iter()
            .filter(|s| below_id.map_or(true, |below| s.sale_id < below))
            .filter(|s| s.is_open())
            .max_by_key(|s| s.sale_id)
            .cloned())
    }

    async fn read_purchase_payload(&self, _contract: &str, sale_id: SaleId) -> Result<String> {
        // purchase(uint256 projectId)
        Ok(format!("0xefef39a1{sale_id:064x}"))
    }

    async fn compute_multisig_hash(&self, multisig: &str, call: &MultisigCall) -> Result<String> {
        Ok(format!(
            "0x{}",
            digest(&(multisig, &call.to, call.value, &call.data, call.safe_tx_gas))
        ))
    }

    async fn build_multisig_transaction(
        &self,
        multisig: &str,
        sender: &str,
        call: &MultisigCall,
        signatures: &BTreeMap<String, String>,
    ) -> Result<RawTransaction> {
        Ok(RawTransaction {
            body: serde_json::json!({
                "from": sender,
                "to": multisig,
                "value": 0,
                "gas": call.safe_tx_gas + 75_000,
                "inner": {
                    "to": call.to,
                    "value": call.value.to_string(),
                    "data": call.data,
                },
                "signatures": signatures,
            }),
        })
    }
}

#[async_trait]
impl MessageSigner for SimulatedChain {
    async fn sign(&self, message: &str, mode: SigningMode) -> Result<String> {
        Ok(format!("0x{}1b", digest(&(message, mode.to_string()))))
    }

    async fn sign_transaction(&self, raw: &RawTransaction) -> Result<SignedTransaction> {
        Ok(SignedTransaction {
            body: format!("0x{}", digest(&raw.body.to_string())),
        })
    }
}

#[async_trait]
impl LedgerApi for SimulatedChain {
    async fn broadcast(&self, signed: &SignedTransaction) -> Result<String> {
        let tx_id = format!("0x{}", digest(&signed.body));
        let mut state = self.lock()?;
        if !state.mined.contains_key(&tx_id) {
            state.pending.entry(tx_id.clone()).or_insert(0);
        }
        info!(tx_id = %tx_id, "[DRY RUN] Transaction broadcast");
        Ok(tx_id)
    }

    async fn get_receipt(&self, tx_id: &str) -> Result<Option<TxReceipt>> {
        let mut state = self.lock()?;
        if let Some(receipt) = state.mined.get(tx_id) {
            return Ok(Some(receipt.clone()));
        }

        let polls = match state.pending.get_mut(tx_id) {
            Some(polls) => {
                *polls += 1;
                *polls
            }
            None => {
                return Err(MintwatchError::Simulation(format!("unknown transaction {tx_id}")).into())
            }
        };
        if polls <= self.confirmation_polls {
            return Ok(None);
        }

        state.pending.remove(tx_id);
        let block_number = state.next_block;
        state.next_block += 1;
        let receipt = TxReceipt {
            tx_id: tx_id.to_string(),
            block_number,
            status: true,
            gas_used: 180_000,
        };
        state.mined.insert(tx_id.to_string(), receipt.clone());
        Ok(Some(receipt))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
