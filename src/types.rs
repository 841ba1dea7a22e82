//! Shared types for the MINTWATCH agent.
//!
//! These types form the data model used across all modules.
//! Addresses, hashes, signatures and payloads are opaque hex strings to the
//! core; only the adapters in `ledger` ever interpret them.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// On-chain identifier of a sale (the project id on the source contract).
pub type SaleId = u64;

/// Amount in the chain's smallest currency unit.
pub type Wei = u128;

const WEI_PER_ETH: Decimal = dec!(1000000000000000000);

/// Render a wei amount as ether for logs. Falls back to the raw wei value
/// when the amount does not fit a `Decimal`.
pub fn format_eth(wei: Wei) -> String {
    i128::try_from(wei)
        .ok()
        .and_then(|w| Decimal::try_from_i128_with_scale(w, 0).ok())
        .and_then(|w| w.checked_div(WEI_PER_ETH))
        .map(|eth| format!("{} ETH", eth.normalize()))
        .unwrap_or_else(|| format!("{wei} wei"))
}

/// Strip a leading `0x` from a hex string, if present.
pub fn strip_hex_prefix(value: &str) -> &str {
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value)
}

// ---------------------------------------------------------------------------
// Sale
// ---------------------------------------------------------------------------

/// A sale offer discovered on the source contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleDetails {
    pub sale_id: SaleId,
    /// Price of one unit, in wei.
    pub price_per_unit: Wei,
    /// Address the proceeds go to (the artist for primary sales).
    pub seller: String,
    pub is_active: bool,
    pub is_paused: bool,
    #[serde(default)]
    pub metadata: SaleMetadata,
}

/// Descriptive metadata attached to a sale. Never interpreted by the core.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub website: String,
    #[serde(default)]
    pub ipfs_hash: String,
}

impl SaleDetails {
    /// Whether the sale can currently be bought from.
    pub fn is_open(&self) -> bool {
        self.is_active && !self.is_paused
    }

    /// Helper to build a test/sample sale with sensible defaults.
    #[cfg(test)]
    pub fn sample(sale_id: SaleId, price_per_unit: Wei) -> Self {
        SaleDetails {
            sale_id,
            price_per_unit,
            seller: "0x00000000000000000000000000000000000a11ce".to_string(),
            is_active: true,
            is_paused: false,
            metadata: SaleMetadata {
                name: format!("Sample #{sale_id}"),
                artist: "sample-artist".to_string(),
                ..SaleMetadata::default()
            },
        }
    }
}

impl fmt::Display for SaleDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} '{}' by {} @ {}",
            self.sale_id,
            self.metadata.name,
            if self.metadata.artist.is_empty() {
                self.seller.as_str()
            } else {
                self.metadata.artist.as_str()
            },
            format_eth(self.price_per_unit),
        )
    }
}

// ---------------------------------------------------------------------------
// Multisig
// ---------------------------------------------------------------------------

/// The inner call a multisig transaction executes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultisigCall {
    /// Target contract of the inner call.
    pub to: String,
    /// Value forwarded with the call, in wei.
    pub value: Wei,
    /// Hex-encoded calldata.
    pub data: String,
    /// Gas reserved for the inner call.
    pub safe_tx_gas: u64,
}

/// How a message signature is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigningMode {
    /// Prefixed `eth_sign` style signature, as expected by multisig owners
    /// approving a transaction hash.
    Deprecated,
    /// Typed-data style signature over the raw bytes.
    Standard,
}

impl fmt::Display for SigningMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SigningMode::Deprecated => write!(f, "deprecated"),
            SigningMode::Standard => write!(f, "standard"),
        }
    }
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

/// An unsigned chain transaction, as assembled by the multisig adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTransaction {
    pub body: serde_json::Value,
}

/// A signed chain transaction ready for broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    /// Hex-encoded signed transaction bytes.
    pub body: String,
}

/// Confirmation that a broadcast transaction was included on-chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_id: String,
    pub block_number: u64,
    /// `true` when the transaction executed successfully.
    pub status: bool,
    #[serde(default)]
    pub gas_used: u64,
}

impl fmt::Display for TxReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} in block {} ({})",
            self.tx_id,
            self.block_number,
            if self.status { "success" } else { "reverted" },
        )
    }
}

/// Summary posted to the completion webhook.
#[derive(Debug, Clone, Serialize)]
pub struct PurchaseSummary {
    pub workflow_id: u64,
    pub sale_id: Option<SaleId>,
    /// Decimal string; JSON numbers stop at `u64::MAX`.
    #[serde(serialize_with = "serialize_wei_text")]
    pub price_per_unit: Option<Wei>,
    pub tx_id: Option<String>,
    pub block_number: Option<u64>,
    pub completed_at: Option<DateTime<Utc>>,
}

fn serialize_wei_text<S>(wei: &Option<Wei>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match wei {
        Some(v) => serializer.serialize_some(&v.to_string()),
        None => serializer.serialize_none(),
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for MINTWATCH adapters and bootstrap.
#[derive(Debug, thiserror::Error)]
pub enum MintwatchError {
    #[error("Gateway error ({endpoint}): {message}")]
    Gateway { endpoint: String, message: String },

    #[error("Simulated chain error: {0}")]
    Simulation(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_eth_whole_and_fractional() {
        assert_eq!(format_eth(1_000_000_000_000_000_000), "1 ETH");
        assert_eq!(format_eth(250_000_000_000_000_000), "0.25 ETH");
        assert_eq!(format_eth(0), "0 ETH");
    }

    #[test]
    fn test_strip_hex_prefix() {
        assert_eq!(strip_hex_prefix("0xdeadbeef"), "deadbeef");
        assert_eq!(strip_hex_prefix("0Xabc"), "abc");
        assert_eq!(strip_hex_prefix("cafe"), "cafe");
        assert_eq!(strip_hex_prefix(""), "");
    }

    #[test]
    fn test_sale_is_open() {
        let mut sale = SaleDetails::sample(7, 10);
        assert!(sale.is_open());
        sale.is_paused = true;
        assert!(!sale.is_open());
        sale.is_paused = false;
        sale.is_active = false;
        assert!(!sale.is_open());
    }

    #[test]
    fn test_sale_display_prefers_artist() {
        let sale = SaleDetails::sample(3, 500_000_000_000_000_000);
        let text = sale.to_string();
        assert!(text.contains("#3"));
        assert!(text.contains("sample-artist"));
        assert!(text.contains("0.5 ETH"));
    }

    #[test]
    fn test_sale_deserialize_without_metadata() {
        let json = r#"{
            "sale_id": 12,
            "price_per_unit": 1000,
            "seller": "0xabc",
            "is_active": true,
            "is_paused": false
        }"#;
        let sale: SaleDetails = serde_json::from_str(json).unwrap();
        assert_eq!(sale.sale_id, 12);
        assert_eq!(sale.metadata, SaleMetadata::default());
    }

    #[test]
    fn test_receipt_display() {
        let receipt = TxReceipt {
            tx_id: "0xfeed".into(),
            block_number: 42,
            status: false,
            gas_used: 21_000,
        };
        assert_eq!(receipt.to_string(), "0xfeed in block 42 (reverted)");
    }

    #[test]
    fn test_error_display() {
        let err = MintwatchError::Gateway {
            endpoint: "/ledger/broadcast".into(),
            message: "timeout".into(),
        };
        assert_eq!(err.to_string(), "Gateway error (/ledger/broadcast): timeout");
    }

    #[test]
    fn test_summary_price_above_u64_encodes_as_text() {
        let summary = PurchaseSummary {
            workflow_id: 1,
            sale_id: Some(3),
            price_per_unit: Some(20_000_000_000_000_000_000),
            tx_id: None,
            block_number: None,
            completed_at: None,
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["price_per_unit"], "20000000000000000000");
        assert!(json["tx_id"].is_null());
    }
}
