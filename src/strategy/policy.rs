//! Acceptance policies.
//!
//! A policy is a pure predicate over a sale offer. The workflow consults it
//! once per discovered candidate and never looks inside; new criteria are
//! added by composing policies with [`AllOf`].

use std::collections::HashSet;
use std::fmt;

use crate::config::PurchaseConfig;
use crate::types::{SaleDetails, Wei};

/// Decides whether a discovered sale is eligible for purchase.
///
/// Implementations must be total and side-effect free.
pub trait AcceptancePolicy: Send + Sync + fmt::Debug {
    fn accept(&self, sale: &SaleDetails) -> bool;
}

/// Accept iff the unit price is at or below the ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceCeiling {
    pub ceiling: Wei,
}

impl PriceCeiling {
    pub fn new(ceiling: Wei) -> Self {
        Self { ceiling }
    }
}

impl AcceptancePolicy for PriceCeiling {
    fn accept(&self, sale: &SaleDetails) -> bool {
        sale.price_per_unit <= self.ceiling
    }
}

/// Accept only sales whose seller is on the list. An empty list accepts
/// every seller. Addresses compare case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct ArtistAllowList {
    allowed: HashSet<String>,
}

impl ArtistAllowList {
    pub fn new<I, S>(artists: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed: artists
                .into_iter()
                .map(|a| a.as_ref().trim().to_lowercase())
                .filter(|a| !a.is_empty())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }
}

impl AcceptancePolicy for ArtistAllowList {
    fn accept(&self, sale: &SaleDetails) -> bool {
        self.allowed.is_empty() || self.allowed.contains(&sale.seller.to_lowercase())
    }
}

/// Conjunction of policies. Accepts when every member accepts; an empty
/// conjunction accepts everything.
#[derive(Debug, Default)]
pub struct AllOf {
    policies: Vec<Box<dyn AcceptancePolicy>>,
}

impl AllOf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, policy: impl AcceptancePolicy + 'static) -> Self {
        self.policies.push(Box::new(policy));
        self
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

impl AcceptancePolicy for AllOf {
    fn accept(&self, sale: &SaleDetails) -> bool {
        self.policies.iter().all(|p| p.accept(sale))
    }
}

/// Build the configured policy: the price ceiling, plus the artist
/// allow-list when one is configured.
pub fn from_config(cfg: &PurchaseConfig) -> Box<dyn AcceptancePolicy> {
    let ceiling = PriceCeiling::new(cfg.price_ceiling);
    let allow_list = ArtistAllowList::new(&cfg.artist_allow_list);
    if allow_list.is_empty() {
        Box::new(ceiling)
    } else {
        Box::new(AllOf::new().with(ceiling).with(allow_list))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_ceiling_boundary() {
        let policy = PriceCeiling::new(1_000_000);
        assert!(policy.accept(&SaleDetails::sample(1, 500_000)));
        assert!(policy.accept(&SaleDetails::sample(1, 1_000_000)));
        assert!(!policy.accept(&SaleDetails::sample(1, 1_000_001)));
        assert!(!policy.accept(&SaleDetails::sample(1, 2_000_000)));
    }

    #[test]
    fn test_price_ceiling_zero_accepts_free_only() {
        let policy = PriceCeiling::new(0);
        assert!(policy.accept(&SaleDetails::sample(1, 0)));
        assert!(!policy.accept(&SaleDetails::sample(1, 1)));
    }

    #[test]
    fn test_price_ceiling_max_value_is_total() {
        let policy = PriceCeiling::new(Wei::MAX);
        assert!(policy.accept(&SaleDetails::sample(1, Wei::MAX)));
    }

    #[test]
    fn test_allow_list_case_insensitive() {
        let mut sale = SaleDetails::sample(1, 1);
        sale.seller = "0xABCDEF".into();
        let policy = ArtistAllowList::new(["0xabcdef"]);
        assert!(policy.accept(&sale));

        sale.seller = "0x123456".into();
        assert!(!policy.accept(&sale));
    }

    #[test]
    fn test_empty_allow_list_accepts_all() {
        let policy = ArtistAllowList::new(Vec::<String>::new());
        assert!(policy.is_empty());
        assert!(policy.accept(&SaleDetails::sample(1, 1)));
    }

    #[test]
    fn test_all_of_requires_every_member() {
        let mut sale = SaleDetails::sample(1, 100);
        sale.seller = "0xaaa".into();
        let policy = AllOf::new()
            .with(PriceCeiling::new(1_000))
            .with(ArtistAllowList::new(["0xaaa"]));
        assert_eq!(policy.len(), 2);
        assert!(policy.accept(&sale));

        sale.price_per_unit = 5_000;
        assert!(!policy.accept(&sale));

        sale.price_per_unit = 100;
        sale.seller = "0xbbb".into();
        assert!(!policy.accept(&sale));
    }

    #[test]
    fn test_from_config() {
        let mut cfg = PurchaseConfig {
            price_ceiling: 1_000,
            workflow_timeout_seconds: 30,
            target_sale_contract_address: "0xsale".into(),
            purchase_contract_address: "0xpurchase".into(),
            multisig_contract_address: "0xsafe".into(),
            tx_gas_limit: 4_000_000,
            signer_address: "0xowner".into(),
            artist_allow_list: Vec::new(),
        };
        let mut sale = SaleDetails::sample(1, 999);
        assert!(from_config(&cfg).accept(&sale));

        cfg.artist_allow_list = vec!["0xsomeone-else".into()];
        assert!(!from_config(&cfg).accept(&sale));

        sale.seller = "0xSomeone-Else".into();
        assert!(from_config(&cfg).accept(&sale));
    }
}
