//! Response dispatch.
//!
//! One [`ResponseDispatcher`] per protocol family. They all run the same
//! algorithm and differ only in the set of reply kinds they accept:
//!
//! 1. Recover the correlation token from the transport's dialogue
//!    bookkeeping; unknown dialogue → drop.
//! 2. Check the reply kind is accepted; otherwise → drop.
//! 3. Pop the callback registered under the token; none → drop.
//! 4. Invoke the callback with the message.
//!
//! Drops are logged and counted, never raised to the caller.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, warn};

use super::RequestCorrelator;
use crate::transport::{CorrelationToken, InboundMessage, Protocol, ResponseKind, TokenSource};

/// Why a message was not delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// The message belongs to no open dialogue.
    UnidentifiedDialogue,
    /// The reply kind is not one this dispatcher handles.
    UnallowedKind,
    /// No callback is registered for the token (late or duplicate reply).
    NoCallback,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::UnidentifiedDialogue => write!(f, "unidentified dialogue"),
            DropReason::UnallowedKind => write!(f, "unallowed kind"),
            DropReason::NoCallback => write!(f, "no callback"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered(CorrelationToken),
    Dropped(DropReason),
}

/// Delivery counters for one dispatcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub delivered: u64,
    pub unidentified_dialogue: u64,
    pub unallowed_kind: u64,
    pub no_callback: u64,
}

impl DispatchStats {
    pub fn dropped(&self) -> u64 {
        self.unidentified_dialogue + self.unallowed_kind + self.no_callback
    }

    fn record_drop(&mut self, reason: DropReason) {
        match reason {
            DropReason::UnidentifiedDialogue => self.unidentified_dialogue += 1,
            DropReason::UnallowedKind => self.unallowed_kind += 1,
            DropReason::NoCallback => self.no_callback += 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResponseDispatcher {
    protocol: Protocol,
    accepted: BTreeSet<ResponseKind>,
    stats: DispatchStats,
}

impl ResponseDispatcher {
    pub fn new(protocol: Protocol, accepted: impl IntoIterator<Item = ResponseKind>) -> Self {
        Self {
            protocol,
            accepted: accepted.into_iter().collect(),
            stats: DispatchStats::default(),
        }
    }

    /// Dispatcher for contract calls: state reads and raw transactions.
    pub fn contract_api() -> Self {
        Self::new(
            Protocol::ContractApi,
            [ResponseKind::State, ResponseKind::RawTransaction],
        )
    }

    /// Dispatcher for the signer.
    pub fn signing() -> Self {
        Self::new(
            Protocol::Signing,
            [ResponseKind::SignedMessage, ResponseKind::SignedTransaction],
        )
    }

    /// Dispatcher for transaction submission and receipts.
    pub fn ledger_api() -> Self {
        Self::new(
            Protocol::LedgerApi,
            [
                ResponseKind::TransactionDigest,
                ResponseKind::TransactionReceipt,
            ],
        )
    }

    /// Dispatcher for notification POSTs. Transport failures come back as
    /// `Error` and still release the callback.
    pub fn http() -> Self {
        Self::new(
            Protocol::Http,
            [ResponseKind::HttpResponse, ResponseKind::Error],
        )
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn accepts(&self, kind: ResponseKind) -> bool {
        self.accepted.contains(&kind)
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// Route `message` to the callback registered for its dialogue.
    pub fn dispatch<C, F>(
        &mut self,
        message: InboundMessage,
        tokens: &mut dyn TokenSource,
        correlator: &mut RequestCorrelator<C>,
        invoke: F,
    ) -> DispatchOutcome
    where
        F: FnOnce(C, InboundMessage),
    {
        let Some(token) = tokens.extract_token(&message) else {
            return self.drop_message(&message, DropReason::UnidentifiedDialogue);
        };

        if !self.accepts(message.kind()) {
            return self.drop_message(&message, DropReason::UnallowedKind);
        }

        let Some(callback) = correlator.resolve(&token) else {
            return self.drop_message(&message, DropReason::NoCallback);
        };

        debug!(protocol = %self.protocol, message = %message, "Calling registered callback");
        self.stats.delivered += 1;
        invoke(callback, message);
        DispatchOutcome::Delivered(token)
    }

    fn drop_message(&mut self, message: &InboundMessage, reason: DropReason) -> DispatchOutcome {
        self.stats.record_drop(reason);
        match reason {
            DropReason::UnidentifiedDialogue => warn!(
                protocol = %self.protocol,
                message = %message,
                "Received invalid message: unidentified dialogue"
            ),
            DropReason::UnallowedKind => warn!(
                protocol = %self.protocol,
                message = %message,
                kind = %message.kind(),
                "Received invalid message: unallowed kind"
            ),
            DropReason::NoCallback => warn!(
                protocol = %self.protocol,
                message = %message,
                "No callback registered for request"
            ),
        }
        DispatchOutcome::Dropped(reason)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
