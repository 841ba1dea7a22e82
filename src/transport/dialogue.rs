//! Dialogue bookkeeping for one protocol family.
//!
//! Every request opens a dialogue keyed by its correlation token; the first
//! reply carrying that reference closes it. A reply whose reference is not
//! open is an unidentified dialogue.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::debug;

use super::{CorrelationToken, Protocol};

#[derive(Debug)]
pub struct DialogueRegistry {
    protocol: Protocol,
    open: HashMap<CorrelationToken, DateTime<Utc>>,
    opened_total: u64,
    closed_total: u64,
}

impl DialogueRegistry {
    pub fn new(protocol: Protocol) -> Self {
        Self {
            protocol,
            open: HashMap::new(),
            opened_total: 0,
            closed_total: 0,
        }
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Open a dialogue for a freshly issued request.
    pub fn open(&mut self, token: CorrelationToken, now: DateTime<Utc>) {
        self.open.insert(token, now);
        self.opened_total += 1;
    }

    /// Close the dialogue `reference` points at. Returns the token when the
    /// dialogue was open.
    pub fn close(
        &mut self,
        reference: &CorrelationToken,
        now: DateTime<Utc>,
    ) -> Option<CorrelationToken> {
        let opened_at = self.open.remove(reference)?;
        self.closed_total += 1;
        debug!(
            protocol = %self.protocol,
            token = %reference,
            open_for_ms = (now - opened_at).num_milliseconds(),
            "Dialogue closed"
        );
        Some(*reference)
    }

    pub fn is_open(&self, token: &CorrelationToken) -> bool {
        self.open.contains_key(token)
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    pub fn opened_total(&self) -> u64 {
        self.opened_total
    }

    pub fn closed_total(&self) -> u64 {
        self.closed_total
    }
}
