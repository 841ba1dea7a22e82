//! Request correlation.
//!
//! The [`RequestCorrelator`] is the single table of in-flight requests:
//! correlation token → callback. Tokens are inserted once when a request is
//! issued and popped once when its reply is dispatched. Nothing else reads
//! or enumerates the table.

pub mod dispatcher;

use std::collections::HashMap;

use crate::transport::CorrelationToken;

pub use dispatcher::{DispatchOutcome, DispatchStats, DropReason, ResponseDispatcher};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CorrelationError {
    #[error("correlation token {0} is already registered")]
    DuplicateToken(CorrelationToken),
}

/// Pending callbacks keyed by correlation token.
///
/// Owned by the driver task; `register` and `resolve` take `&mut self`, so
/// sharing it across threads requires wrapping it in a lock.
#[derive(Debug)]
pub struct RequestCorrelator<C> {
    pending: HashMap<CorrelationToken, C>,
}

impl<C> Default for RequestCorrelator<C> {
    fn default() -> Self {
        Self {
            pending: HashMap::new(),
        }
    }
}

impl<C> RequestCorrelator<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the callback for a freshly issued request.
    ///
    /// A duplicate token means two requests share an identity, which the
    /// transport never produces; the existing entry is left untouched.
    pub fn register(&mut self, token: CorrelationToken, callback: C) -> Result<(), CorrelationError> {
        if self.pending.contains_key(&token) {
            return Err(CorrelationError::DuplicateToken(token));
        }
        self.pending.insert(token, callback);
        Ok(())
    }

    /// Remove and return the callback for `token`, if any.
    pub fn resolve(&mut self, token: &CorrelationToken) -> Option<C> {
        self.pending.remove(token)
    }

    /// Number of requests awaiting a reply.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_then_resolve() {
        let mut correlator = RequestCorrelator::new();
        let token = CorrelationToken::new();
        correlator.register(token, "cb").unwrap();
        assert_eq!(correlator.pending(), 1);

        assert_eq!(correlator.resolve(&token), Some("cb"));
        assert!(correlator.is_empty());
    }

    #[test]
    fn test_resolve_is_single_shot() {
        let mut correlator = RequestCorrelator::new();
        let token = CorrelationToken::new();
        correlator.register(token, 1u32).unwrap();
        assert_eq!(correlator.resolve(&token), Some(1));
        assert_eq!(correlator.resolve(&token), None);
    }

    #[test]
    fn test_resolve_unknown_token() {
        let mut correlator: RequestCorrelator<u32> = RequestCorrelator::new();
        correlator.register(CorrelationToken::new(), 7).unwrap();
        assert_eq!(correlator.resolve(&CorrelationToken::new()), None);
        assert_eq!(correlator.pending(), 1);
    }

    #[test]
    fn test_duplicate_register_rejected() {
        let mut correlator = RequestCorrelator::new();
        let token = CorrelationToken::new();
        correlator.register(token, "first").unwrap();
        assert_eq!(
            correlator.register(token, "second"),
            Err(CorrelationError::DuplicateToken(token))
        );
        assert_eq!(correlator.resolve(&token), Some("first"));
    }
}
