//! Per-connection subscription manager.
//!
//! Tracks which redemption tokens a WebSocket client is watching and
//! filters the status document stream server-side. There is no wildcard:
//! a client only ever sees documents for tokens it already holds.

use std::collections::HashSet;

use crate::domain::RedemptionToken;

/// Most tokens a single connection may watch.
pub const MAX_SUBSCRIPTIONS: usize = 256;

/// Manages the set of token subscriptions for a single WebSocket connection.
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    tokens: HashSet<RedemptionToken>,
}

impl SubscriptionManager {
    /// Creates a new empty subscription manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds tokens until [`MAX_SUBSCRIPTIONS`] is reached. Returns the
    /// tokens actually added.
    pub fn subscribe(&mut self, tokens: Vec<RedemptionToken>) -> Vec<RedemptionToken> {
        let mut added = Vec::new();
        for token in tokens {
            if self.tokens.len() >= MAX_SUBSCRIPTIONS {
                break;
            }
            if self.tokens.insert(token.clone()) {
                added.push(token);
            }
        }
        added
    }

    /// Removes tokens from the subscription set.
    pub fn unsubscribe(&mut self, tokens: &[RedemptionToken]) {
        for token in tokens {
            self.tokens.remove(token);
        }
    }

    /// Returns `true` if documents for `token` should be forwarded.
    #[must_use]
    pub fn matches(&self, token: &RedemptionToken) -> bool {
        self.tokens.contains(token)
    }

    /// Returns the number of watched tokens.
    #[must_use]
    pub fn count(&self) -> usize {
        self.tokens.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_matches_nothing() {
        let mgr = SubscriptionManager::new();
        assert!(!mgr.matches(&RedemptionToken::generate()));
    }

    #[test]
    fn subscribe_specific_token() {
        let mut mgr = SubscriptionManager::new();
        let token = RedemptionToken::generate();
        mgr.subscribe(vec![token.clone()]);
        assert!(mgr.matches(&token));
        assert!(!mgr.matches(&RedemptionToken::generate()));
    }

    #[test]
    fn duplicates_are_counted_once() {
        let mut mgr = SubscriptionManager::new();
        let token = RedemptionToken::generate();
        assert_eq!(mgr.subscribe(vec![token.clone(), token.clone()]).len(), 1);
        assert_eq!(mgr.count(), 1);
    }

    #[test]
    fn unsubscribe_removes_token() {
        let mut mgr = SubscriptionManager::new();
        let token = RedemptionToken::generate();
        mgr.subscribe(vec![token.clone()]);
        mgr.unsubscribe(&[token.clone()]);
        assert!(!mgr.matches(&token));
        assert_eq!(mgr.count(), 0);
    }

    #[test]
    fn subscriptions_are_capped() {
        let mut mgr = SubscriptionManager::new();
        let tokens = (0..MAX_SUBSCRIPTIONS + 5)
            .map(|_| RedemptionToken::generate())
            .collect();
        assert_eq!(mgr.subscribe(tokens).len(), MAX_SUBSCRIPTIONS);
        assert_eq!(mgr.count(), MAX_SUBSCRIPTIONS);
    }
}
