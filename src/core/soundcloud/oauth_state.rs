use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::distributions::Alphanumeric;
use rand::Rng;

const STATE_LEN: usize = 32;

/// Anti-CSRF `state` tokens handed out with the authorization URL.
///
/// A token is only good for one redirect and expires after `ttl`.
pub struct OAuthStateRegistry {
    pending: DashMap<String, DateTime<Utc>>,
    ttl: Duration,
}

impl OAuthStateRegistry {
    pub fn new() -> Self {
        Self::with_ttl(Duration::minutes(10))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            pending: DashMap::new(),
            ttl,
        }
    }

    /// Mint a fresh state token and remember it.
    pub fn issue(&self) -> String {
        self.prune(Utc::now());

        let state: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(STATE_LEN)
            .map(char::from)
            .collect();
        self.pending.insert(state.clone(), Utc::now());
        state
    }

    /// Returns true once for a token we issued that has not expired yet.
    pub fn consume(&self, state: &str) -> bool {
        match self.pending.remove(state) {
            Some((_, issued_at)) => Utc::now() - issued_at <= self.ttl,
            None => false,
        }
    }

    fn prune(&self, now: DateTime<Utc>) {
        let ttl = self.ttl;
        self.pending.retain(|_, issued_at| now - *issued_at <= ttl);
    }
}

impl Default for OAuthStateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_is_single_use() {
        let registry = OAuthStateRegistry::new();
        let state = registry.issue();

        assert_eq!(state.len(), STATE_LEN);
        assert!(registry.consume(&state));
        assert!(!registry.consume(&state));
    }

    #[test]
    fn test_unknown_state_is_rejected() {
        let registry = OAuthStateRegistry::new();
        registry.issue();
        assert!(!registry.consume("not-a-real-state"));
    }

    #[test]
    fn test_expired_state_is_rejected() {
        let registry = OAuthStateRegistry::with_ttl(Duration::seconds(-1));
        let state = registry.issue();
        assert!(!registry.consume(&state));
    }

    #[test]
    fn test_issued_states_are_distinct() {
        let registry = OAuthStateRegistry::new();
        assert_ne!(registry.issue(), registry.issue());
    }
}
