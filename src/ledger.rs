//! Call bookkeeping shared between a builder and the handlers it built.

use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, Default)]
struct LedgerState {
    called: HashMap<String, u64>,
    failed: bool,
    unmatched: u64,
}

/// Per-rule call counts and the unmatched-request flag.
///
/// All updates happen under one lock, so concurrent requests never lose
/// increments.
#[derive(Debug, Default)]
pub struct Ledger {
    state: Mutex<LedgerState>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one firing of `rule`. Returns the new count.
    pub fn record_match(&self, rule: &str) -> u64 {
        let mut state = self.state.lock();
        let count = state.called.entry(rule.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Note a request that matched no rule.
    pub fn record_unmatched(&self) {
        let mut state = self.state.lock();
        state.failed = true;
        state.unmatched += 1;
    }

    /// Snapshot of the call counts. Rules that never fired are absent.
    pub fn called(&self) -> HashMap<String, u64> {
        self.state.lock().called.clone()
    }

    /// Times `rule` fired; zero if it never did.
    pub fn call_count(&self, rule: &str) -> u64 {
        self.state.lock().called.get(rule).copied().unwrap_or(0)
    }

    /// Whether any request has gone unmatched. Never reverts to false.
    pub fn failed(&self) -> bool {
        self.state.lock().failed
    }

    /// Number of requests that matched no rule.
    pub fn unmatched(&self) -> u64 {
        self.state.lock().unmatched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_starts_empty() {
        let ledger = Ledger::new();
        assert!(ledger.called().is_empty());
        assert_eq!(ledger.call_count("x"), 0);
        assert!(!ledger.failed());
        assert_eq!(ledger.unmatched(), 0);
    }

    #[test]
    fn test_counts_accumulate() {
        let ledger = Ledger::new();
        assert_eq!(ledger.record_match("a"), 1);
        assert_eq!(ledger.record_match("a"), 2);
        assert_eq!(ledger.record_match("b"), 1);
        assert_eq!(ledger.call_count("a"), 2);
        assert_eq!(ledger.called().len(), 2);
    }

    #[test]
    fn test_failed_is_sticky() {
        let ledger = Ledger::new();
        ledger.record_unmatched();
        ledger.record_match("a");
        assert!(ledger.failed());
        ledger.record_unmatched();
        assert_eq!(ledger.unmatched(), 2);
    }

    #[test]
    fn test_concurrent_updates() {
        let ledger = Arc::new(Ledger::new());
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        ledger.record_match("hot");
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(ledger.call_count("hot"), 8000);
    }
}
