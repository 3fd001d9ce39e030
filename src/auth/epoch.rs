use std::collections::{HashMap, VecDeque};
use tokio::sync::watch;

// Retired tokens remembered; older ones have long expired server-side
const RETIRED_CAPACITY: usize = 32;

/// Monotone counter advanced by every locally initiated mutating operation
#[derive(Debug)]
pub struct EpochClock {
    tx: watch::Sender<u64>,
}

impl Default for EpochClock {
    fn default() -> Self {
        Self::new()
    }
}

impl EpochClock {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self { tx }
    }

    pub fn current(&self) -> u64 {
        *self.tx.borrow()
    }

    /// Advance and return the new epoch
    pub fn advance(&self) -> u64 {
        let mut next = 0;
        self.tx.send_modify(|epoch| {
            *epoch += 1;
            next = *epoch;
        });
        next
    }

    pub fn is_current(&self, epoch: u64) -> bool {
        self.current() == epoch
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenVerdict {
    /// Never seen, or stamped at the current epoch
    Fresh,
    /// Issued to a local operation that has since been superseded
    Stale,
    /// Retired by a local sign-out
    Retired,
}

/// Access tokens the controller has seen, stamped with the epoch they belong to
#[derive(Debug, Default)]
pub struct TokenLedger {
    stamped: HashMap<String, u64>,
    current: Option<String>,
    retired: VecDeque<String>,
    // Epoch whose outcome a local operation is still resolving
    in_flight: Option<u64>,
}

impl TokenLedger {
    pub fn begin_local(&mut self, epoch: u64) {
        self.in_flight = Some(epoch);
    }

    /// Only clears the marker `epoch` set; a newer operation keeps its own
    pub fn end_local(&mut self, epoch: u64) {
        if self.in_flight == Some(epoch) {
            self.in_flight = None;
        }
    }

    pub fn local_in_flight(&self, epoch: u64) -> bool {
        self.in_flight == Some(epoch)
    }

    pub fn is_current(&self, token: &str) -> bool {
        self.current.as_deref() == Some(token)
    }

    pub fn stamp(&mut self, token: &str, epoch: u64) {
        self.stamped.insert(token.to_string(), epoch);
    }

    /// Stamp a token and make it the one backing the live session.
    /// The token it replaces is retired.
    pub fn set_current(&mut self, token: &str, epoch: u64) {
        if let Some(previous) = self.current.take() {
            if previous != token {
                self.retire(&previous);
            }
        }
        self.stamp(token, epoch);
        self.current = Some(token.to_string());
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Carry the live session's token into a new epoch
    pub fn restamp_current(&mut self, epoch: u64) {
        if let Some(token) = self.current.clone() {
            self.stamped.insert(token, epoch);
        }
    }

    pub fn retire(&mut self, token: &str) {
        self.stamped.remove(token);
        if self.current.as_deref() == Some(token) {
            self.current = None;
        }
        if !self.retired.iter().any(|t| t == token) {
            self.retired.push_back(token.to_string());
        }
        while self.retired.len() > RETIRED_CAPACITY {
            self.retired.pop_front();
        }
    }

    /// Retire every token seen so far
    pub fn retire_all(&mut self) {
        let tokens: Vec<String> = self.stamped.keys().cloned().chain(self.current.clone()).collect();
        for token in tokens {
            self.retire(&token);
        }
    }

    pub fn verdict(&self, token: &str, current_epoch: u64) -> TokenVerdict {
        if self.retired.iter().any(|t| t == token) {
            return TokenVerdict::Retired;
        }
        match self.stamped.get(token) {
            Some(epoch) if *epoch < current_epoch => TokenVerdict::Stale,
            _ => TokenVerdict::Fresh,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn epoch_is_monotone_and_observable() {
        let clock = EpochClock::new();
        let mut rx = clock.subscribe();
        assert_eq!(clock.current(), 0);

        let first = clock.advance();
        let second = clock.advance();
        assert!(second > first);
        assert!(clock.is_current(second));
        assert!(!clock.is_current(first));

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), 2);
    }

    #[test]
    fn retired_tokens_stay_retired() {
        let mut ledger = TokenLedger::default();
        ledger.set_current("a", 1);
        ledger.stamp("b", 2);
        ledger.retire_all();

        assert_eq!(ledger.current(), None);
        assert_eq!(ledger.verdict("a", 5), TokenVerdict::Retired);
        assert_eq!(ledger.verdict("b", 2), TokenVerdict::Retired);
        assert_eq!(ledger.verdict("c", 2), TokenVerdict::Fresh);
    }

    #[test]
    fn tokens_from_superseded_operations_are_stale() {
        let mut ledger = TokenLedger::default();
        ledger.stamp("late", 1);
        assert_eq!(ledger.verdict("late", 1), TokenVerdict::Fresh);
        assert_eq!(ledger.verdict("late", 2), TokenVerdict::Stale);
    }

    #[test]
    fn live_token_survives_new_epochs() {
        let mut ledger = TokenLedger::default();
        ledger.set_current("live", 1);
        ledger.restamp_current(4);
        assert_eq!(ledger.verdict("live", 4), TokenVerdict::Fresh);
    }

    #[test]
    fn replaced_token_is_retired() {
        let mut ledger = TokenLedger::default();
        ledger.set_current("old", 1);
        ledger.set_current("new", 2);
        assert_eq!(ledger.current(), Some("new"));
        assert_eq!(ledger.verdict("old", 2), TokenVerdict::Retired);

        ledger.set_current("new", 3);
        assert_eq!(ledger.verdict("new", 3), TokenVerdict::Fresh);
    }

    #[test]
    fn in_flight_marker_belongs_to_one_epoch() {
        let mut ledger = TokenLedger::default();
        ledger.begin_local(3);
        assert!(ledger.local_in_flight(3));

        ledger.begin_local(4);
        ledger.end_local(3);
        assert!(ledger.local_in_flight(4));
        assert!(!ledger.local_in_flight(3));

        ledger.end_local(4);
        assert!(!ledger.local_in_flight(4));
    }

    #[test]
    fn retiring_forgets_the_stamp() {
        let mut ledger = TokenLedger::default();
        ledger.stamp("abandoned", 2);
        ledger.retire("abandoned");
        assert!(ledger.stamped.is_empty());
        assert_eq!(ledger.verdict("abandoned", 2), TokenVerdict::Retired);
    }

    #[test]
    fn retired_list_is_bounded() {
        let mut ledger = TokenLedger::default();
        for i in 0..(RETIRED_CAPACITY + 10) {
            ledger.retire(&format!("t{}", i));
        }
        assert_eq!(ledger.verdict("t0", 0), TokenVerdict::Fresh);
        assert_eq!(ledger.verdict(&format!("t{}", RETIRED_CAPACITY + 9), 0), TokenVerdict::Retired);
    }
}
