//! Random IV generation and per-key reuse tracking

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use rand::RngCore;

use crate::IV_SIZE;

/// Draw a fresh IV from the thread-local CSPRNG.
pub fn generate_iv() -> [u8; IV_SIZE] {
    let mut iv = [0u8; IV_SIZE];
    rand::thread_rng().fill_bytes(&mut iv);
    iv
}

/// IVs a ledger remembers by default, a few megabytes with set overhead.
pub const DEFAULT_IV_WINDOW: usize = 1 << 16;

/// Remembers the most recent IVs handed out under one cipher key and never
/// hands out one of those again.
///
/// Only the last `window` IVs are kept; older ones are forgotten in issue
/// order.
#[derive(Debug)]
pub struct IvLedger {
    window: usize,
    state: Mutex<LedgerState>,
}

#[derive(Debug, Default)]
struct LedgerState {
    recent: HashSet<[u8; IV_SIZE]>,
    order: VecDeque<[u8; IV_SIZE]>,
    total: usize,
}

impl Default for IvLedger {
    fn default() -> Self {
        Self::with_window(DEFAULT_IV_WINDOW)
    }
}

impl IvLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger that remembers at most `window` IVs (at least one).
    pub fn with_window(window: usize) -> Self {
        Self {
            window: window.max(1),
            state: Mutex::new(LedgerState::default()),
        }
    }

    /// Draw IVs until one is not among the remembered ones, and record it.
    pub fn issue(&self) -> [u8; IV_SIZE] {
        self.issue_with(generate_iv)
    }

    fn issue_with(&self, mut draw: impl FnMut() -> [u8; IV_SIZE]) -> [u8; IV_SIZE] {
        let mut state = self.lock();
        let iv = loop {
            let iv = draw();
            if state.recent.insert(iv) {
                break iv;
            }
            tracing::warn!("random IV collided with an earlier export, redrawing");
        };
        state.order.push_back(iv);
        state.total += 1;
        if state.order.len() > self.window {
            if let Some(oldest) = state.order.pop_front() {
                state.recent.remove(&oldest);
            }
        }
        iv
    }

    /// IVs issued over the ledger's lifetime, including forgotten ones.
    pub fn issued_count(&self) -> usize {
        self.lock().total
    }

    /// IVs currently remembered for collision checks.
    pub fn remembered(&self) -> usize {
        self.lock().order.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ivs_differ() {
        assert_ne!(generate_iv(), generate_iv(), "random IVs must differ");
    }

    #[test]
    fn test_ledger_redraws_on_collision() {
        let ledger = IvLedger::new();
        let mut draws = vec![[1u8; 16], [1u8; 16], [1u8; 16], [2u8; 16]].into_iter();

        assert_eq!(ledger.issue_with(|| draws.next().unwrap()), [1u8; 16]);
        assert_eq!(ledger.issue_with(|| draws.next().unwrap()), [2u8; 16]);
        assert_eq!(ledger.issued_count(), 2);
    }

    #[test]
    fn test_ledger_forgets_oldest_beyond_window() {
        let ledger = IvLedger::with_window(2);
        let mut draws = vec![[1u8; 16], [2u8; 16], [3u8; 16], [1u8; 16]].into_iter();

        for _ in 0..4 {
            ledger.issue_with(|| draws.next().unwrap());
        }
        // [1; 16] left the window after the third issue, so it was accepted again
        assert_eq!(ledger.issued_count(), 4);
        assert_eq!(ledger.remembered(), 2);
        assert!(draws.next().is_none());
    }
}
