//! Injected nonce strategy
//!
//! The engine never tracks nonces itself. Callers that want an account to
//! carry a nonce source attach one through [`crate::account::HdAccount::with_nonce_manager`].

use crate::error::Result;
use crate::types::Address;

/// Source of transaction nonces, keyed by `(address, chain_id)`
pub trait NonceManager: Send + Sync {
    /// Return the next nonce and advance the counter
    fn consume(&self, address: &Address, chain_id: u64) -> Result<u64>;

    /// Return the next nonce without advancing
    fn get(&self, address: &Address, chain_id: u64) -> Result<u64>;

    /// Forget any cached state for the key
    fn reset(&self, address: &Address, chain_id: u64);
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::error::Error;

    /// In-memory counter used by the unit tests
    #[derive(Default)]
    pub struct CountingNonceManager {
        counters: Mutex<HashMap<(Address, u64), u64>>,
    }

    impl NonceManager for CountingNonceManager {
        fn consume(&self, address: &Address, chain_id: u64) -> Result<u64> {
            let mut counters = self
                .counters
                .lock()
                .map_err(|_| Error::Nonce("lock poisoned".to_string()))?;
            let counter = counters.entry((*address, chain_id)).or_insert(0);
            let nonce = *counter;
            *counter += 1;
            Ok(nonce)
        }

        fn get(&self, address: &Address, chain_id: u64) -> Result<u64> {
            let counters = self
                .counters
                .lock()
                .map_err(|_| Error::Nonce("lock poisoned".to_string()))?;
            Ok(counters.get(&(*address, chain_id)).copied().unwrap_or(0))
        }

        fn reset(&self, address: &Address, chain_id: u64) {
            if let Ok(mut counters) = self.counters.lock() {
                counters.remove(&(*address, chain_id));
            }
        }
    }

    #[test]
    fn test_counting_manager() {
        let manager = CountingNonceManager::default();
        let a = Address([1; 20]);
        assert_eq!(manager.consume(&a, 1).unwrap(), 0);
        assert_eq!(manager.consume(&a, 1).unwrap(), 1);
        assert_eq!(manager.get(&a, 1).unwrap(), 2);
        assert_eq!(manager.get(&a, 5).unwrap(), 0);
        manager.reset(&a, 1);
        assert_eq!(manager.get(&a, 1).unwrap(), 0);
    }
}
