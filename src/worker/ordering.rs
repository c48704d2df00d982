//! Per-sender serialization of transfers.

use alloy::primitives::Address;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per sender address.
///
/// Transfers from the same account must not race each other for a nonce;
/// transfers from different accounts proceed in parallel.
#[derive(Clone, Default)]
pub struct AddressLocks {
    locks: Arc<DashMap<Address, Arc<Mutex<()>>>>,
}

impl AddressLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive use of `address`. Released when the guard drops.
    pub async fn lock(&self, address: Address) -> OwnedMutexGuard<()> {
        let mutex = self.locks.entry(address).or_default().clone();
        mutex.lock_owned().await
    }

    /// Forget addresses nobody holds or waits for.
    pub fn prune(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
        before.saturating_sub(self.locks.len())
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_address_is_exclusive() {
        let locks = AddressLocks::new();
        let sender = Address::repeat_byte(0x01);

        let held = locks.lock(sender).await;
        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(sender).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(held);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_different_addresses_do_not_block() {
        let locks = AddressLocks::new();
        let _a = locks.lock(Address::repeat_byte(0x01)).await;
        let _b = locks.lock(Address::repeat_byte(0x02)).await;
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_prune_drops_idle_entries() {
        let locks = AddressLocks::new();
        let held = locks.lock(Address::repeat_byte(0x01)).await;
        drop(locks.lock(Address::repeat_byte(0x02)).await);

        assert_eq!(locks.prune(), 1);
        assert_eq!(locks.len(), 1);
        drop(held);
        assert_eq!(locks.prune(), 1);
        assert!(locks.is_empty());
    }
}
